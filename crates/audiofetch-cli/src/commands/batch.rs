use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

use super::{describe_plan, format_summary, pipeline_config, truncate};
use crate::args::ExtractOptions;
use audiofetch_core::{
    config::Config, pipeline::Pipeline, report::ResultSummary, speed::SpeedTester,
    AudioFetchError, ConnectionPlan,
};

pub async fn run(
    input: &Path,
    parallel: Option<usize>,
    options: &ExtractOptions,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = Config::load(config_path)?;
    let parallel = parallel.unwrap_or(config.batch.max_parallel);

    // Read URLs from file
    let content = fs::read_to_string(input)
        .await
        .context("Failed to read input file")?;

    let urls = parse_url_list(&content);

    if urls.is_empty() {
        eprintln!("No URLs found in input file");
        if options.json {
            println!("[]");
        }
        return Ok(());
    }

    // One measurement serves the whole batch
    let plan = match options.connections {
        Some(n) => ConnectionPlan::fixed(n),
        None if options.no_speed_test || !config.speed.enabled => {
            ConnectionPlan::assumed(config.speed.fallback_mbps)
        }
        None => {
            let tester = SpeedTester::new(
                config.paths.speedtest_path(),
                config.speed.fallback_mbps,
                Duration::from_secs(config.speed.timeout_secs),
            );
            tester.plan().await
        }
    };
    // Status goes to stderr so `--json` leaves stdout machine-readable
    eprintln!("{}", describe_plan(&plan));

    let total_urls = urls.len();
    eprintln!("Processing {} URLs with {} parallel workers\n", total_urls, parallel);

    let multi = MultiProgress::new();
    let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {msg}")?.tick_chars("=>-");

    let mut results = stream::iter(urls.into_iter().enumerate())
        .map(|(idx, url)| {
            let pipeline_config = pipeline_config(&url, options, &config, Some(plan));
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(spinner_style.clone());

            async move {
                pb.set_message(format!("[{}/{}] {}", idx + 1, total_urls, truncate(&url, 50)));
                pb.enable_steady_tick(Duration::from_millis(100));

                // Batch mode doesn't show per-item progress
                let (tx, mut rx) = tokio::sync::mpsc::channel(1);
                tokio::spawn(async move { while rx.recv().await.is_some() {} });

                let result = Pipeline::new(pipeline_config, tx).run().await;

                match &result {
                    Ok(summary) => pb.finish_with_message(format!(
                        "[{}/{}] Done: {}",
                        idx + 1,
                        total_urls,
                        truncate(&summary.title, 50)
                    )),
                    Err(e) => pb.finish_with_message(format!(
                        "[{}/{}] Failed: {}",
                        idx + 1,
                        total_urls,
                        e
                    )),
                }

                (url, result)
            }
        })
        .buffer_unordered(parallel);

    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    while let Some((url, result)) = results.next().await {
        match result {
            Ok(summary) => succeeded.push(summary),
            Err(e) => {
                failed.push((url, e));
                if !config.batch.continue_on_error {
                    break;
                }
            }
        }
    }
    drop(results);

    let report = BatchReport::render(&succeeded, &failed, options.json)?;
    print!("{}", report.stdout);
    eprint!("{}", report.stderr);

    if !failed.is_empty() && !config.batch.continue_on_error {
        anyhow::bail!("Batch stopped after first failure");
    }

    Ok(())
}

/// Final batch output split by stream
struct BatchReport {
    stdout: String,
    stderr: String,
}

impl BatchReport {
    /// In JSON mode stdout carries only the array of successful results and
    /// the tally moves to stderr; otherwise everything is human-readable on stdout.
    fn render(
        succeeded: &[ResultSummary],
        failed: &[(String, AudioFetchError)],
        json: bool,
    ) -> Result<Self> {
        let mut tally = String::from("\n=== Batch Complete ===\n");
        tally.push_str(&format!("Succeeded: {}\n", succeeded.len()));
        tally.push_str(&format!("Failed: {}\n", failed.len()));
        if !failed.is_empty() {
            tally.push_str("\nFailed URLs:\n");
            for (url, e) in failed {
                tally.push_str(&format!("  {} - {}\n", url, e));
            }
        }

        if json {
            return Ok(Self {
                stdout: format!("{}\n", serde_json::to_string_pretty(succeeded)?),
                stderr: tally,
            });
        }

        let mut stdout = String::new();
        for summary in succeeded {
            stdout.push_str(&format_summary(summary, false)?);
        }
        stdout.push_str(&tally);
        Ok(Self {
            stdout,
            stderr: String::new(),
        })
    }
}

/// One URL per line; blank lines and `#` comments are skipped
fn parse_url_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect()
}
