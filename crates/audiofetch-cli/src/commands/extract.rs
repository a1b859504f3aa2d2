use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;

use super::{describe_plan, pipeline_config, print_summary, truncate};
use crate::args::ExtractOptions;
use audiofetch_core::{
    config::Config,
    pipeline::{Pipeline, PipelineStage},
};

pub async fn run(url: &str, options: &ExtractOptions, config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;
    let pipeline_config = pipeline_config(url, options, &config, None);

    // Create progress channel
    let (tx, mut rx) = mpsc::channel(32);

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner:.cyan} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));

    let bar_style = ProgressStyle::with_template(
        "{spinner:.cyan} [{elapsed_precise}] {bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}) {msg}",
    )?
    .progress_chars("=>-");

    // Spawn progress handler
    let progress_handle = tokio::spawn(async move {
        let mut showing_bar = false;
        while let Some(stage) = rx.recv().await {
            match stage {
                PipelineStage::MeasuringSpeed => {
                    pb.set_message("Measuring internet download speed...");
                }
                PipelineStage::Planned(plan) => {
                    pb.println(describe_plan(&plan));
                    pb.set_message("Downloading...");
                }
                PipelineStage::Downloading(progress) => {
                    if let (Some(done), Some(total)) = (progress.downloaded_bytes, progress.total_bytes) {
                        if !showing_bar {
                            pb.set_style(bar_style.clone());
                            showing_bar = true;
                        }
                        pb.set_length(total);
                        pb.set_position(done);
                    }
                    pb.set_message(progress.status);
                }
                PipelineStage::Downloaded { path } => {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    pb.set_message(format!("Downloaded: {}", truncate(&name, 40)));
                }
                PipelineStage::Converting => {
                    pb.set_message("Converting to MP3...");
                }
                PipelineStage::Complete { duration } => {
                    pb.finish_with_message(format!("Done ({:.1}s)", duration.as_secs_f32()));
                }
                PipelineStage::Failed { stage, error } => {
                    pb.abandon_with_message(format!("Failed at {}: {}", stage, error));
                }
            }
        }
    });

    // Run pipeline
    let pipeline = Pipeline::new(pipeline_config, tx);
    let result = pipeline.run().await;
    drop(pipeline);

    // Wait for progress handler
    progress_handle.await?;

    match result {
        Ok(summary) => print_summary(&summary, options.json),
        Err(e) => {
            eprintln!("\nError: {}", e);
            Err(e.into())
        }
    }
}
