pub mod batch;
pub mod config;
pub mod doctor;
pub mod extract;
pub mod speed;

use anyhow::Result;
use audiofetch_core::{
    config::Config,
    pipeline::PipelineConfig,
    report::{FileKind, ResultSummary},
    speed::human_readable_speed,
    ConnectionPlan, DownloadRequest, PlanSource,
};

use crate::args::ExtractOptions;

/// Build the pipeline configuration for `url` from CLI options over config values
pub fn pipeline_config(
    url: &str,
    options: &ExtractOptions,
    config: &Config,
    plan: Option<ConnectionPlan>,
) -> PipelineConfig {
    let mut request = DownloadRequest::new(url);
    request.output_dir = options
        .output
        .clone()
        .unwrap_or_else(|| config.output.default_directory.clone());
    request.convert_to_mp3 = options.mp3;
    request.keep_original = !options.delete_original;

    let mut speed = config.speed.clone();
    if options.no_speed_test {
        speed.enabled = false;
    }

    PipelineConfig {
        request,
        paths: config.paths.clone(),
        download: config.download.clone(),
        speed,
        plan: plan.or_else(|| options.connections.map(ConnectionPlan::fixed)),
    }
}

pub fn print_summary(summary: &ResultSummary, json: bool) -> Result<()> {
    print!("{}", format_summary(summary, json)?);
    Ok(())
}

/// Render one result: pretty JSON, or a title line followed by one line per file
pub fn format_summary(summary: &ResultSummary, json: bool) -> Result<String> {
    if json {
        return Ok(format!("{}\n", serde_json::to_string_pretty(summary)?));
    }

    let mut out = format!("\n{}\n", summary.title);
    for file in &summary.files {
        let kind = match file.kind {
            FileKind::Original => "original",
            FileKind::Mp3 => "mp3",
        };
        out.push_str(&format!(
            "  {:<8} {} ({}, {})\n",
            kind, file.name, file.size, file.format
        ));
    }
    Ok(out)
}

/// One-line account of the connection plan; only a measured rate is shown as a speed
pub fn describe_plan(plan: &ConnectionPlan) -> String {
    match plan.source {
        PlanSource::Measured => format!(
            "Speed: {}, using {} connections",
            human_readable_speed(plan.measured_mbps),
            plan.connection_count
        ),
        PlanSource::Assumed => format!(
            "Speed not measured, assuming {}; using {} connections",
            human_readable_speed(plan.measured_mbps),
            plan.connection_count
        ),
        PlanSource::Fixed => format!("Using {} connections", plan.connection_count),
    }
}

pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
