//! Throughput measurement and connection-count selection

use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// (minimum Mbps, connections), highest threshold first
pub const CONNECTION_THRESHOLDS: &[(f64, u32)] = &[(100.0, 16), (50.0, 8), (10.0, 4), (0.0, 1)];

/// Where a plan's throughput figure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanSource {
    /// speedtest-cli reported it
    Measured,
    /// The configured fallback, used when no measurement happened
    Assumed,
    /// Connection count given directly; no throughput involved
    Fixed,
}

/// Throughput and the connection count derived from it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionPlan {
    pub measured_mbps: f64,
    pub connection_count: u32,
    pub source: PlanSource,
}

impl ConnectionPlan {
    pub fn from_mbps(mbps: f64) -> Self {
        Self {
            measured_mbps: mbps,
            connection_count: choose_connections(mbps),
            source: PlanSource::Measured,
        }
    }

    /// A plan built from the fallback rate rather than a measurement
    pub fn assumed(mbps: f64) -> Self {
        Self {
            source: PlanSource::Assumed,
            ..Self::from_mbps(mbps)
        }
    }

    /// A plan with a fixed connection count, bypassing the table
    pub fn fixed(connection_count: u32) -> Self {
        Self {
            measured_mbps: 0.0,
            connection_count: connection_count.max(1),
            source: PlanSource::Fixed,
        }
    }

    pub fn is_measured(&self) -> bool {
        self.source == PlanSource::Measured
    }
}

/// Pick the connection count for the first threshold `mbps` meets
pub fn choose_connections(mbps: f64) -> u32 {
    CONNECTION_THRESHOLDS
        .iter()
        .find(|(threshold, _)| mbps >= *threshold)
        .map(|(_, connections)| *connections)
        .unwrap_or(1)
}

pub fn human_readable_speed(mbps: f64) -> String {
    if mbps >= 1000.0 {
        format!("{:.2} Gbps", mbps / 1000.0)
    } else {
        format!("{:.2} Mbps", mbps)
    }
}

/// `speedtest-cli --json` report; only the download rate is read
#[derive(Debug, Deserialize)]
struct SpeedtestReport {
    /// Bits per second
    download: f64,
}

/// Best-effort throughput measurement backed by speedtest-cli
#[derive(Debug)]
pub struct SpeedTester {
    speedtest_path: Option<PathBuf>,
    fallback_mbps: f64,
    timeout: Duration,
}

impl SpeedTester {
    pub fn new(speedtest_path: Option<PathBuf>, fallback_mbps: f64, timeout: Duration) -> Self {
        Self {
            speedtest_path,
            fallback_mbps,
            timeout,
        }
    }

    /// Measure download throughput in Mbps, returning the fallback on any failure
    pub async fn measure_mbps(&self) -> f64 {
        self.plan().await.measured_mbps
    }

    /// Measure and derive the plan in one step; a failed measurement yields an
    /// [`PlanSource::Assumed`] plan at the fallback rate
    pub async fn plan(&self) -> ConnectionPlan {
        info!("Measuring internet download speed...");
        let plan = match self.try_measure().await {
            Ok(mbps) => {
                info!("Speed: {}", human_readable_speed(mbps));
                ConnectionPlan::from_mbps(mbps)
            }
            Err(reason) => {
                warn!(
                    "Speed test failed ({}), assuming {}",
                    reason,
                    human_readable_speed(self.fallback_mbps)
                );
                ConnectionPlan::assumed(self.fallback_mbps)
            }
        };
        info!("Using {} connections", plan.connection_count);
        plan
    }

    async fn try_measure(&self) -> Result<f64, String> {
        let path = self
            .speedtest_path
            .as_ref()
            .ok_or_else(|| "speedtest-cli not found".to_string())?;

        let mut cmd = Command::new(path);
        cmd.args(["--json", "--no-upload"])
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| format!("timed out after {:?}", self.timeout))?
            .map_err(|e| e.to_string())?;

        if !output.status.success() {
            debug!(
                "speedtest-cli stderr: {}",
                String::from_utf8_lossy(&output.stderr)
            );
            return Err(format!("speedtest-cli exited with {:?}", output.status.code()));
        }

        parse_speedtest_output(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_speedtest_output(stdout: &str) -> Result<f64, String> {
    let report: SpeedtestReport = serde_json::from_str(stdout.trim()).map_err(|e| e.to_string())?;
    if !report.download.is_finite() || report.download < 0.0 {
        return Err(format!("implausible download rate: {}", report.download));
    }
    Ok(report.download / 1_000_000.0)
}
