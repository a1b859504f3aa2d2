//! Configuration management for audiofetch

use crate::error::ConfigError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default output directory, relative to the working directory
pub const DEFAULT_OUTPUT_DIR: &str = "downloads";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    pub output: OutputConfig,
    pub download: DownloadConfig,
    pub speed: SpeedConfig,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Path to yt-dlp binary (auto-detected if not set)
    pub yt_dlp: Option<PathBuf>,
    /// Path to FFmpeg binary (auto-detected if not set)
    pub ffmpeg: Option<PathBuf>,
    /// Path to aria2c binary (auto-detected if not set)
    pub aria2c: Option<PathBuf>,
    /// Path to speedtest-cli binary (auto-detected if not set)
    pub speedtest: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output directory
    pub default_directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Retries for transient HTTP failures
    pub retries: u32,
    /// Retries per fragment for segmented streams
    pub fragment_retries: u32,
    /// Minimum seconds to sleep before each download
    pub sleep_interval: u32,
    /// Upper bound of the randomized sleep
    pub max_sleep_interval: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedConfig {
    /// Run a speed test before downloading
    pub enabled: bool,
    /// Assumed throughput when the speed test is skipped or fails
    pub fallback_mbps: f64,
    /// Give up on the speed test after this many seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum parallel downloads
    pub max_parallel: usize,
    /// Continue on error
    pub continue_on_error: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            retries: 10,
            fragment_retries: 10,
            sleep_interval: 1,
            max_sleep_interval: 2,
        }
    }
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fallback_mbps: 10.0,
            timeout_secs: 60,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            output: OutputConfig {
                default_directory: PathBuf::from(DEFAULT_OUTPUT_DIR),
            },
            download: DownloadConfig::default(),
            speed: SpeedConfig::default(),
            batch: BatchConfig {
                max_parallel: 2,
                continue_on_error: true,
            },
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Load from default config directory
        if let Some(path) = Self::default_file() {
            if path.exists() {
                debug!("Loading config from {}", path.display());
                figment = figment.merge(Toml::file(&path));
            }
        }

        // Load from specified config file
        if let Some(path) = config_file {
            if !path.exists() {
                return Err(ConfigError::LoadError(format!(
                    "{} does not exist",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment, e.g. AUDIOFETCH_SPEED__ENABLED=false
        figment = figment.merge(Env::prefixed("AUDIOFETCH_").split("__"));

        let config: Config = figment
            .extract()
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Location of the per-user config file
    pub fn default_file() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("audiofetch/config.toml"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.max_parallel == 0 {
            return Err(ConfigError::InvalidValue(
                "batch.max_parallel must be at least 1".to_string(),
            ));
        }
        if !self.speed.fallback_mbps.is_finite() || self.speed.fallback_mbps < 0.0 {
            return Err(ConfigError::InvalidValue(format!(
                "speed.fallback_mbps must be a non-negative number, got {}",
                self.speed.fallback_mbps
            )));
        }
        if self.download.max_sleep_interval < self.download.sleep_interval {
            return Err(ConfigError::InvalidValue(
                "download.max_sleep_interval must not be below download.sleep_interval"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

impl PathsConfig {
    /// Get yt-dlp path, auto-detecting if not configured
    pub fn yt_dlp_path(&self) -> Result<PathBuf, ConfigError> {
        resolve_tool(self.yt_dlp.as_deref(), "yt-dlp").ok_or_else(|| match self.yt_dlp {
            Some(ref path) => {
                ConfigError::InvalidValue(format!("yt-dlp not found at {}", path.display()))
            }
            None => ConfigError::InvalidValue("yt-dlp not found in PATH".to_string()),
        })
    }

    /// FFmpeg path if configured or present in PATH
    pub fn ffmpeg_path(&self) -> Option<PathBuf> {
        resolve_tool(self.ffmpeg.as_deref(), "ffmpeg")
    }

    /// aria2c path if configured or present in PATH
    pub fn aria2c_path(&self) -> Option<PathBuf> {
        resolve_tool(self.aria2c.as_deref(), "aria2c")
    }

    /// speedtest-cli path if configured or present in PATH
    pub fn speedtest_path(&self) -> Option<PathBuf> {
        resolve_tool(self.speedtest.as_deref(), "speedtest-cli")
    }
}

/// A configured path wins over PATH lookup, but only if it exists.
fn resolve_tool(configured: Option<&Path>, binary: &str) -> Option<PathBuf> {
    match configured {
        Some(path) if path.exists() => Some(path.to_path_buf()),
        Some(path) => {
            debug!("Configured {} path {} does not exist", binary, path.display());
            None
        }
        None => which::which(binary).ok(),
    }
}
