//! Audio downloader using yt-dlp

use crate::config::{DownloadConfig, DEFAULT_OUTPUT_DIR};
use crate::error::DownloadError;
use crate::speed::ConnectionPlan;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const HTTP_HEADERS: &[(&str, &str)] = &[
    ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    ("Accept-Language", "en-us,en;q=0.5"),
    ("Accept-Encoding", "gzip,deflate"),
    ("Accept-Charset", "ISO-8859-1,utf-8;q=0.7,*;q=0.7"),
    ("Connection", "keep-alive"),
];

/// Titles longer than this are cut in the output filename
const TITLE_MAX_CHARS: usize = 200;

/// aria2c refuses to split below this size
const MIN_SPLIT_SIZE: &str = "1M";

const PROGRESS_MARKER: &str = "[progress] ";

const PROGRESS_TEMPLATE: &str = "download:[progress] %(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress.eta)s";

/// One audio download, as asked for by the caller
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub output_dir: PathBuf,
    pub convert_to_mp3: bool,
    pub keep_original: bool,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            convert_to_mp3: false,
            keep_original: true,
        }
    }
}

/// The parts of yt-dlp's info JSON used to find the downloaded file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractionInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub filepath: Option<PathBuf>,
    #[serde(default)]
    pub requested_downloads: Vec<RequestedDownload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestedDownload {
    #[serde(default)]
    pub filepath: Option<PathBuf>,
}

/// Progress event reported while yt-dlp transfers bytes
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    pub status: String,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    /// Bytes per second
    pub speed: Option<f64>,
    /// Seconds remaining
    pub eta: Option<u64>,
}

impl DownloadProgress {
    pub fn fraction(&self) -> Option<f32> {
        match (self.downloaded_bytes, self.total_bytes) {
            (Some(done), Some(total)) if total > 0 => Some((done as f32 / total as f32).min(1.0)),
            _ => None,
        }
    }
}

/// Why extraction failed, derived from yt-dlp diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionErrorKind {
    BotVerification,
    PrivateVideo,
    VideoUnavailable,
    Generic,
}

impl ExtractionErrorKind {
    pub fn classify(diagnostics: &str) -> Self {
        if diagnostics.contains("Sign in to confirm you're not a bot")
            || diagnostics.contains("Sign in to confirm you\u{2019}re not a bot")
        {
            ExtractionErrorKind::BotVerification
        } else if diagnostics.contains("Private video") {
            ExtractionErrorKind::PrivateVideo
        } else if diagnostics.contains("Video unavailable") {
            ExtractionErrorKind::VideoUnavailable
        } else {
            ExtractionErrorKind::Generic
        }
    }

    fn into_error(self, diagnostics: &str) -> DownloadError {
        match self {
            ExtractionErrorKind::BotVerification => DownloadError::BotVerification,
            ExtractionErrorKind::PrivateVideo => DownloadError::PrivateVideo,
            ExtractionErrorKind::VideoUnavailable => DownloadError::VideoUnavailable,
            ExtractionErrorKind::Generic => DownloadError::Failed(summarize_diagnostics(diagnostics)),
        }
    }
}

enum AttemptError {
    /// yt-dlp ran and failed; carries its diagnostics
    Extraction(String),
    Fatal(DownloadError),
}

#[derive(Debug)]
pub struct Downloader {
    yt_dlp_path: PathBuf,
    aria2c_path: Option<PathBuf>,
    settings: DownloadConfig,
}

impl Downloader {
    pub fn new(yt_dlp_path: PathBuf, aria2c_path: Option<PathBuf>, settings: DownloadConfig) -> Self {
        Self {
            yt_dlp_path,
            aria2c_path,
            settings,
        }
    }

    /// Download the best audio stream of `request.url` into `request.output_dir`.
    ///
    /// A failed attempt is repeated once with `--verbose`; if that fails too the
    /// diagnostics are classified into a [`DownloadError`].
    pub async fn download(
        &self,
        request: &DownloadRequest,
        plan: &ConnectionPlan,
        on_progress: &(dyn Fn(DownloadProgress) + Sync),
    ) -> Result<ExtractionInfo, DownloadError> {
        info!("Downloading audio from: {}", request.url);

        tokio::fs::create_dir_all(&request.output_dir).await?;

        let args = self.build_args(request, plan, false);
        debug!("yt-dlp args: {:?}", args);

        let first_error = match self.run_once(&args, on_progress).await {
            Ok(info) => return Ok(info),
            Err(AttemptError::Fatal(e)) => return Err(e),
            Err(AttemptError::Extraction(diagnostics)) => diagnostics,
        };

        warn!(
            "First attempt failed: {}. Retrying...",
            summarize_diagnostics(&first_error)
        );

        let retry_args = self.build_args(request, plan, true);
        match self.run_once(&retry_args, on_progress).await {
            Ok(info) => Ok(info),
            Err(AttemptError::Fatal(e)) => Err(e),
            Err(AttemptError::Extraction(diagnostics)) => {
                debug!("yt-dlp stderr: {}", diagnostics);
                Err(ExtractionErrorKind::classify(&diagnostics).into_error(&diagnostics))
            }
        }
    }

    /// Whether the byte transfer will be handed to aria2c
    pub fn uses_external_downloader(&self, plan: &ConnectionPlan) -> bool {
        self.aria2c_path.is_some() && plan.connection_count > 1
    }

    fn build_args(&self, request: &DownloadRequest, plan: &ConnectionPlan, verbose: bool) -> Vec<String> {
        let template = output_template(&request.output_dir);

        let mut args: Vec<String> = [
            // Best audio-only stream, or the best muxed one if there is none
            "-f",
            "bestaudio/best",
            "-o",
            template.as_str(),
            "--no-playlist",
            "--force-overwrites",
            "--skip-unavailable-fragments",
            "--no-keep-fragments",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        args.extend([
            "--retries".to_string(),
            self.settings.retries.to_string(),
            "--fragment-retries".to_string(),
            self.settings.fragment_retries.to_string(),
            "--sleep-interval".to_string(),
            self.settings.sleep_interval.to_string(),
            "--max-sleep-interval".to_string(),
            self.settings.max_sleep_interval.to_string(),
            "--user-agent".to_string(),
            USER_AGENT.to_string(),
        ]);

        for (name, value) in HTTP_HEADERS {
            args.push("--add-header".to_string());
            args.push(format!("{}:{}", name, value));
        }

        if let Some(ref aria2c) = self.aria2c_path {
            if plan.connection_count > 1 {
                let n = plan.connection_count;
                args.push("--downloader".to_string());
                args.push(aria2c.to_string_lossy().into_owned());
                args.push("--downloader-args".to_string());
                args.push(format!("aria2c:-x {} -s {} -k {}", n, n, MIN_SPLIT_SIZE));
            }
        }

        args.extend([
            // Final info JSON, printed once the file sits at its final path
            "--print".to_string(),
            "after_move:%()j".to_string(),
            "--no-simulate".to_string(),
            "--progress".to_string(),
            "--newline".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
        ]);

        if verbose {
            args.push("--verbose".to_string());
        }

        args.push("--".to_string());
        args.push(request.url.clone());
        args
    }

    async fn run_once(
        &self,
        args: &[String],
        on_progress: &(dyn Fn(DownloadProgress) + Sync),
    ) -> Result<ExtractionInfo, AttemptError> {
        let mut child = Command::new(&self.yt_dlp_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => AttemptError::Fatal(DownloadError::YtDlpNotFound),
                _ => AttemptError::Fatal(DownloadError::Io(e)),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AttemptError::Fatal(DownloadError::Failed("no stdout".to_string())))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AttemptError::Fatal(DownloadError::Failed("no stderr".to_string())))?;

        let read_stdout = async {
            let mut info_line = None;
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(progress) = parse_progress_line(&line) {
                    on_progress(progress);
                } else if line.trim_start().starts_with('{') {
                    info_line = Some(line);
                }
            }
            info_line
        };

        let read_stderr = async {
            let mut diagnostics = String::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(progress) = parse_progress_line(&line) {
                    on_progress(progress);
                    continue;
                }
                diagnostics.push_str(&line);
                diagnostics.push('\n');
            }
            diagnostics
        };

        let (info_line, diagnostics) = tokio::join!(read_stdout, read_stderr);
        let status = child
            .wait()
            .await
            .map_err(|e| AttemptError::Fatal(DownloadError::Io(e)))?;

        if !status.success() {
            let diagnostics = if diagnostics.trim().is_empty() {
                format!("yt-dlp exited with code {:?}", status.code())
            } else {
                diagnostics
            };
            return Err(AttemptError::Extraction(diagnostics));
        }

        let info_line = info_line.ok_or_else(|| {
            AttemptError::Fatal(DownloadError::MetadataParse(
                "yt-dlp printed no info JSON".to_string(),
            ))
        })?;

        let info: ExtractionInfo = serde_json::from_str(&info_line)
            .map_err(|e| AttemptError::Fatal(DownloadError::MetadataParse(e.to_string())))?;

        debug!(
            "Extracted: {}",
            info.title.as_deref().unwrap_or("(untitled)")
        );
        Ok(info)
    }
}

/// Output template for yt-dlp, e.g. `downloads/%(title).200s.%(ext)s`
pub fn output_template(output_dir: &Path) -> String {
    output_dir
        .join(format!("%(title).{}s.%(ext)s", TITLE_MAX_CHARS))
        .to_string_lossy()
        .into_owned()
}

/// Parse a line produced by the progress template; `NA` fields become `None`
pub fn parse_progress_line(line: &str) -> Option<DownloadProgress> {
    let rest = line.trim().strip_prefix(PROGRESS_MARKER)?;
    let fields: Vec<&str> = rest.split('|').collect();
    if fields.len() != 6 {
        return None;
    }

    let number = |s: &str| -> Option<f64> {
        s.trim().parse::<f64>().ok().filter(|n| n.is_finite() && *n >= 0.0)
    };

    Some(DownloadProgress {
        status: fields[0].trim().to_string(),
        downloaded_bytes: number(fields[1]).map(|n| n as u64),
        total_bytes: number(fields[2]).or_else(|| number(fields[3])).map(|n| n as u64),
        speed: number(fields[4]),
        eta: number(fields[5]).map(|n| n as u64),
    })
}

/// Reduce yt-dlp stderr to the message worth showing a user
fn summarize_diagnostics(diagnostics: &str) -> String {
    let last_error = diagnostics
        .lines()
        .rev()
        .filter_map(|l| l.trim_start().strip_prefix("ERROR:"))
        .map(str::trim)
        .find(|m| !m.is_empty());

    match last_error {
        Some(message) => message.to_string(),
        None => diagnostics
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("unknown error")
            .to_string(),
    }
}
