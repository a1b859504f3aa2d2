//! Pipeline orchestration: speed test, download, locate, convert, report

use crate::config::{DownloadConfig, PathsConfig, SpeedConfig};
use crate::downloader::{DownloadProgress, DownloadRequest, Downloader};
use crate::encoder::{same_file, Mp3Converter};
use crate::error::{AudioFetchError, DownloadError};
use crate::locator::locate_downloaded_file;
use crate::report::{FileKind, ResultSummary};
use crate::speed::{ConnectionPlan, SpeedTester};

use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub request: DownloadRequest,
    pub paths: PathsConfig,
    pub download: DownloadConfig,
    pub speed: SpeedConfig,
    /// Use this plan instead of measuring the network
    pub plan: Option<ConnectionPlan>,
}

/// Pipeline progress stages
#[derive(Debug, Clone)]
pub enum PipelineStage {
    MeasuringSpeed,
    Planned(ConnectionPlan),
    Downloading(DownloadProgress),
    Downloaded { path: PathBuf },
    Converting,
    Complete { duration: Duration },
    Failed { stage: String, error: String },
}

/// Main processing pipeline
pub struct Pipeline {
    config: PipelineConfig,
    progress_tx: mpsc::Sender<PipelineStage>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, progress_tx: mpsc::Sender<PipelineStage>) -> Self {
        Self { config, progress_tx }
    }

    pub async fn run(&self) -> Result<ResultSummary, AudioFetchError> {
        let start_time = Instant::now();
        let request = &self.config.request;

        info!("Starting pipeline for: {}", request.url);

        tokio::fs::create_dir_all(&request.output_dir)
            .await
            .map_err(|e| self.fail("prepare", e))?;

        // A bad configured path is a config problem; an empty PATH lookup means not installed
        let yt_dlp_path = match (self.config.paths.yt_dlp_path(), &self.config.paths.yt_dlp) {
            (Ok(path), _) => path,
            (Err(e), Some(_)) => return Err(self.fail("download", e)),
            (Err(_), None) => return Err(self.fail("download", DownloadError::YtDlpNotFound)),
        };

        // 1. Connection plan
        let plan = self.connection_plan().await;
        let _ = self.progress_tx.send(PipelineStage::Planned(plan)).await;

        // 2. Download
        let downloader = Downloader::new(
            yt_dlp_path,
            self.config.paths.aria2c_path(),
            self.config.download.clone(),
        );
        if downloader.uses_external_downloader(&plan) {
            info!("Delegating transfer to aria2c with {} connections", plan.connection_count);
        }

        let on_progress = |progress: DownloadProgress| {
            let _ = self.progress_tx.try_send(PipelineStage::Downloading(progress));
        };
        let info = downloader
            .download(request, &plan, &on_progress)
            .await
            .map_err(|e| self.fail("download", e))?;

        // 3. Locate
        let downloaded = locate_downloaded_file(&info, &request.output_dir)
            .await
            .map_err(|e| self.fail("locate", e))?;

        info!("Downloaded: {}", downloaded.display());
        let _ = self
            .progress_tx
            .send(PipelineStage::Downloaded {
                path: downloaded.clone(),
            })
            .await;

        let mut summary = ResultSummary::new(info.title.as_deref());
        summary.record(&downloaded, FileKind::Original);

        // 4. Convert (if requested)
        if request.convert_to_mp3 {
            let _ = self.progress_tx.send(PipelineStage::Converting).await;

            let converter = Mp3Converter::new(self.config.paths.ffmpeg_path());
            let mp3_path = converter
                .convert(&downloaded, &request.output_dir)
                .await
                .map_err(|e| self.fail("convert", e))?;

            if same_file(&downloaded, &mp3_path) {
                // The original bytes were replaced by the encode
                summary.remove(FileKind::Original);
            } else if !request.keep_original && downloaded.exists() {
                tokio::fs::remove_file(&downloaded)
                    .await
                    .map_err(|e| self.fail("convert", e))?;
                summary.remove(FileKind::Original);
                info!("Original file removed as requested");
            }

            summary.record(&mp3_path, FileKind::Mp3);
        }

        let duration = start_time.elapsed();
        info!("Pipeline complete: {} ({:.1}s)", summary.title, duration.as_secs_f32());

        let _ = self
            .progress_tx
            .send(PipelineStage::Complete { duration })
            .await;

        Ok(summary)
    }

    async fn connection_plan(&self) -> ConnectionPlan {
        if let Some(plan) = self.config.plan {
            debug!("Using preset plan: {} connections", plan.connection_count);
            return plan;
        }

        let speed = &self.config.speed;
        if !speed.enabled {
            debug!("Speed test disabled");
            return ConnectionPlan::assumed(speed.fallback_mbps);
        }

        let _ = self.progress_tx.send(PipelineStage::MeasuringSpeed).await;
        SpeedTester::new(
            self.config.paths.speedtest_path(),
            speed.fallback_mbps,
            Duration::from_secs(speed.timeout_secs),
        )
        .plan()
        .await
    }

    fn fail(&self, stage: &str, error: impl Into<AudioFetchError>) -> AudioFetchError {
        let error = error.into();
        let _ = self.progress_tx.try_send(PipelineStage::Failed {
            stage: stage.to_string(),
            error: error.to_string(),
        });
        error
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::{ConfigError, ConvertError};
    use crate::speed::PlanSource;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// yt-dlp stand-in: writes "<title>.webm" next to the `-o` template and
    /// prints the info JSON the way `--print after_move:%()j` does.
    const FAKE_YT_DLP: &str = r#"#!/bin/sh
prev=""
out=""
for a in "$@"; do
  [ "$prev" = "-o" ] && out="$a"
  prev="$a"
done
dir=$(dirname "$out")
mkdir -p "$dir"
printf 'webm-audio-bytes' > "$dir/Test Song.webm"
echo "[progress] downloading|8|16|NA|100.0|1"
echo "[progress] finished|16|16|NA|NA|NA"
echo "{\"title\": \"Test Song\", \"ext\": \"webm\", \"filepath\": \"$dir/Test Song.webm\", \"requested_downloads\": [{\"filepath\": \"$dir/Test Song.webm\"}]}"
"#;

    const FAKE_FFMPEG: &str = r#"#!/bin/sh
for a in "$@"; do last="$a"; done
printf 'mp3-bytes' > "$last"
"#;

    const FAILING_FFMPEG: &str = r#"#!/bin/sh
echo "Test Song.webm: Invalid data found when processing input" >&2
exit 1
"#;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// yt-dlp stand-in that always fails with `message`, logging each
    /// invocation's arguments to `calls.log`.
    fn failing_yt_dlp(dir: &Path, message: &str) -> PathBuf {
        let log = dir.join("calls.log");
        let body = format!(
            "#!/bin/sh\necho \"$*\" >> '{}'\necho \"ERROR: [youtube] abc123: {}\" >&2\nexit 1\n",
            log.display(),
            message
        );
        write_script(dir, "yt-dlp", &body)
    }

    fn pipeline_config(
        bin: &Path,
        out: &Path,
        yt_dlp: PathBuf,
        ffmpeg: Option<PathBuf>,
    ) -> PipelineConfig {
        let mut request = DownloadRequest::new("https://www.youtube.com/watch?v=abc123");
        request.output_dir = out.to_path_buf();
        PipelineConfig {
            request,
            paths: PathsConfig {
                yt_dlp: Some(yt_dlp),
                ffmpeg: Some(ffmpeg.unwrap_or_else(|| bin.join("no-ffmpeg"))),
                aria2c: Some(bin.join("no-aria2c")),
                speedtest: Some(bin.join("no-speedtest")),
            },
            download: DownloadConfig::default(),
            speed: SpeedConfig::default(),
            plan: None,
        }
    }

    async fn run(config: PipelineConfig) -> (Result<ResultSummary, AudioFetchError>, Vec<PipelineStage>) {
        let (tx, mut rx) = mpsc::channel(64);
        let result = Pipeline::new(config, tx).run().await;
        let mut stages = Vec::new();
        while let Ok(stage) = rx.try_recv() {
            stages.push(stage);
        }
        (result, stages)
    }

    #[tokio::test]
    async fn test_download_only_reports_single_original() {
        let bin = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let yt_dlp = write_script(bin.path(), "yt-dlp", FAKE_YT_DLP);

        let (result, stages) = run(pipeline_config(bin.path(), out.path(), yt_dlp, None)).await;
        let summary = result.unwrap();

        assert_eq!(summary.title, "Test Song");
        assert_eq!(summary.files.len(), 1);
        assert_eq!(summary.files[0].kind, FileKind::Original);
        assert_eq!(summary.files[0].name, "Test Song.webm");
        assert_eq!(summary.files[0].format, "WEBM");

        // speedtest-cli is absent, so the 10 Mbps fallback gives 4 connections
        assert!(stages.iter().any(|s| matches!(
            s,
            PipelineStage::Planned(plan) if plan.connection_count == 4
        )));
        assert!(stages.iter().any(|s| matches!(
            s,
            PipelineStage::Downloading(p) if p.fraction() == Some(0.5)
        )));
    }

    #[tokio::test]
    async fn test_convert_and_drop_original() {
        let bin = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let yt_dlp = write_script(bin.path(), "yt-dlp", FAKE_YT_DLP);
        let ffmpeg = write_script(bin.path(), "ffmpeg", FAKE_FFMPEG);

        let mut config = pipeline_config(bin.path(), out.path(), yt_dlp, Some(ffmpeg));
        config.request.convert_to_mp3 = true;
        config.request.keep_original = false;

        let (result, _) = run(config).await;
        let summary = result.unwrap();

        assert_eq!(summary.files.len(), 1);
        assert_eq!(summary.files[0].kind, FileKind::Mp3);
        assert_eq!(summary.files[0].name, "Test Song.mp3");
        assert_eq!(summary.files[0].format, "MP3");
        assert!(!out.path().join("Test Song.webm").exists());
        assert!(out.path().join("Test Song.mp3").exists());
    }

    #[tokio::test]
    async fn test_convert_keeps_original_and_overwrites_stale_mp3() {
        let bin = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let yt_dlp = write_script(bin.path(), "yt-dlp", FAKE_YT_DLP);
        let ffmpeg = write_script(bin.path(), "ffmpeg", FAKE_FFMPEG);
        std::fs::write(out.path().join("Test Song.mp3"), b"stale-from-last-run").unwrap();

        let mut config = pipeline_config(bin.path(), out.path(), yt_dlp, Some(ffmpeg));
        config.request.convert_to_mp3 = true;

        let (result, _) = run(config).await;
        let summary = result.unwrap();

        let kinds: Vec<FileKind> = summary.files.iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![FileKind::Original, FileKind::Mp3]);
        assert_eq!(
            std::fs::read(out.path().join("Test Song.mp3")).unwrap(),
            b"mp3-bytes"
        );
        assert!(out.path().join("Test Song.webm").exists());
    }

    #[tokio::test]
    async fn test_missing_encoder_fails_after_download() {
        let bin = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let yt_dlp = write_script(bin.path(), "yt-dlp", FAKE_YT_DLP);

        let mut config = pipeline_config(bin.path(), out.path(), yt_dlp, None);
        config.request.convert_to_mp3 = true;

        let (result, stages) = run(config).await;

        assert!(matches!(
            result,
            Err(AudioFetchError::Convert(ConvertError::EncoderUnavailable))
        ));
        assert!(stages.iter().any(|s| matches!(
            s,
            PipelineStage::Failed { stage, .. } if stage == "convert"
        )));
        assert!(!out.path().join("Test Song.mp3").exists());
    }

    #[tokio::test]
    async fn test_conversion_failure_carries_diagnostics() {
        let bin = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let yt_dlp = write_script(bin.path(), "yt-dlp", FAKE_YT_DLP);
        let ffmpeg = write_script(bin.path(), "ffmpeg", FAILING_FFMPEG);

        let mut config = pipeline_config(bin.path(), out.path(), yt_dlp, Some(ffmpeg));
        config.request.convert_to_mp3 = true;

        let (result, _) = run(config).await;

        match result {
            Err(AudioFetchError::Convert(ConvertError::Failed { stderr })) => {
                assert!(stderr.contains("Invalid data found when processing input"));
            }
            other => panic!("expected conversion failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bot_verification_after_single_verbose_retry() {
        let bin = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let yt_dlp = failing_yt_dlp(
            bin.path(),
            "Sign in to confirm you're not a bot. Use --cookies-from-browser",
        );

        let (result, _) = run(pipeline_config(bin.path(), out.path(), yt_dlp, None)).await;

        assert!(matches!(
            result,
            Err(AudioFetchError::Download(DownloadError::BotVerification))
        ));

        let calls = std::fs::read_to_string(bin.path().join("calls.log")).unwrap();
        let calls: Vec<&str> = calls.lines().collect();
        assert_eq!(calls.len(), 2);
        assert!(!calls[0].contains("--verbose"));
        assert!(calls[1].contains("--verbose"));
    }

    #[tokio::test]
    async fn test_private_video_is_classified() {
        let bin = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let yt_dlp = failing_yt_dlp(bin.path(), "Private video. Sign in if you've been granted access");

        let (result, _) = run(pipeline_config(bin.path(), out.path(), yt_dlp, None)).await;

        assert!(matches!(
            result,
            Err(AudioFetchError::Download(DownloadError::PrivateVideo))
        ));
    }

    #[tokio::test]
    async fn test_missing_configured_yt_dlp_is_config_error() {
        let bin = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let missing = bin.path().join("missing-yt-dlp");

        let (result, stages) = run(pipeline_config(bin.path(), out.path(), missing.clone(), None)).await;

        match result {
            Err(AudioFetchError::Config(ConfigError::InvalidValue(message))) => {
                assert!(message.contains(&missing.display().to_string()));
            }
            other => panic!("expected config error, got {:?}", other),
        }
        assert!(stages.iter().any(|s| matches!(
            s,
            PipelineStage::Failed { stage, .. } if stage == "download"
        )));
    }

    #[tokio::test]
    async fn test_disabled_speed_test_assumes_fallback() {
        let bin = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let yt_dlp = write_script(bin.path(), "yt-dlp", FAKE_YT_DLP);

        let mut config = pipeline_config(bin.path(), out.path(), yt_dlp, None);
        config.speed.enabled = false;

        let (result, stages) = run(config).await;
        assert!(result.is_ok());
        assert!(!stages.iter().any(|s| matches!(s, PipelineStage::MeasuringSpeed)));
        assert!(stages.iter().any(|s| matches!(
            s,
            PipelineStage::Planned(plan)
                if plan.source == PlanSource::Assumed && plan.connection_count == 4
        )));
    }

    #[tokio::test]
    async fn test_preset_plan_skips_speed_test() {
        let bin = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let yt_dlp = write_script(bin.path(), "yt-dlp", FAKE_YT_DLP);

        let mut config = pipeline_config(bin.path(), out.path(), yt_dlp, None);
        config.plan = Some(ConnectionPlan::fixed(16));

        let (result, stages) = run(config).await;
        assert!(result.is_ok());
        assert!(!stages.iter().any(|s| matches!(s, PipelineStage::MeasuringSpeed)));
        assert!(stages.iter().any(|s| matches!(
            s,
            PipelineStage::Planned(plan) if plan.connection_count == 16
        )));
    }
}
