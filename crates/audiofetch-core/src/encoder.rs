//! MP3 transcoding using FFmpeg

use crate::error::ConvertError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

const MP3_CODEC_ARGS: &[&str] = &[
    "-vn",
    "-codec:a", "libmp3lame",
    "-b:a", "320k",
    "-ac", "2",     // Force stereo
    "-ar", "44100", // Standard sample rate
];

#[derive(Debug)]
pub struct Mp3Converter {
    ffmpeg_path: Option<PathBuf>,
}

impl Mp3Converter {
    pub fn new(ffmpeg_path: Option<PathBuf>) -> Self {
        Self { ffmpeg_path }
    }

    /// Target path for `source`: same stem, `.mp3`, inside `output_dir`
    pub fn target_path(source: &Path, output_dir: &Path) -> PathBuf {
        let stem = source.file_stem().unwrap_or(source.as_os_str());
        let mut name = stem.to_os_string();
        name.push(".mp3");
        output_dir.join(name)
    }

    /// Transcode `source` to a 320 kbps stereo MP3 next to it in `output_dir`.
    ///
    /// An existing file at the target path is replaced.
    pub async fn convert(&self, source: &Path, output_dir: &Path) -> Result<PathBuf, ConvertError> {
        let ffmpeg = self
            .ffmpeg_path
            .as_ref()
            .ok_or(ConvertError::EncoderUnavailable)?;

        let target = Self::target_path(source, output_dir);
        let in_place = same_file(source, &target);

        // ffmpeg cannot read and write the same path
        let encode_to = if in_place {
            output_dir.join(format!(
                ".{}.converting.mp3",
                source.file_stem().unwrap_or_default().to_string_lossy()
            ))
        } else {
            if target.exists() {
                tokio::fs::remove_file(&target).await?;
                info!("Removed existing MP3 file to prevent duplicates");
            }
            target.clone()
        };

        info!("Converting to MP3...");
        let mut cmd = Command::new(ffmpeg);
        cmd.args(["-hide_banner", "-nostdin", "-y"]);
        cmd.arg("-i").arg(source);
        cmd.args(MP3_CODEC_ARGS);
        cmd.arg(&encode_to);
        cmd.stdin(Stdio::null()).kill_on_drop(true);

        let output = cmd.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            debug!("FFmpeg error: {}", stderr);
            if in_place {
                let _ = tokio::fs::remove_file(&encode_to).await;
            }
            return Err(ConvertError::Failed { stderr });
        }

        if in_place {
            tokio::fs::rename(&encode_to, &target).await?;
        }

        info!("MP3 saved: {}", target.display());
        Ok(target)
    }
}

/// Whether `a` and `b` name the same path once the parent is resolved
pub(crate) fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), b.parent().map(std::fs::canonicalize)) {
        (Ok(a), Some(Ok(parent))) => b.file_name().map(|n| parent.join(n)) == Some(a),
        _ => a == b,
    }
}
