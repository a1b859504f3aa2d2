//! Error types for audiofetch-core

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AudioFetchError>;

#[derive(Error, Debug)]
pub enum AudioFetchError {
    #[error("{0}")]
    Download(#[from] DownloadError),

    #[error("{0}")]
    Locate(#[from] LocateError),

    #[error("{0}")]
    Convert(#[from] ConvertError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("yt-dlp not found. Install with: pipx install yt-dlp")]
    YtDlpNotFound,

    #[error("YouTube is requesting bot verification. Please try a different video or try again later.")]
    BotVerification,

    #[error("This is a private video and cannot be downloaded.")]
    PrivateVideo,

    #[error("This video is unavailable or has been removed.")]
    VideoUnavailable,

    #[error("Download failed: {0}")]
    Failed(String),

    #[error("Failed to parse extraction metadata: {0}")]
    MetadataParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum LocateError {
    #[error("Could not find downloaded audio file in {}. The download may have failed.", .0.display())]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("ffmpeg not found - MP3 conversion unavailable")]
    EncoderUnavailable,

    #[error("MP3 conversion failed: {stderr}")]
    Failed { stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    LoadError(String),

    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}
