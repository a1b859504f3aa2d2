//! audiofetch-core: audio download pipeline with speed-aware multi-connection transfer

pub mod config;
pub mod downloader;
pub mod encoder;
pub mod error;
pub mod locator;
pub mod pipeline;
pub mod report;
pub mod speed;

pub use config::Config;
pub use downloader::DownloadRequest;
pub use error::{AudioFetchError, Result};
pub use report::{human_readable_size, ResultSummary};
pub use speed::{choose_connections, ConnectionPlan, PlanSource};
