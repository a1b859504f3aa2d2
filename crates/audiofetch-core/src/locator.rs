//! Finding the file yt-dlp produced

use crate::downloader::ExtractionInfo;
use crate::error::LocateError;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Leftovers of an interrupted transfer, never the finished file
const PARTIAL_EXTENSIONS: &[&str] = &["part", "ytdl", "aria2"];

/// Locate the downloaded file: per-download paths first, then the top-level
/// `filepath`, then the newest file in `output_dir`.
pub async fn locate_downloaded_file(
    info: &ExtractionInfo,
    output_dir: &Path,
) -> Result<PathBuf, LocateError> {
    if let Some(path) = info
        .requested_downloads
        .iter()
        .filter_map(|req| req.filepath.as_ref())
        .find(|path| path.exists())
    {
        debug!("Found file from requested downloads: {}", path.display());
        return Ok(path.clone());
    }

    if let Some(path) = info.filepath.as_ref().filter(|path| path.exists()) {
        debug!("Found file from info filepath: {}", path.display());
        return Ok(path.clone());
    }

    match newest_file(output_dir).await? {
        Some(path) => {
            debug!("Falling back to newest file: {}", path.display());
            Ok(path)
        }
        None => Err(LocateError::FileNotFound(output_dir.to_path_buf())),
    }
}

async fn newest_file(dir: &Path) -> Result<Option<PathBuf>, LocateError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_partial = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| PARTIAL_EXTENSIONS.iter().any(|p| ext.eq_ignore_ascii_case(p)))
            .unwrap_or(false);
        if is_partial {
            continue;
        }

        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified()?;

        if newest.as_ref().map_or(true, |(best, _)| modified > *best) {
            newest = Some((modified, path));
        }
    }

    Ok(newest.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::RequestedDownload;
    use std::fs::{self, File};
    use std::time::Duration;

    fn touch(path: &Path, age: Duration) {
        fs::write(path, b"data").unwrap();
        let mtime = SystemTime::now() - age;
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
    }

    #[tokio::test]
    async fn test_prefers_first_existing_requested_download() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("song.m4a");
        let other = dir.path().join("other.webm");
        touch(&real, Duration::from_secs(60));
        touch(&other, Duration::ZERO);

        let info = ExtractionInfo {
            requested_downloads: vec![
                RequestedDownload {
                    filepath: Some(dir.path().join("missing.webm")),
                },
                RequestedDownload {
                    filepath: Some(real.clone()),
                },
            ],
            filepath: Some(other),
            ..ExtractionInfo::default()
        };

        assert_eq!(locate_downloaded_file(&info, dir.path()).await.unwrap(), real);
    }

    #[tokio::test]
    async fn test_falls_back_to_top_level_filepath() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("song.opus");
        touch(&file, Duration::from_secs(60));
        touch(&dir.path().join("newer.webm"), Duration::ZERO);

        let info = ExtractionInfo {
            filepath: Some(file.clone()),
            ..ExtractionInfo::default()
        };

        assert_eq!(locate_downloaded_file(&info, dir.path()).await.unwrap(), file);
    }

    #[tokio::test]
    async fn test_falls_back_to_newest_complete_file() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("old.webm"), Duration::from_secs(3600));
        touch(&dir.path().join("new.m4a"), Duration::from_secs(10));
        touch(&dir.path().join("newest.webm.part"), Duration::ZERO);
        fs::create_dir(dir.path().join("subdir")).unwrap();

        let info = ExtractionInfo {
            filepath: Some(dir.path().join("gone.webm")),
            ..ExtractionInfo::default()
        };

        assert_eq!(
            locate_downloaded_file(&info, dir.path()).await.unwrap(),
            dir.path().join("new.m4a")
        );
    }

    #[tokio::test]
    async fn test_empty_directory_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = locate_downloaded_file(&ExtractionInfo::default(), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, LocateError::FileNotFound(_)));

        let err = locate_downloaded_file(&ExtractionInfo::default(), &dir.path().join("absent"))
            .await
            .unwrap_err();
        assert!(matches!(err, LocateError::FileNotFound(_)));
    }
}
