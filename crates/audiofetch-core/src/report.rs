//! Result summary returned to callers

use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Original,
    Mp3,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub size: String,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultSummary {
    pub title: String,
    pub status: Status,
    pub files: Vec<FileEntry>,
}

impl ResultSummary {
    pub fn new(title: Option<&str>) -> Self {
        Self {
            title: title.unwrap_or("Unknown Title").to_string(),
            status: Status::Success,
            files: Vec::new(),
        }
    }

    /// Record `path` as the entry of `kind`, replacing any previous one.
    /// Missing files are not recorded.
    pub fn record(&mut self, path: &Path, kind: FileKind) {
        let Ok(metadata) = std::fs::metadata(path) else {
            return;
        };
        self.remove(kind);
        self.files.push(FileEntry {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            kind,
            size: human_readable_size(metadata.len()),
            format: path
                .extension()
                .map(|e| e.to_string_lossy().to_uppercase())
                .unwrap_or_default(),
        });
    }

    pub fn remove(&mut self, kind: FileKind) {
        self.files.retain(|f| f.kind != kind);
    }

    pub fn entry(&self, kind: FileKind) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.kind == kind)
    }
}

pub fn human_readable_size(size_bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    if size_bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = size_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, UNITS[unit])
}
