//! File discovery and upload jobs.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tracing::debug;

/// Recognised video extensions, matched against the lowercased file name.
pub const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".avi", ".mkv", ".wmv", ".flv"];

/// Case-insensitive check of a file name against [`VIDEO_EXTENSIONS`].
pub fn has_video_extension(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    VIDEO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Take one snapshot of `folder` and return the regular video files in it.
///
/// Entries come back in listing order; no sorting is applied. Symlinks are
/// followed when deciding whether an entry is a regular file.
pub async fn list_video_files(folder: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(folder).await?;
    let mut found = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => continue,
            Err(e) => {
                debug!("Ignoring {}: {}", path.display(), e);
                continue;
            }
        }
        let matches = path
            .file_name()
            .map(|name| has_video_extension(&name.to_string_lossy()))
            .unwrap_or(false);
        if matches {
            found.push(path);
        }
    }

    Ok(found)
}

/// Why a discovered file did not become a job.
#[derive(Debug, Error)]
pub enum JobSkip {
    #[error("file is empty")]
    Empty,

    #[error("cannot get file size: {0}")]
    SizeUnavailable(#[source] io::Error),

    #[error("cannot open file: {0}")]
    OpenFailed(#[source] io::Error),
}

/// One discovered file, ready for a single upload attempt.
#[derive(Debug)]
pub struct UploadJob {
    /// Base name, no path separators.
    pub name: String,
    /// Byte length at discovery time, always at least 1.
    pub size: u64,
    pub path: PathBuf,
    pub source: File,
}

impl UploadJob {
    /// Size the file and open it for reading.
    pub async fn prepare(path: &Path) -> Result<Self, JobSkip> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(JobSkip::SizeUnavailable)?
            .len();
        if size == 0 {
            return Err(JobSkip::Empty);
        }
        let source = File::open(path).await.map_err(JobSkip::OpenFailed)?;
        Ok(Self {
            name: display_name(path),
            size,
            path: path.to_path_buf(),
            source,
        })
    }
}

/// File name used on the wire and in logs.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
