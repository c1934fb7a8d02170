//! Folder Worker
//!
//! Design principles:
//! - One worker owns one folder for its whole life, nothing is shared
//! - Exactly one directory listing per run, no re-scan
//! - Files are uploaded strictly one after another
//! - A failed file is logged and counted, never fatal to the folder
//! - Cancellation is observed at every await point

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn, Instrument};

use crate::cancel::CancellationToken;
use crate::client::{NetworkError, NetworkErrorKind, UploadAttempt, UploadClient, UploadOutcome};
use crate::job::{self, JobSkip, UploadJob};

// ============================================================================
// Folder validation
// ============================================================================

#[derive(Debug, Error)]
pub enum FolderError {
    #[error("'{0}' does not exist")]
    NotFound(PathBuf),

    #[error("'{0}' is not a directory")]
    NotADirectory(PathBuf),

    #[error("directory '{path}' is not readable: {source}")]
    NotReadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot resolve '{path}': {source}")]
    InvalidPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An absolute, readable directory assigned to exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerFolder(PathBuf);

impl ProducerFolder {
    /// Make `path` absolute and check it is a listable directory.
    pub fn validate(path: impl AsRef<Path>) -> Result<Self, FolderError> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|source| FolderError::InvalidPath {
                    path: path.to_path_buf(),
                    source,
                })?
                .join(path)
        };

        let meta = std::fs::metadata(&absolute).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                FolderError::NotFound(absolute.clone())
            } else {
                FolderError::InvalidPath {
                    path: absolute.clone(),
                    source,
                }
            }
        })?;
        if !meta.is_dir() {
            return Err(FolderError::NotADirectory(absolute));
        }
        std::fs::read_dir(&absolute).map_err(|source| FolderError::NotReadable {
            path: absolute.clone(),
            source,
        })?;

        Ok(Self(absolute))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// Validate every candidate, logging and dropping the invalid ones.
pub fn validate_folders<I, P>(candidates: I) -> Vec<ProducerFolder>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    candidates
        .into_iter()
        .filter_map(|candidate| match ProducerFolder::validate(&candidate) {
            Ok(folder) => {
                info!("Producer folder added: {}", folder.path().display());
                Some(folder)
            }
            Err(e) => {
                warn!("Skipping folder argument: {}", e);
                None
            }
        })
        .collect()
}

// ============================================================================
// Per-file policy
// ============================================================================

/// What the worker does after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// Move on to the next file immediately.
    Continue,
    /// Pause for the backoff period, then move on. The current file is not retried.
    Backoff,
}

/// Policy table: only QUEUE_FULL delays the next file.
pub fn next_step(outcome: &UploadOutcome) -> NextStep {
    match outcome {
        UploadOutcome::QueueFull => NextStep::Backoff,
        _ => NextStep::Continue,
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Completion status of one worker, for logging and the run report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FolderSummary {
    pub producer: String,
    pub folder: PathBuf,
    pub uploaded: usize,
    pub queue_full: usize,
    pub duplicates: usize,
    pub remote_errors: usize,
    pub unknown: usize,
    /// Network and protocol failures.
    pub failed: usize,
    /// Empty files and files whose size or content could not be read.
    pub skipped: usize,
    pub bytes_sent: u64,
    pub cancelled: bool,
    pub listing_failed: bool,
}

impl FolderSummary {
    fn new(producer: &str, folder: &Path) -> Self {
        Self {
            producer: producer.to_string(),
            folder: folder.to_path_buf(),
            ..Self::default()
        }
    }

    /// Uploads attempted, whatever the reply.
    pub fn attempted(&self) -> usize {
        self.uploaded + self.queue_full + self.duplicates + self.remote_errors + self.unknown + self.failed
    }

    /// Files that did not reach the consumer successfully.
    pub fn failures(&self) -> usize {
        self.remote_errors + self.unknown + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failures() > 0 || self.listing_failed
    }

    fn record(&mut self, attempt: &UploadAttempt) {
        self.bytes_sent += attempt.bytes_sent;
        match &attempt.outcome {
            UploadOutcome::Success => self.uploaded += 1,
            UploadOutcome::QueueFull => self.queue_full += 1,
            UploadOutcome::Duplicate => self.duplicates += 1,
            UploadOutcome::RemoteError(_) => self.remote_errors += 1,
            UploadOutcome::Unknown(_) => self.unknown += 1,
            UploadOutcome::ProtocolError(_) | UploadOutcome::NetworkError(_) => self.failed += 1,
        }
    }

    /// Fold another summary's counters into this one.
    pub fn absorb(&mut self, other: &FolderSummary) {
        self.uploaded += other.uploaded;
        self.queue_full += other.queue_full;
        self.duplicates += other.duplicates;
        self.remote_errors += other.remote_errors;
        self.unknown += other.unknown;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.bytes_sent += other.bytes_sent;
        self.cancelled |= other.cancelled;
        self.listing_failed |= other.listing_failed;
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Scans one folder once and uploads every video file in it, in listing order.
pub struct FolderWorker {
    id: String,
    folder: ProducerFolder,
    client: UploadClient,
    backoff: Duration,
    cancel: CancellationToken,
}

impl FolderWorker {
    pub fn new(
        id: impl Into<String>,
        folder: ProducerFolder,
        client: UploadClient,
        backoff: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: id.into(),
            folder,
            client,
            backoff,
            cancel,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run to completion (or cancellation). Consumes the worker.
    pub async fn run(self) -> FolderSummary {
        let span = tracing::info_span!(
            "producer",
            producer = %self.id,
            folder = %self.folder.path().display()
        );
        self.scan_and_upload().instrument(span).await
    }

    async fn scan_and_upload(self) -> FolderSummary {
        let folder = self.folder.path();
        let mut summary = FolderSummary::new(&self.id, folder);
        info!("Starting to scan folder: {}", folder.display());

        let listing = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                warn!("Cancelled before listing {}", folder.display());
                summary.cancelled = true;
                return summary;
            }
            listing = job::list_video_files(folder) => listing,
        };
        let files = match listing {
            Ok(files) => files,
            Err(e) => {
                error!("Failed to list files in directory {}: {}", folder.display(), e);
                summary.listing_failed = true;
                return summary;
            }
        };
        debug!("Found {} candidate video files", files.len());

        for path in files {
            if self.cancel.is_cancelled() {
                warn!("Cancellation requested, not processing further files");
                summary.cancelled = true;
                break;
            }
            match self.process_file(&path, &mut summary).await {
                NextStep::Continue => {}
                NextStep::Backoff => {
                    if !self.cancel.sleep(self.backoff).await {
                        warn!("Interrupted during backoff sleep");
                        summary.cancelled = true;
                        break;
                    }
                }
            }
        }

        info!(
            uploaded = summary.uploaded,
            failures = summary.failures(),
            skipped = summary.skipped,
            "Finished folder: {}",
            folder.display()
        );
        summary
    }

    async fn process_file(&self, path: &Path, summary: &mut FolderSummary) -> NextStep {
        let name = job::display_name(path);
        let file_span = tracing::info_span!("job", file = %name);
        async {
            info!("Found video file: {}", name);
            let job = match UploadJob::prepare(path).await {
                Ok(job) => job,
                Err(JobSkip::Empty) => {
                    warn!("Skipping empty file: {}", name);
                    summary.skipped += 1;
                    return NextStep::Continue;
                }
                Err(e) => {
                    error!("Skipping {}: {}", name, e);
                    summary.skipped += 1;
                    return NextStep::Continue;
                }
            };

            debug!(
                "Attempting upload: {} ({} bytes) to {}",
                name,
                job.size,
                self.client.endpoint()
            );
            let attempt = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => UploadAttempt {
                    outcome: NetworkError::new(NetworkErrorKind::Cancelled, "upload aborted").into(),
                    bytes_sent: 0,
                    elapsed: Duration::ZERO,
                },
                attempt = self.client.transfer(job) => attempt,
            };

            self.log_outcome(&name, &attempt.outcome);
            summary.record(&attempt);
            if matches!(
                &attempt.outcome,
                UploadOutcome::NetworkError(NetworkError { kind: NetworkErrorKind::Cancelled, .. })
            ) {
                summary.cancelled = true;
            }
            debug!("Finished attempt for file: {}", name);
            next_step(&attempt.outcome)
        }
        .instrument(file_span)
        .await
    }

    fn log_outcome(&self, name: &str, outcome: &UploadOutcome) {
        match outcome {
            UploadOutcome::Success => info!("Upload succeeded for {}", name),
            UploadOutcome::QueueFull => warn!(
                "Consumer queue full for {}. Upload rejected, backing off {:?}",
                name, self.backoff
            ),
            UploadOutcome::Duplicate => {
                warn!("Consumer reported duplicate for {}. Assuming already processed.", name)
            }
            UploadOutcome::RemoteError(kind) => {
                error!("Consumer reported error '{}' for {}. Upload failed.", kind, name)
            }
            UploadOutcome::Unknown(raw) => {
                warn!("Unknown consumer response '{}' for {}.", raw, name)
            }
            UploadOutcome::NetworkError(e) => {
                error!("Network failure uploading {}: {}", name, e)
            }
            UploadOutcome::ProtocolError(e) => {
                error!("Protocol failure uploading {}: {}", name, e)
            }
        }
    }
}
