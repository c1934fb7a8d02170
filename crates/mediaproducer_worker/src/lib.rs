//! Folder workers for the media producer.
//!
//! Each worker owns one directory, lists it once, and uploads the video
//! files it finds to the consumer one at a time. The orchestrator runs one
//! worker per folder and enforces the completion timeout.

pub mod cancel;
pub mod client;
pub mod folder;
pub mod job;
pub mod orchestrator;

pub use cancel::CancellationToken;
pub use client::{NetworkError, NetworkErrorKind, UploadAttempt, UploadClient, UploadOutcome};
pub use folder::{
    next_step, validate_folders, FolderError, FolderSummary, FolderWorker, NextStep,
    ProducerFolder,
};
pub use job::{has_video_extension, list_video_files, JobSkip, UploadJob, VIDEO_EXTENSIONS};
pub use orchestrator::{Orchestrator, ProducerConfig, RunReport};
