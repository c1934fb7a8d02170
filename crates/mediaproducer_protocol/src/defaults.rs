//! Canonical default values shared by the producer, its CLI and tests.

/// Port the consumer listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 9090;

/// Payload chunk size used when streaming file content.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Pause after a QUEUE_FULL reply before the next file is attempted.
pub const QUEUE_FULL_BACKOFF_SECS: u64 = 5;

/// Ceiling for all folder workers to finish.
pub const COMPLETION_TIMEOUT_SECS: u64 = 60 * 60;

/// How long cancelled workers get to wind down after the ceiling.
pub const CANCEL_GRACE_SECS: u64 = 60;
