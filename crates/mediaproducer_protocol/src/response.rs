//! Consumer reply vocabulary.
//!
//! The consumer answers every upload with exactly one framed string. The raw
//! string is decoded once, here, into a closed set of variants; anything we do
//! not recognise is kept verbatim rather than treated as a failure.

use serde::Serialize;
use std::fmt;

/// Failure kinds the consumer reports explicitly for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteErrorKind {
    CompressionFailed,
    TransferError,
    InternalError,
}

impl RemoteErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RemoteErrorKind::CompressionFailed => "COMPRESSION_FAILED",
            RemoteErrorKind::TransferError => "TRANSFER_ERROR",
            RemoteErrorKind::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded consumer reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConsumerResponse {
    Success,
    QueueFull,
    DuplicateFile,
    Failed(RemoteErrorKind),
    /// Well-formed but not part of the known vocabulary.
    Unrecognized(String),
}

impl ConsumerResponse {
    pub const SUCCESS: &'static str = "SUCCESS";
    pub const QUEUE_FULL: &'static str = "QUEUE_FULL";
    pub const DUPLICATE_FILE: &'static str = "DUPLICATE_FILE";

    /// Decode a raw reply. Matching is exact and case-sensitive.
    pub fn parse(raw: &str) -> Self {
        match raw {
            Self::SUCCESS => ConsumerResponse::Success,
            Self::QUEUE_FULL => ConsumerResponse::QueueFull,
            Self::DUPLICATE_FILE => ConsumerResponse::DuplicateFile,
            "COMPRESSION_FAILED" => ConsumerResponse::Failed(RemoteErrorKind::CompressionFailed),
            "TRANSFER_ERROR" => ConsumerResponse::Failed(RemoteErrorKind::TransferError),
            "INTERNAL_ERROR" => ConsumerResponse::Failed(RemoteErrorKind::InternalError),
            other => ConsumerResponse::Unrecognized(other.to_string()),
        }
    }

    /// The wire form of this reply.
    pub fn as_str(&self) -> &str {
        match self {
            ConsumerResponse::Success => Self::SUCCESS,
            ConsumerResponse::QueueFull => Self::QUEUE_FULL,
            ConsumerResponse::DuplicateFile => Self::DUPLICATE_FILE,
            ConsumerResponse::Failed(kind) => kind.as_str(),
            ConsumerResponse::Unrecognized(raw) => raw,
        }
    }
}

impl fmt::Display for ConsumerResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
