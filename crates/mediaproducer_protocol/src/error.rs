//! Protocol error types

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Encoded string too large: {len} bytes (max {max})")]
    EncodingTooLarge { len: usize, max: usize },

    #[error("Stream ended before a frame started")]
    EndOfStream,

    #[error("Stream truncated: expected {expected} bytes, got {got}")]
    TruncatedStream { expected: usize, got: usize },

    #[error("Malformed string on the wire: {0}")]
    MalformedString(String),

    #[error("Negative file size on the wire: {0}")]
    NegativeSize(i64),

    #[error("File size {0} does not fit the signed 64-bit size field")]
    SizeOutOfRange(u64),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// True when the peer closed the stream before a frame was complete.
    pub fn is_truncation(&self) -> bool {
        matches!(self, ProtocolError::TruncatedStream { .. })
    }
}
