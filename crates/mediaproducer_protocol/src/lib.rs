//! Media Producer wire protocol
//!
//! One TCP connection carries exactly one file upload.
//!
//! # Wire Format
//!
//! All integers are Network Byte Order (Big Endian).
//! ```text
//! REQUEST:  [NAME_LEN:2][NAME:NAME_LEN][SIZE:8][CONTENT:SIZE]
//! RESPONSE: [RESP_LEN:2][RESP:RESP_LEN]
//! ```
//!
//! - NAME_LEN (u16): encoded byte length of the file name
//! - NAME: file base name, see [`StringEncoding`]
//! - SIZE (i64): file size in bytes, never negative
//! - CONTENT: raw file bytes, exactly SIZE of them
//! - RESP: one of the words in [`ConsumerResponse`]

pub mod codec;
pub mod defaults;
pub mod error;
pub mod response;

pub use codec::{
    decode_length, encode_size, encode_string, read_size, read_string, write_size, write_string,
    StringEncoding, LENGTH_PREFIX_SIZE, MAX_STRING_BYTES, SIZE_FIELD_SIZE,
};
#[cfg(feature = "async")]
pub use codec::{read_size_async, read_string_async};
pub use error::{ProtocolError, Result};
pub use response::{ConsumerResponse, RemoteErrorKind};

use std::io::Read;
#[cfg(feature = "async")]
use tokio::io::AsyncRead;

/// Metadata sent ahead of the file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadHeader {
    pub file_name: String,
    pub file_size: u64,
}

impl UploadHeader {
    pub fn new(file_name: impl Into<String>, file_size: u64) -> Self {
        Self {
            file_name: file_name.into(),
            file_size,
        }
    }

    /// Pack name and size into one buffer.
    ///
    /// # Format
    /// - Name length (u16): 2 bytes
    /// - Name: NAME_LEN bytes
    /// - Size (i64): 8 bytes
    pub fn pack(&self, encoding: StringEncoding) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + self.file_name.len() + SIZE_FIELD_SIZE);
        write_string(&mut buf, &self.file_name, encoding)?;
        write_size(&mut buf, self.file_size)?;
        Ok(buf)
    }

    /// Read a header from a consumer-side stream.
    pub fn read_from<R: Read>(r: &mut R, encoding: StringEncoding) -> Result<Self> {
        let file_name = read_string(r, encoding)?;
        let file_size = read_size(r)?;
        Ok(Self {
            file_name,
            file_size,
        })
    }

    #[cfg(feature = "async")]
    pub async fn read_from_async<R>(r: &mut R, encoding: StringEncoding) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let file_name = read_string_async(r, encoding).await?;
        let file_size = read_size_async(r).await?;
        Ok(Self {
            file_name,
            file_size,
        })
    }
}
