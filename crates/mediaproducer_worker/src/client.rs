//! Upload Client
//!
//! One call, one connection, one file:
//! - connect, send the framed name and size
//! - stream the content in fixed-size chunks
//! - block for the single framed reply and decode it
//!
//! Socket and file handle are owned by the transfer and dropped on every
//! exit path, including cancellation of the future.

use mediaproducer_protocol::defaults::DEFAULT_CHUNK_SIZE;
use mediaproducer_protocol::{
    read_string_async, ConsumerResponse, ProtocolError, RemoteErrorKind, StringEncoding,
    UploadHeader,
};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info, trace};

use crate::job::UploadJob;

/// Connection-level failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// Host name did not resolve.
    UnknownHost,
    /// No resolved address accepted the connection.
    Unreachable,
    /// Write failed (or the file ran short) while sending metadata or content.
    TransferFailed,
    /// Reading the reply failed or the consumer closed early.
    ResponseFailed,
    /// The worker was asked to stop mid-transfer.
    Cancelled,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NetworkErrorKind::UnknownHost => "unknown host",
            NetworkErrorKind::Unreachable => "unreachable",
            NetworkErrorKind::TransferFailed => "transfer failed",
            NetworkErrorKind::ResponseFailed => "response failed",
            NetworkErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
#[error("{kind}: {detail}")]
pub struct NetworkError {
    pub kind: NetworkErrorKind,
    pub detail: String,
}

impl NetworkError {
    pub fn new(kind: NetworkErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    fn io(kind: NetworkErrorKind, err: &io::Error) -> Self {
        Self::new(kind, err.to_string())
    }
}

/// Result of one upload attempt.
#[derive(Debug)]
pub enum UploadOutcome {
    Success,
    QueueFull,
    Duplicate,
    RemoteError(RemoteErrorKind),
    ProtocolError(ProtocolError),
    NetworkError(NetworkError),
    /// Well-formed reply outside the known vocabulary.
    Unknown(String),
}

impl UploadOutcome {
    /// Whether this attempt counts as a failed upload.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            UploadOutcome::RemoteError(_)
                | UploadOutcome::ProtocolError(_)
                | UploadOutcome::NetworkError(_)
                | UploadOutcome::Unknown(_)
        )
    }
}

impl From<ConsumerResponse> for UploadOutcome {
    fn from(response: ConsumerResponse) -> Self {
        match response {
            ConsumerResponse::Success => UploadOutcome::Success,
            ConsumerResponse::QueueFull => UploadOutcome::QueueFull,
            ConsumerResponse::DuplicateFile => UploadOutcome::Duplicate,
            ConsumerResponse::Failed(kind) => UploadOutcome::RemoteError(kind),
            ConsumerResponse::Unrecognized(raw) => UploadOutcome::Unknown(raw),
        }
    }
}

impl From<NetworkError> for UploadOutcome {
    fn from(err: NetworkError) -> Self {
        UploadOutcome::NetworkError(err)
    }
}

impl From<ProtocolError> for UploadOutcome {
    fn from(err: ProtocolError) -> Self {
        UploadOutcome::ProtocolError(err)
    }
}

/// Outcome plus transfer statistics.
#[derive(Debug)]
pub struct UploadAttempt {
    pub outcome: UploadOutcome,
    pub bytes_sent: u64,
    pub elapsed: Duration,
}

/// Performs single-file transfers against one consumer endpoint.
#[derive(Debug, Clone)]
pub struct UploadClient {
    host: String,
    port: u16,
    encoding: StringEncoding,
    chunk_size: usize,
}

impl UploadClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            encoding: StringEncoding::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_encoding(mut self, encoding: StringEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Upload one job and classify the consumer's reply.
    pub async fn upload(&self, job: UploadJob) -> UploadOutcome {
        self.transfer(job).await.outcome
    }

    /// Like [`upload`](Self::upload), also reporting bytes sent and duration.
    pub async fn transfer(&self, job: UploadJob) -> UploadAttempt {
        let started = Instant::now();
        let mut bytes_sent = 0u64;
        let outcome = match self.exchange(job, &mut bytes_sent).await {
            Ok(response) => response.into(),
            Err(outcome) => outcome,
        };
        UploadAttempt {
            outcome,
            bytes_sent,
            elapsed: started.elapsed(),
        }
    }

    async fn exchange(
        &self,
        mut job: UploadJob,
        bytes_sent: &mut u64,
    ) -> Result<ConsumerResponse, UploadOutcome> {
        // Encode first: an oversized name fails without touching the network.
        let header = UploadHeader::new(job.name.clone(), job.size).pack(self.encoding)?;

        let stream = self.connect().await?;
        debug!("Connected to consumer {} for file {}", self.endpoint(), job.name);
        let (mut reader, writer) = stream.into_split();
        let mut writer = BufWriter::with_capacity(self.chunk_size, writer);

        // 1. Metadata
        writer
            .write_all(&header)
            .await
            .map_err(|e| NetworkError::io(NetworkErrorKind::TransferFailed, &e))?;
        writer
            .flush()
            .await
            .map_err(|e| NetworkError::io(NetworkErrorKind::TransferFailed, &e))?;
        trace!("Metadata sent for {}", job.name);

        // 2. Content, exactly `size` bytes
        let send_started = Instant::now();
        let mut buffer = vec![0u8; self.chunk_size];
        let mut content = (&mut job.source).take(job.size);
        loop {
            let n = content.read(&mut buffer).await.map_err(|e| {
                NetworkError::new(
                    NetworkErrorKind::TransferFailed,
                    format!("reading {}: {}", job.path.display(), e),
                )
            })?;
            if n == 0 {
                break;
            }
            writer
                .write_all(&buffer[..n])
                .await
                .map_err(|e| NetworkError::io(NetworkErrorKind::TransferFailed, &e))?;
            *bytes_sent += n as u64;
        }
        if *bytes_sent < job.size {
            return Err(NetworkError::new(
                NetworkErrorKind::TransferFailed,
                format!(
                    "file shrank after discovery: sent {} of {} bytes",
                    bytes_sent, job.size
                ),
            )
            .into());
        }
        writer
            .flush()
            .await
            .map_err(|e| NetworkError::io(NetworkErrorKind::TransferFailed, &e))?;
        info!(
            "Data sent for {} ({} bytes in {:.2}s).",
            job.name,
            bytes_sent,
            send_started.elapsed().as_secs_f64()
        );

        // 3. Reply
        let raw = self.read_reply(&mut reader).await?;
        info!("Consumer response for {}: {}", job.name, raw);
        Ok(ConsumerResponse::parse(&raw))
    }

    async fn connect(&self) -> Result<TcpStream, NetworkError> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                NetworkError::new(
                    NetworkErrorKind::UnknownHost,
                    format!("'{}': {}", self.host, e),
                )
            })?
            .collect();
        if addrs.is_empty() {
            return Err(NetworkError::new(
                NetworkErrorKind::UnknownHost,
                format!("'{}' resolved to no addresses", self.host),
            ));
        }

        TcpStream::connect(&addrs[..]).await.map_err(|e| {
            NetworkError::new(
                NetworkErrorKind::Unreachable,
                format!("{}: {}", self.endpoint(), e),
            )
        })
    }

    async fn read_reply<R>(&self, reader: &mut R) -> Result<String, UploadOutcome>
    where
        R: AsyncRead + Unpin,
    {
        read_string_async(reader, self.encoding)
            .await
            .map_err(reply_error)
    }
}

/// Socket failures stay network errors; a reply cut short or undecodable is
/// a protocol error.
fn reply_error(err: ProtocolError) -> UploadOutcome {
    match err {
        ProtocolError::EndOfStream => NetworkError::new(
            NetworkErrorKind::ResponseFailed,
            "consumer closed the connection before replying",
        )
        .into(),
        ProtocolError::Io(e) => NetworkError::io(NetworkErrorKind::ResponseFailed, &e).into(),
        other => other.into(),
    }
}
