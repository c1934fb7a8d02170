//! Command line surface.

use clap::{CommandFactory, Parser, ValueEnum};
use mediaproducer_protocol::defaults::{
    CANCEL_GRACE_SECS, COMPLETION_TIMEOUT_SECS, DEFAULT_CHUNK_SIZE, DEFAULT_PORT,
    QUEUE_FULL_BACKOFF_SECS,
};
use mediaproducer_protocol::StringEncoding;
use mediaproducer_worker::ProducerConfig;
use std::path::PathBuf;
use std::time::Duration;
use tracing::error;

const EXAMPLES: &str = "\
Examples:
  mediaproducer localhost 9090 /path/to/videos1 /path/to/videos2
  mediaproducer 192.168.1.100 9090 /media/folder_a";

#[derive(Parser, Debug)]
#[command(
    name = "mediaproducer",
    about = "Upload video files from local folders to a Media Consumer service",
    override_usage = "mediaproducer [OPTIONS] <HOST> <PORT> <FOLDER>...",
    after_help = EXAMPLES,
    allow_negative_numbers = true
)]
pub struct Cli {
    /// Hostname or IP address of the Media Consumer service
    pub host: Option<String>,

    /// Port the consumer listens on (invalid values fall back to 9090)
    pub port: Option<String>,

    /// Folders containing videos; each one gets its own producer task
    pub folders: Vec<PathBuf>,

    /// Seconds to wait for all producers before cancelling them
    #[arg(long, env = "MEDIAPRODUCER_TIMEOUT_SECS", default_value_t = COMPLETION_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Seconds cancelled producers get to stop
    #[arg(long, env = "MEDIAPRODUCER_GRACE_SECS", default_value_t = CANCEL_GRACE_SECS)]
    pub grace_secs: u64,

    /// Seconds to pause after the consumer reports QUEUE_FULL
    #[arg(long, env = "MEDIAPRODUCER_BACKOFF_SECS", default_value_t = QUEUE_FULL_BACKOFF_SECS)]
    pub backoff_secs: u64,

    /// Bytes per payload chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// String framing used for file names and replies
    #[arg(long, value_enum, default_value_t = WireEncoding::ModifiedUtf8)]
    pub encoding: WireEncoding,

    /// Exit with status 1 if any upload failed
    #[arg(long)]
    pub fail_on_error: bool,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Debug output on stderr
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Only warnings and errors on stderr
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Directory for log files (default: ~/.mediaproducer/logs)
    #[arg(long, env = "MEDIAPRODUCER_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WireEncoding {
    /// Legacy-compatible modified UTF-8
    ModifiedUtf8,
    /// Plain UTF-8
    Utf8,
}

impl From<WireEncoding> for StringEncoding {
    fn from(encoding: WireEncoding) -> Self {
        match encoding {
            WireEncoding::ModifiedUtf8 => StringEncoding::ModifiedUtf8,
            WireEncoding::Utf8 => StringEncoding::Utf8,
        }
    }
}

/// The three required positionals, once all are present.
pub struct Target<'a> {
    pub host: &'a str,
    pub port: &'a str,
    pub folders: &'a [PathBuf],
}

impl Cli {
    /// `None` when fewer than three positional arguments were given.
    pub fn target(&self) -> Option<Target<'_>> {
        match (&self.host, &self.port) {
            (Some(host), Some(port)) if !self.folders.is_empty() => Some(Target {
                host,
                port,
                folders: &self.folders,
            }),
            _ => None,
        }
    }

    pub fn producer_config(&self, host: &str, port: u16) -> ProducerConfig {
        ProducerConfig {
            encoding: self.encoding.into(),
            chunk_size: self.chunk_size,
            backoff: Duration::from_secs(self.backoff_secs),
            completion_timeout: Duration::from_secs(self.timeout_secs),
            cancel_grace: Duration::from_secs(self.grace_secs),
            ..ProducerConfig::new(host, port)
        }
    }
}

/// Strict port parse: an integer in 1..=65535.
pub fn parse_port(raw: &str) -> Result<u16, String> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", raw))?;
    match u16::try_from(value) {
        Ok(port) if port > 0 => Ok(port),
        _ => Err("port must be between 1 and 65535".to_string()),
    }
}

/// Lenient port parse: invalid input logs an error and yields [`DEFAULT_PORT`].
pub fn resolve_port(raw: &str) -> u16 {
    parse_port(raw).unwrap_or_else(|reason| {
        error!(
            "Invalid port number '{}': {}. Using default {}.",
            raw, reason, DEFAULT_PORT
        );
        DEFAULT_PORT
    })
}

pub fn print_usage() {
    eprintln!("{}", Cli::command().render_help());
}
