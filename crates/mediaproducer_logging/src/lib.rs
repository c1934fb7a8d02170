//! Shared logging setup for the media producer.
//!
//! Console output goes to stderr; a size-capped rolling file keeps the last
//! few runs under `<home>/logs`. Losing the file sink never stops a run.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str =
    "mediaproducer=info,mediaproducer_worker=info,mediaproducer_protocol=info";
const VERBOSE_LOG_FILTER: &str =
    "mediaproducer=debug,mediaproducer_worker=debug,mediaproducer_protocol=debug";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration for the producer binary.
#[derive(Debug, Clone, Default)]
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
    pub quiet: bool,
    /// Overrides `<home>/logs` when set.
    pub log_dir: Option<PathBuf>,
}

/// Install the global subscriber.
///
/// Returns the log file path when file logging is active.
pub fn init_logging(config: LogConfig<'_>) -> Result<Option<PathBuf>> {
    let file_sink = open_file_sink(&config);

    let console_filter = if config.quiet {
        EnvFilter::new("warn")
    } else if config.verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else {
        default_filter()
    };

    let (file_layer, log_path, file_error) = match file_sink {
        Ok((writer, path)) => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(default_filter()),
            ),
            Some(path),
            None,
        ),
        Err(err) => (None, None, Some(err)),
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if let Some(err) = file_error {
        tracing::warn!("File logging disabled, using stderr only: {:#}", err);
    }

    Ok(log_path)
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn open_file_sink(config: &LogConfig<'_>) -> Result<(Mutex<SizeCappedLog>, PathBuf)> {
    let dir = match &config.log_dir {
        Some(dir) => dir.clone(),
        None => logs_dir().context("Could not determine a home directory for logs")?,
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
    let log = SizeCappedLog::open(
        Generations::new(&dir, config.app_name, MAX_LOG_FILES),
        MAX_LOG_FILE_SIZE,
    )
    .with_context(|| format!("Failed to open log file in {}", dir.display()))?;
    let path = log.files.live();
    // tracing-subscriber hands out a guard per event for `Mutex<W: Write>`.
    Ok((Mutex::new(log), path))
}

/// Producer home: `$MEDIAPRODUCER_HOME`, else `~/.mediaproducer`.
pub fn producer_home() -> Option<PathBuf> {
    if let Some(override_path) = std::env::var_os("MEDIAPRODUCER_HOME") {
        return Some(PathBuf::from(override_path));
    }
    dirs::home_dir().map(|home| home.join(".mediaproducer"))
}

pub fn logs_dir() -> Option<PathBuf> {
    producer_home().map(|home| home.join("logs"))
}

/// The kept log files: `<stem>.log` is live, `<stem>.log.N` is N rotations older.
struct Generations {
    dir: PathBuf,
    stem: String,
    keep: usize,
}

impl Generations {
    fn new(dir: &Path, app_name: &str, keep: usize) -> Self {
        Self {
            dir: dir.to_path_buf(),
            stem: sanitize_name(app_name),
            keep: keep.max(1),
        }
    }

    fn live(&self) -> PathBuf {
        self.nth(0)
    }

    fn nth(&self, n: usize) -> PathBuf {
        match n {
            0 => self.dir.join(format!("{}.log", self.stem)),
            n => self.dir.join(format!("{}.log.{}", self.stem, n)),
        }
    }

    /// Move every kept file one slot older; whatever sat in the last slot is gone.
    fn shift(&self) -> io::Result<()> {
        let last = self.keep - 1;
        remove_if_present(&self.nth(last))?;
        for n in (0..last).rev() {
            match fs::rename(self.nth(n), self.nth(n + 1)) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
                _ => {}
            }
        }
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn open_append(path: &Path) -> io::Result<(File, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let len = file.metadata()?.len();
    Ok((file, len))
}

/// Live log file that shifts the generations once it would pass `cap` bytes.
struct SizeCappedLog {
    files: Generations,
    cap: u64,
    file: File,
    len: u64,
}

impl SizeCappedLog {
    fn open(files: Generations, cap: u64) -> io::Result<Self> {
        let (file, len) = open_append(&files.live())?;
        let mut log = Self {
            files,
            cap,
            file,
            len,
        };
        if log.len > log.cap {
            log.rotate()?;
        }
        Ok(log)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.files.shift()?;
        let (file, len) = open_append(&self.files.live())?;
        self.file = file;
        self.len = len;
        Ok(())
    }
}

impl Write for SizeCappedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // An oversized record still lands whole in a fresh file.
        if self.len > 0 && self.len + buf.len() as u64 > self.cap {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.len += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "mediaproducer".to_string()
    } else {
        cleaned
    }
}
