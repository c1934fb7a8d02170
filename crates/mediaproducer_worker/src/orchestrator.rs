//! Orchestrator
//!
//! Spawns one folder worker per folder, waits for them up to a ceiling,
//! then cancels the stragglers and gives them a grace period. Workers that
//! still have not finished are reported and aborted.

use mediaproducer_protocol::defaults::{
    CANCEL_GRACE_SECS, COMPLETION_TIMEOUT_SECS, DEFAULT_CHUNK_SIZE, DEFAULT_PORT,
    QUEUE_FULL_BACKOFF_SECS,
};
use mediaproducer_protocol::StringEncoding;
use serde::Serialize;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};

use crate::cancel::CancellationToken;
use crate::client::UploadClient;
use crate::folder::{FolderSummary, FolderWorker, ProducerFolder};

/// Producer configuration (plain data)
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub host: String,
    pub port: u16,
    pub encoding: StringEncoding,
    pub chunk_size: usize,
    /// Pause after a QUEUE_FULL reply.
    pub backoff: Duration,
    /// How long all workers get before cancellation.
    pub completion_timeout: Duration,
    /// How long cancelled workers get to wind down.
    pub cancel_grace: Duration,
}

impl ProducerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    fn client(&self) -> UploadClient {
        UploadClient::new(self.host.clone(), self.port)
            .with_encoding(self.encoding)
            .with_chunk_size(self.chunk_size)
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            encoding: StringEncoding::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            backoff: Duration::from_secs(QUEUE_FULL_BACKOFF_SECS),
            completion_timeout: Duration::from_secs(COMPLETION_TIMEOUT_SECS),
            cancel_grace: Duration::from_secs(CANCEL_GRACE_SECS),
        }
    }
}

/// Aggregate view of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub target: String,
    /// String framing used on the wire.
    pub encoding: StringEncoding,
    /// Workers that finished, in the order they were collected.
    pub completed: Vec<FolderSummary>,
    /// Workers that panicked.
    pub crashed: Vec<String>,
    /// Workers still running after the grace period.
    pub unfinished: Vec<String>,
    pub timed_out: bool,
    pub cancelled: bool,
    pub totals: FolderSummary,
}

impl RunReport {
    /// True if any file failed or any worker did not finish cleanly.
    pub fn has_failures(&self) -> bool {
        self.totals.has_failures() || !self.crashed.is_empty() || !self.unfinished.is_empty()
    }
}

struct Running {
    id: String,
    handle: JoinHandle<FolderSummary>,
}

/// Owns the wait/cancel coordination for a set of folder workers.
pub struct Orchestrator {
    config: ProducerConfig,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: ProducerConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token shared with every worker; cancel it to stop the run early.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one worker per folder and wait for them.
    pub async fn run(&self, folders: Vec<ProducerFolder>) -> RunReport {
        let report = RunReport {
            target: format!("{}:{}", self.config.host, self.config.port),
            encoding: self.config.encoding,
            ..RunReport::default()
        };
        info!("Starting {} producer tasks.", folders.len());
        info!("Target consumer: {}", report.target);

        let tasks = folders
            .into_iter()
            .enumerate()
            .map(|(i, folder)| {
                let worker = FolderWorker::new(
                    format!("Producer-{}", i + 1),
                    folder,
                    self.config.client(),
                    self.config.backoff,
                    self.cancel.clone(),
                );
                (worker.id().to_string(), tokio::spawn(worker.run()))
            })
            .collect();

        self.supervise(tasks, report).await
    }

    /// Wait for spawned workers: ceiling, then cancellation and grace, then abort.
    async fn supervise(
        &self,
        tasks: Vec<(String, JoinHandle<FolderSummary>)>,
        mut report: RunReport,
    ) -> RunReport {
        let mut pending: Vec<Running> = tasks
            .into_iter()
            .map(|(id, handle)| Running { id, handle })
            .collect();

        info!(
            "All producer tasks started. Waiting for completion (max {:?})...",
            self.config.completion_timeout
        );
        let ceiling = Instant::now() + self.config.completion_timeout;
        tokio::select! {
            biased;
            _ = drain(&mut pending, &mut report, ceiling) => {}
            _ = self.cancel.cancelled() => {
                warn!("Cancellation requested while producers were running");
            }
        }

        if !pending.is_empty() {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
            } else {
                warn!(
                    "{} producer tasks did not finish within {:?}. Cancelling...",
                    pending.len(),
                    self.config.completion_timeout
                );
                report.timed_out = true;
                self.cancel.cancel();
            }

            let grace = Instant::now() + self.config.cancel_grace;
            drain(&mut pending, &mut report, grace).await;

            for Running { id, handle } in pending.drain(..) {
                // Finished while queued behind a worker that never did.
                if handle.is_finished() {
                    record(id, handle.await, &mut report);
                    continue;
                }
                error!(
                    "{} did not terminate within {:?} after cancellation",
                    id, self.config.cancel_grace
                );
                handle.abort();
                report.unfinished.push(id);
            }
        } else {
            info!("All producer tasks completed.");
        }

        for summary in &report.completed {
            report.totals.absorb(summary);
        }
        report.cancelled |= self.cancel.is_cancelled() && !report.timed_out;
        report
    }
}

/// Collect finished workers in order until all are done or `deadline` passes.
///
/// A worker is only removed from `pending` once its result is in hand, so
/// dropping this future mid-wait loses nothing.
async fn drain(pending: &mut Vec<Running>, report: &mut RunReport, deadline: Instant) {
    while let Some(running) = pending.first_mut() {
        let joined = match timeout_at(deadline, &mut running.handle).await {
            Ok(joined) => joined,
            Err(_) => return,
        };
        let running = pending.remove(0);
        record(running.id, joined, report);
    }
}

fn record(id: String, joined: Result<FolderSummary, JoinError>, report: &mut RunReport) {
    match joined {
        Ok(summary) => report.completed.push(summary),
        Err(e) => {
            error!("{} terminated abnormally: {}", id, e);
            report.crashed.push(id);
        }
    }
}
