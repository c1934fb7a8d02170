//! Media Producer
//!
//! Usage:
//!     mediaproducer <host> <port> <folder1> [folder2] ...
//!
//! One producer task per folder; each scans its folder once and uploads every
//! video file to the consumer, one file per connection.

mod cli;

use clap::Parser;
use mediaproducer_logging::{init_logging, LogConfig};
use mediaproducer_worker::{validate_folders, Orchestrator, RunReport};
use std::process::ExitCode;
use tracing::{error, info, warn};

use crate::cli::Cli;

/// Exit status for usage errors.
const EXIT_USAGE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let Some(target) = cli.target() else {
        cli::print_usage();
        return ExitCode::from(EXIT_USAGE);
    };

    match init_logging(LogConfig {
        app_name: "mediaproducer",
        verbose: cli.verbose,
        quiet: cli.quiet,
        log_dir: cli.log_dir.clone(),
    }) {
        Ok(Some(path)) => info!("Logging to {}", path.display()),
        Ok(None) => {}
        Err(e) => eprintln!("Warning: logging unavailable: {:#}", e),
    }

    let port = cli::resolve_port(target.port);
    let folders = validate_folders(target.folders);
    if folders.is_empty() {
        error!("No valid producer folders specified. Exiting.");
        cli::print_usage();
        return ExitCode::from(EXIT_USAGE);
    }

    let orchestrator = Orchestrator::new(cli.producer_config(target.host, port));

    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received. Cancelling producers...");
            token.cancel();
        }
    });

    let report = orchestrator.run(folders).await;
    log_report(&report);

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize run report: {}", e),
        }
    }

    info!("Producer application finished.");
    if cli.fail_on_error && report.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn log_report(report: &RunReport) {
    for summary in &report.completed {
        info!(
            producer = %summary.producer,
            uploaded = summary.uploaded,
            duplicates = summary.duplicates,
            queue_full = summary.queue_full,
            failures = summary.failures(),
            skipped = summary.skipped,
            "Folder {} done",
            summary.folder.display()
        );
    }
    for id in &report.crashed {
        error!("{} terminated abnormally", id);
    }
    if !report.unfinished.is_empty() {
        error!(
            "Producers that never finished: {}",
            report.unfinished.join(", ")
        );
    }

    let totals = &report.totals;
    info!(
        "Run totals: {} uploaded, {} duplicates, {} queue-full, {} failed, {} skipped, {} bytes sent",
        totals.uploaded,
        totals.duplicates,
        totals.queue_full,
        totals.failures(),
        totals.skipped,
        totals.bytes_sent
    );
}
