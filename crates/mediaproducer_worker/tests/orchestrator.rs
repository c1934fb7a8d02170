mod common;

use anyhow::Result;
use common::{write_file, MockConsumer, Reply};
use mediaproducer_worker::{validate_folders, Orchestrator, ProducerConfig};
use std::collections::HashSet;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_invalid_folder_does_not_reduce_pool() -> Result<()> {
    let consumer = MockConsumer::start(vec![]).await?;
    let tmp = tempfile::tempdir()?;

    let mut candidates = Vec::new();
    for (dir, file) in [("cam1", "a.mp4"), ("cam2", "b.mov"), ("cam3", "c.avi")] {
        let path = tmp.path().join(dir);
        std::fs::create_dir(&path)?;
        write_file(&path, file, 256);
        candidates.push(path);
    }
    candidates.insert(1, tmp.path().join("does-not-exist"));

    let folders = validate_folders(&candidates);
    assert_eq!(folders.len(), 3);

    let orchestrator = Orchestrator::new(ProducerConfig::new("127.0.0.1", consumer.port));
    let report = orchestrator.run(folders).await;

    let uploaded: HashSet<String> = consumer.received_names().into_iter().collect();
    let expected: HashSet<String> = ["a.mp4", "b.mov", "c.avi"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(uploaded, expected);

    assert_eq!(report.completed.len(), 3);
    assert_eq!(report.totals.uploaded, 3);
    assert_eq!(report.totals.bytes_sent, 3 * 256);
    assert!(report.unfinished.is_empty());
    assert!(!report.timed_out);
    assert!(!report.has_failures());

    let producers: Vec<&str> = report.completed.iter().map(|s| s.producer.as_str()).collect();
    assert_eq!(producers, vec!["Producer-1", "Producer-2", "Producer-3"]);
    Ok(())
}

#[tokio::test]
async fn test_timeout_cancels_workers_stuck_in_backoff() -> Result<()> {
    let consumer = MockConsumer::start(vec![
        Reply::Word("QUEUE_FULL"),
        Reply::Word("QUEUE_FULL"),
    ])
    .await?;
    let tmp = tempfile::tempdir()?;
    write_file(tmp.path(), "first.mp4", 10);
    write_file(tmp.path(), "second.mp4", 10);

    let config = ProducerConfig {
        backoff: Duration::from_secs(30),
        completion_timeout: Duration::from_millis(300),
        cancel_grace: Duration::from_secs(5),
        ..ProducerConfig::new("127.0.0.1", consumer.port)
    };
    let started = Instant::now();
    let report = Orchestrator::new(config)
        .run(validate_folders([tmp.path()]))
        .await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(report.timed_out);
    assert!(report.unfinished.is_empty());
    assert_eq!(report.completed.len(), 1);
    assert!(report.completed[0].cancelled);
    assert_eq!(consumer.received().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_external_cancellation_stops_run() -> Result<()> {
    let consumer = MockConsumer::start(vec![Reply::Stall]).await?;
    let tmp = tempfile::tempdir()?;
    write_file(tmp.path(), "only.mkv", 10);

    let orchestrator = Orchestrator::new(ProducerConfig {
        cancel_grace: Duration::from_secs(5),
        ..ProducerConfig::new("127.0.0.1", consumer.port)
    });
    let token = orchestrator.cancellation_token();
    let folders = validate_folders([tmp.path()]);
    let run = tokio::spawn(async move { orchestrator.run(folders).await });

    assert!(consumer.wait_for(1, Duration::from_secs(5)).await);
    token.cancel();

    let report = tokio::time::timeout(Duration::from_secs(5), run).await??;
    assert!(report.cancelled);
    assert!(!report.timed_out);
    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.totals.failed, 1);
    assert!(report.has_failures());
    Ok(())
}
