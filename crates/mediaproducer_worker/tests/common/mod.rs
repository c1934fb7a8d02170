//! Mock consumer shared by the worker integration tests.
#![allow(dead_code)]

use anyhow::Result;
use mediaproducer_protocol::{encode_string, StringEncoding, UploadHeader};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// What the mock sends back for one connection.
#[derive(Debug, Clone)]
pub enum Reply {
    Word(&'static str),
    Raw(Vec<u8>),
    /// Close without replying.
    Hangup,
    /// Hold the connection open without replying.
    Stall,
}

#[derive(Debug, Clone)]
pub struct Received {
    pub name: String,
    pub size: u64,
    pub content: Vec<u8>,
    pub accepted_at: Instant,
    pub replied_at: Instant,
}

/// Consumer that records every upload and answers from a script.
///
/// Once the script runs out every upload gets `SUCCESS`.
pub struct MockConsumer {
    pub port: u16,
    received: Arc<Mutex<Vec<Received>>>,
    accept_task: JoinHandle<()>,
}

impl MockConsumer {
    pub async fn start(script: Vec<Reply>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let script = Arc::new(Mutex::new(VecDeque::from(script)));
        let received = Arc::new(Mutex::new(Vec::new()));

        let accept_task = tokio::spawn({
            let received = received.clone();
            async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    let accepted_at = Instant::now();
                    let script = script.clone();
                    let received = received.clone();
                    tokio::spawn(async move {
                        let _ = serve(stream, accepted_at, script, received).await;
                    });
                }
            }
        });

        Ok(Self {
            port,
            received,
            accept_task,
        })
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    pub fn received_names(&self) -> Vec<String> {
        self.received().into_iter().map(|r| r.name).collect()
    }

    /// Poll until at least `count` uploads have arrived.
    pub async fn wait_for(&self, count: usize, limit: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < limit {
            if self.received.lock().unwrap().len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl Drop for MockConsumer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    accepted_at: Instant,
    script: Arc<Mutex<VecDeque<Reply>>>,
    received: Arc<Mutex<Vec<Received>>>,
) -> Result<()> {
    let UploadHeader {
        file_name: name,
        file_size: size,
    } = UploadHeader::read_from_async(&mut stream, StringEncoding::ModifiedUtf8).await?;
    let mut content = vec![0u8; size as usize];
    stream.read_exact(&mut content).await?;

    let reply = script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(Reply::Word("SUCCESS"));
    let replied_at = Instant::now();
    received.lock().unwrap().push(Received {
        name,
        size,
        content,
        accepted_at,
        replied_at,
    });

    match reply {
        Reply::Word(word) => {
            stream
                .write_all(&encode_string(word, StringEncoding::ModifiedUtf8)?)
                .await?
        }
        Reply::Raw(bytes) => stream.write_all(&bytes).await?,
        Reply::Hangup => return Ok(()),
        Reply::Stall => {
            tokio::time::sleep(Duration::from_secs(60)).await;
            return Ok(());
        }
    }
    stream.flush().await?;
    Ok(())
}

/// A port with nothing listening on it.
pub async fn closed_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

pub fn write_file(dir: &Path, name: &str, len: usize) -> PathBuf {
    let path = dir.join(name);
    let content: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, content).unwrap();
    path
}
