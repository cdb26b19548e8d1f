//! File-based rendezvous with the Kiro hook
//!
//! The bridge writes request records into `inbox/`; the Kiro hook
//! eventually writes a response record with the same id into `outbox/`.
//! The two processes share nothing but these directories: correctness
//! rests on producer-unique ids and on deleting a response immediately
//! after the first successful read.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};

use crate::error::{BridgeError, Result};
use crate::protocol::unix_timestamp;

/// Time between outbox polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// One record in either queue directory, stored as `<dir>/<id>.json`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueueRecord {
    pub id: String,
    pub content: String,
    pub timestamp: f64,
}

pub struct FileChannel {
    inbox: PathBuf,
    outbox: PathBuf,
}

impl FileChannel {
    /// Queue rooted at `base`, using `base/inbox` and `base/outbox`.
    pub fn new(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            inbox: base.join("inbox"),
            outbox: base.join("outbox"),
        }
    }

    pub fn inbox_dir(&self) -> &Path {
        &self.inbox
    }

    pub fn outbox_dir(&self) -> &Path {
        &self.outbox
    }

    /// Create both queue directories if they do not exist yet.
    pub async fn ensure_dirs(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.inbox).await?;
        tokio::fs::create_dir_all(&self.outbox).await?;
        Ok(())
    }

    /// Write a request record. A repeated id overwrites the previous
    /// record; ids are expected to be unique per request.
    pub async fn submit(&self, id: &str, content: &str) -> Result<PathBuf> {
        self.ensure_dirs().await?;
        let record = QueueRecord {
            id: id.to_string(),
            content: content.to_string(),
            timestamp: unix_timestamp(),
        };
        let path = self.inbox.join(format!("{id}.json"));
        tokio::fs::write(&path, serde_json::to_string(&record)?).await?;
        log::info!("request record written: {id}");
        Ok(path)
    }

    /// Poll the outbox until a record for `id` appears, then consume it.
    ///
    /// The record is deleted right after the first successful parse, so a
    /// second waiter on the same id can only time out. A read or parse
    /// failure is retried on the next tick: the hook writes the file from
    /// another process and a partially-written record is expected
    /// transiently.
    pub async fn await_response(&self, id: &str, timeout: Duration) -> Result<String> {
        self.ensure_dirs().await?;
        let path = self.outbox.join(format!("{id}.json"));
        let start = Instant::now();

        loop {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(BridgeError::Timeout { duration: timeout });
            }

            match tokio::fs::read_to_string(&path).await {
                Ok(raw) => match serde_json::from_str::<QueueRecord>(&raw) {
                    Ok(record) => {
                        let _ = tokio::fs::remove_file(&path).await;
                        log::info!(
                            "response received: {id} ({:.1}s)",
                            elapsed.as_secs_f64()
                        );
                        return Ok(record.content);
                    }
                    Err(e) => {
                        log::warn!("response record for {id} not yet readable, retrying: {e}");
                    }
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    log::warn!("could not read response record for {id}, retrying: {e}");
                }
            }

            sleep(POLL_INTERVAL).await;
        }
    }

    /// Remove a leftover request record. Missing files are fine.
    pub async fn cleanup(&self, id: &str) {
        let path = self.inbox.join(format!("{id}.json"));
        let _ = tokio::fs::remove_file(&path).await;
    }
}
