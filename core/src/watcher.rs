//! Inbox watcher
//!
//! Scans the inbox for request records and nudges the Kiro chat so its
//! hook picks them up. Best-effort at-least-once: a failed nudge is
//! retried on the next scan, and a repeated nudge for the same record is
//! suppressed while the cooldown window is open (Kiro is assumed to
//! still be working on it).

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::automation::Automation;
use crate::error::Result;
use crate::file_queue::QueueRecord;

/// Time between inbox scans.
pub const SCAN_INTERVAL: Duration = Duration::from_secs(3);

/// Minimum interval between nudges for the same record.
pub const COOLDOWN: Duration = Duration::from_secs(120);

pub struct InboxWatcher {
    inbox: PathBuf,
    automation: Arc<dyn Automation>,
    nudge: String,
    cooldown: Duration,
    // message id -> when it was last signalled
    triggered: HashMap<String, Instant>,
}

impl InboxWatcher {
    pub fn new(inbox: PathBuf, automation: Arc<dyn Automation>, nudge: String) -> Self {
        Self::with_cooldown(inbox, automation, nudge, COOLDOWN)
    }

    pub fn with_cooldown(
        inbox: PathBuf,
        automation: Arc<dyn Automation>,
        nudge: String,
        cooldown: Duration,
    ) -> Self {
        Self {
            inbox,
            automation,
            nudge,
            cooldown,
            triggered: HashMap::new(),
        }
    }

    /// Number of records currently tracked by the cooldown ledger.
    pub fn tracked_ids(&self) -> usize {
        self.triggered.len()
    }

    /// Scan forever. Errors from a single tick are logged, not fatal.
    pub async fn run(mut self) -> Result<()> {
        log::info!("watching inbox: {}", self.inbox.display());
        loop {
            if let Err(e) = self.tick().await {
                log::error!("inbox scan failed: {e}");
            }
            sleep(SCAN_INTERVAL).await;
        }
    }

    /// One scan pass over the inbox.
    pub async fn tick(&mut self) -> Result<()> {
        tokio::fs::create_dir_all(&self.inbox).await?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut entries = tokio::fs::read_dir(&self.inbox).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let id = id.to_string();
            seen.insert(id.clone());

            if let Some(signalled_at) = self.triggered.get(&id) {
                if signalled_at.elapsed() < self.cooldown {
                    continue;
                }
            }

            let record = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => match serde_json::from_str::<QueueRecord>(&raw) {
                    Ok(record) => record,
                    Err(e) => {
                        log::warn!("unreadable inbox record {}: {e}", path.display());
                        continue;
                    }
                },
                Err(e) => {
                    log::warn!("could not read inbox record {}: {e}", path.display());
                    continue;
                }
            };

            let preview: String = record.content.chars().take(50).collect();
            log::info!("new inbox message {id}: {preview}");

            // Keystroke automation blocks; keep it off the async threads.
            let automation = self.automation.clone();
            let nudge = self.nudge.clone();
            let delivered = tokio::task::spawn_blocking(move || automation.send_message(&nudge))
                .await
                .unwrap_or(false);
            if delivered {
                self.triggered.insert(id, Instant::now());
            } else {
                // Left untouched: retried on the next tick.
                log::warn!("nudge for {id} failed, will retry");
            }
        }

        // A record that disappeared was consumed; drop its ledger entry.
        self.triggered.retain(|id, _| seen.contains(id));
        Ok(())
    }
}
