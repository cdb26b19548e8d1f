//! Response acquisition strategies
//!
//! The stability monitor and the file rendezvous solve the same problem,
//! observing completion of a process that never signals it. Call sites
//! depend on the one trait here and the deployment picks an
//! implementation at startup.

use std::time::Duration;

use async_trait::async_trait;

use crate::automation::SnapshotSource;
use crate::error::Result;
use crate::file_queue::FileChannel;
use crate::monitor::ResponseMonitor;

/// One content-delivery request awaiting Kiro's answer.
pub struct ResponseRequest {
    /// Producer-unique correlation id.
    pub id: String,
    /// The message the client asked to deliver.
    pub content: String,
}

#[async_trait]
pub trait ResponseSource: Send + Sync {
    /// Wait for the response to `request`, bounded by `timeout`.
    async fn await_response(&self, request: &ResponseRequest, timeout: Duration)
        -> Result<String>;
}

/// Synchronous desktop path: watch the chat text until it stabilizes.
pub struct MonitorSource<S> {
    monitor: ResponseMonitor<S>,
}

impl<S: SnapshotSource + 'static> MonitorSource<S> {
    pub fn new(source: S) -> Self {
        Self {
            monitor: ResponseMonitor::new(source),
        }
    }

    pub fn from_monitor(monitor: ResponseMonitor<S>) -> Self {
        Self { monitor }
    }

    pub fn is_active(&self) -> bool {
        self.monitor.is_active()
    }
}

#[async_trait]
impl<S: SnapshotSource + 'static> ResponseSource for MonitorSource<S> {
    async fn await_response(
        &self,
        _request: &ResponseRequest,
        timeout: Duration,
    ) -> Result<String> {
        // The chat area carries the answer; the id is not needed here.
        self.monitor.wait_for_response(timeout).await
    }
}

/// Asynchronous hook path: rendezvous through the file queue.
pub struct FileSource {
    channel: FileChannel,
}

impl FileSource {
    pub fn new(channel: FileChannel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ResponseSource for FileSource {
    async fn await_response(
        &self,
        request: &ResponseRequest,
        timeout: Duration,
    ) -> Result<String> {
        self.channel.submit(&request.id, &request.content).await?;
        let result = self.channel.await_response(&request.id, timeout).await;
        // The request record is ours to clean up whether or not the hook
        // ever answered.
        self.channel.cleanup(&request.id).await;
        result
    }
}
