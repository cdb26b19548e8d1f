//! Response stabilization monitor
//!
//! Kiro gives no signal when it has finished answering; the only
//! observable is the chat text itself. The monitor polls snapshots and
//! declares the response complete once the text has stopped changing for
//! `STABLE_THRESHOLD`. A pure edge trigger would return partial output,
//! so silence for the full threshold is required.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::automation::SnapshotSource;
use crate::error::{BridgeError, Result};

/// Time between snapshot reads.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long the text must stay unchanged to count as complete.
pub const STABLE_THRESHOLD: Duration = Duration::from_secs(3);

/// Default bound on one wait.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Poll/stabilization timings, injectable for tests.
#[derive(Debug, Clone, Copy)]
pub struct MonitorTimings {
    pub poll_interval: Duration,
    pub stable_threshold: Duration,
}

impl Default for MonitorTimings {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            stable_threshold: STABLE_THRESHOLD,
        }
    }
}

pub struct ResponseMonitor<S> {
    source: Arc<S>,
    timings: MonitorTimings,
    active: AtomicBool,
}

/// Clears the active flag on every exit path of a wait, including early
/// returns through `?`.
struct ActiveGuard<'a>(&'a AtomicBool);

impl<'a> ActiveGuard<'a> {
    fn arm(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<S: SnapshotSource + 'static> ResponseMonitor<S> {
    pub fn new(source: S) -> Self {
        Self::with_timings(source, MonitorTimings::default())
    }

    pub fn with_timings(source: S, timings: MonitorTimings) -> Self {
        Self {
            source: Arc::new(source),
            timings,
            active: AtomicBool::new(false),
        }
    }

    /// Whether a wait is in progress right now. False before the first
    /// call and after every exit, success or not.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Poll until the chat text stabilizes, up to `timeout`.
    ///
    /// A snapshot source that cannot produce a value fails the wait
    /// immediately with [`BridgeError::ReadFailure`]: a failed read is
    /// not itself content change, so retrying would only mask it.
    pub async fn wait_for_response(&self, timeout: Duration) -> Result<String> {
        let _guard = ActiveGuard::arm(&self.active);
        let start = Instant::now();
        let mut last_snapshot: Option<String> = None;
        let mut last_change = start;

        loop {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(BridgeError::Timeout { duration: timeout });
            }

            // The desktop read primitive blocks (clipboard, keystroke
            // settling), so it runs on the blocking pool.
            let source = self.source.clone();
            let snapshot = tokio::task::spawn_blocking(move || source.read_snapshot())
                .await
                .map_err(|e| BridgeError::ReadFailure {
                    message: format!("snapshot read task failed: {e}"),
                })?
                .ok_or_else(|| BridgeError::ReadFailure {
                    message: "could not read chat snapshot".to_string(),
                })?;

            let now = Instant::now();
            if last_snapshot.as_deref() != Some(snapshot.as_str()) {
                // Text changed, Kiro is still producing output.
                last_snapshot = Some(snapshot);
                last_change = now;
            } else if now.duration_since(last_change) >= self.timings.stable_threshold {
                log::info!(
                    "response stabilized after {:.1}s",
                    elapsed.as_secs_f64()
                );
                return Ok(snapshot);
            }

            sleep(self.timings.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays a fixed snapshot script; the final entry repeats forever.
    struct ScriptedSource {
        script: Mutex<VecDeque<Option<String>>>,
    }

    impl ScriptedSource {
        fn new(script: &[Option<&str>]) -> Self {
            Self {
                script: Mutex::new(
                    script
                        .iter()
                        .map(|s| s.map(str::to_string))
                        .collect(),
                ),
            }
        }
    }

    impl SnapshotSource for ScriptedSource {
        fn read_snapshot(&self) -> Option<String> {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().flatten()
            }
        }
    }

    /// Returns a different snapshot on every read.
    struct EverChangingSource {
        counter: Mutex<u64>,
    }

    impl SnapshotSource for EverChangingSource {
        fn read_snapshot(&self) -> Option<String> {
            let mut counter = self.counter.lock().unwrap();
            *counter += 1;
            Some(format!("chunk {}", *counter))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_final_text_only_after_stabilization() {
        let source = ScriptedSource::new(&[Some("a"), Some("a"), Some("b")]);
        let monitor = ResponseMonitor::new(source);
        let start = Instant::now();
        let result = monitor
            .wait_for_response(DEFAULT_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(result, "b");
        // b first appeared on the third poll; stabilization needs three
        // more unchanged seconds on top of that.
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(!monitor.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_returns_on_first_sight_of_new_text() {
        // Stable immediately: still must wait the full threshold.
        let source = ScriptedSource::new(&[Some("x")]);
        let monitor = ResponseMonitor::new(source);
        let start = Instant::now();
        let result = monitor
            .wait_for_response(DEFAULT_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(result, "x");
        assert!(start.elapsed() >= STABLE_THRESHOLD);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ever_changing_source_times_out() {
        let source = EverChangingSource {
            counter: Mutex::new(0),
        };
        let monitor = ResponseMonitor::new(source);
        let result = monitor.wait_for_response(Duration::from_secs(5)).await;
        assert!(matches!(result, Err(BridgeError::Timeout { .. })));
        assert!(!monitor.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_failure_fails_immediately() {
        let source = ScriptedSource::new(&[None]);
        let monitor = ResponseMonitor::new(source);
        let start = Instant::now();
        let result = monitor.wait_for_response(DEFAULT_TIMEOUT).await;
        assert!(matches!(result, Err(BridgeError::ReadFailure { .. })));
        // No retry: the failure surfaced on the first poll.
        assert!(start.elapsed() < POLL_INTERVAL);
        assert!(!monitor.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_is_active_reflects_only_an_in_flight_wait() {
        let source = ScriptedSource::new(&[Some("x")]);
        let monitor = Arc::new(ResponseMonitor::new(source));
        assert!(!monitor.is_active());

        let waiting = monitor.clone();
        let handle =
            tokio::spawn(async move { waiting.wait_for_response(DEFAULT_TIMEOUT).await });
        sleep(Duration::from_millis(1500)).await;
        assert!(monitor.is_active());

        let result = handle.await.unwrap().unwrap();
        assert_eq!(result, "x");
        assert!(!monitor.is_active());
    }
}
