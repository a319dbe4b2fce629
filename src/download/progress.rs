//! Periodic progress sampling.
//!
//! [`ProgressReporter`] runs a sampling closure on a fixed period in its own
//! tokio task. The closure only reads shared state. `stop` waits for the
//! task to exit, so no sample can fire after it returns.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Smallest accepted sampling period.
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// A point-in-time view of a running download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// File currently being transferred.
    pub file_name: String,
    /// Bytes written for the current file.
    pub file_bytes: u64,
    /// Bytes written since the run started.
    pub run_bytes: u64,
    /// Time since the run started.
    pub elapsed: Duration,
    /// Average throughput since the run started.
    pub bytes_per_second: u64,
}

/// Handle to a running sampler task.
#[derive(Debug)]
pub struct ProgressReporter {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    /// Spawns the sampler. The first sample fires one `interval` after start.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start<F>(interval: Duration, mut sample: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let interval = interval.max(MIN_INTERVAL);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => sample(),
                }
            }
        });
        debug!(interval_ms = interval.as_millis(), "progress reporter started");
        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Stops the sampler and waits for its task to exit. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            // The task may already be gone; nothing to signal then.
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await
                && !e.is_cancelled()
            {
                warn!(error = %e, "progress reporter task failed");
            }
            debug!("progress reporter stopped");
        }
    }

    /// Whether `stop` has not been called yet.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
