//! Shared run state: cancellation flag and transfer counters.
//!
//! Both are written by the transfer worker (or, for cancellation, the
//! caller) and read by the progress timer without locking beyond a short
//! mutex around the current file name. Readers may see stale or zeroed
//! counters right after a reset.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use super::progress::ProgressSnapshot;

/// Cooperative cancellation signal shared between caller and worker.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Byte counters and current file name of a running download.
///
/// Also tracks local files created by a transfer that has not finished, so
/// a later pass over the same tree does not mistake them for complete ones.
#[derive(Debug)]
pub struct TransferState {
    file_processed_bytes: AtomicU64,
    run_processed_bytes: AtomicU64,
    current_file: Mutex<String>,
    incomplete: Mutex<BTreeSet<PathBuf>>,
    started_at: Instant,
}

impl Default for TransferState {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferState {
    #[must_use]
    pub fn new() -> Self {
        Self::with_incomplete(BTreeSet::new())
    }

    /// Fresh counters that keep the incomplete paths of an earlier pass.
    #[must_use]
    pub fn with_incomplete(incomplete: BTreeSet<PathBuf>) -> Self {
        Self {
            file_processed_bytes: AtomicU64::new(0),
            run_processed_bytes: AtomicU64::new(0),
            current_file: Mutex::new(String::new()),
            incomplete: Mutex::new(incomplete),
            started_at: Instant::now(),
        }
    }

    /// Records that `path` exists locally but holds a partial transfer.
    pub fn mark_incomplete(&self, path: &Path) {
        self.incomplete_paths().insert(path.to_path_buf());
    }

    /// Records that `path` was written completely (or removed).
    pub fn clear_incomplete(&self, path: &Path) {
        self.incomplete_paths().remove(path);
    }

    /// Whether `path` was left partial by a transfer in this run.
    #[must_use]
    pub fn is_incomplete(&self, path: &Path) -> bool {
        self.incomplete_paths().contains(path)
    }

    /// Hands the incomplete paths over to the next pass.
    #[must_use]
    pub fn take_incomplete(&self) -> BTreeSet<PathBuf> {
        std::mem::take(&mut *self.incomplete_paths())
    }

    fn incomplete_paths(&self) -> std::sync::MutexGuard<'_, BTreeSet<PathBuf>> {
        self.incomplete.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts counting a new file from zero.
    pub fn begin_file(&self, name: &str) {
        self.file_processed_bytes.store(0, Ordering::Relaxed);
        let mut current = self
            .current_file
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        current.clear();
        current.push_str(name);
    }

    /// Records bytes written for the current file.
    pub fn add_bytes(&self, bytes: u64) {
        self.file_processed_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.run_processed_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Discards the current file's bytes from the totals (restart from byte 0).
    pub fn restart_file(&self) {
        let discarded = self.file_processed_bytes.swap(0, Ordering::Relaxed);
        self.run_processed_bytes
            .fetch_sub(discarded, Ordering::Relaxed);
    }

    /// Resets the per-file counter after a file completes.
    pub fn finish_file(&self) {
        self.file_processed_bytes.store(0, Ordering::Relaxed);
    }

    #[must_use]
    pub fn file_processed_bytes(&self) -> u64 {
        self.file_processed_bytes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn run_processed_bytes(&self) -> u64 {
        self.run_processed_bytes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn current_file(&self) -> String {
        self.current_file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Takes a point-in-time sample for progress reporting.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let elapsed = self.started_at.elapsed();
        let run_bytes = self.run_processed_bytes();
        let millis = elapsed.as_millis().max(1);
        let speed = u64::try_from(u128::from(run_bytes) * 1000 / millis).unwrap_or(u64::MAX);
        ProgressSnapshot {
            file_name: self.current_file(),
            file_bytes: self.file_processed_bytes(),
            run_bytes,
            elapsed,
            bytes_per_second: speed,
        }
    }
}
