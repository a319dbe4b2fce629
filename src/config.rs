//! Engine tunables.
//!
//! [`EngineConfig`] collects every knob the download engine reads. The host
//! binary fills it from its config file and command line; library users can
//! start from [`EngineConfig::default`].

use std::time::Duration;

use crate::download::RetryPolicy;

/// Connect timeout for Drive requests, in seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Read timeout for Drive requests, in seconds. Applies per read, so a slow
/// but progressing chunk does not time out.
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default chunk size (100 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 100 * 1024 * 1024;

/// Default ceiling on in-place retries of a single chunk.
pub const DEFAULT_TRANSIENT_RETRY_LIMIT: u32 = 10;

/// Default progress sampling period.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(3);

/// Target format for native documents that can only be exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFormat {
    /// Mime type requested from the export endpoint.
    pub mime_type: String,
    /// Extension appended to exported file names (without the dot).
    pub extension: String,
}

impl Default for ExportFormat {
    fn default() -> Self {
        Self {
            mime_type: "application/pdf".to_string(),
            extension: "pdf".to_string(),
        }
    }
}

/// Configuration for one download run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bytes requested per chunk.
    pub chunk_size: u64,
    /// In-loop retries allowed for transient chunk failures.
    pub transient_retry_limit: u32,
    /// Outer retry around one complete file attempt.
    pub retry_policy: RetryPolicy,
    /// Progress sampling period.
    pub progress_interval: Duration,
    /// Export target for native documents.
    pub export_format: ExportFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            transient_retry_limit: DEFAULT_TRANSIENT_RETRY_LIMIT,
            retry_policy: RetryPolicy::default(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            export_format: ExportFormat::default(),
        }
    }
}

impl EngineConfig {
    /// Sets the chunk size (clamped to at least one byte).
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Sets the transient retry ceiling.
    #[must_use]
    pub fn with_transient_retry_limit(mut self, limit: u32) -> Self {
        self.transient_retry_limit = limit;
        self
    }

    /// Sets the outer retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Sets the progress sampling period.
    #[must_use]
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }
}
