//! Failure classification and the outer retry policy.
//!
//! Two retry layers exist. Transient chunk failures are retried in place by
//! the transfer job (bounded by `EngineConfig::transient_retry_limit`).
//! Everything that escapes one full file attempt goes through
//! [`RetryPolicy`], which waits with exponential backoff between attempts.
//!
//! # Example
//!
//! ```
//! use drive_core::download::{FailureKind, RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//! match policy.should_retry(FailureKind::Other, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use crate::remote::TransportError;

/// Default maximum attempts for one file (including the first).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(3);

const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(6);

/// Seconds multiplied by `2^(attempt-1)`.
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

const MAX_JITTER: Duration = Duration::from_millis(500);

/// Classification of a download failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Server overload or rate limiting; retried in place.
    Transient,
    /// The active credential ran out of download quota.
    QuotaExceeded,
    /// The object does not exist or is not visible to the credential.
    NotFound,
    /// A native document that must be exported instead of downloaded.
    NotExportable,
    /// Every service-account rotation has been used.
    CredentialsExhausted,
    /// The run was cancelled by the caller.
    Cancelled,
    /// Anything else.
    Other,
}

impl FailureKind {
    /// Whether the outer retry layer may try again.
    ///
    /// Credential kinds are already resolved by the transfer job's rotation
    /// logic, and cancellation is never retried.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            Self::QuotaExceeded | Self::CredentialsExhausted | Self::Cancelled
        )
    }
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after `delay`.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// The attempt number about to start (1-indexed).
        attempt: u32,
    },

    /// Give up.
    DoNotRetry {
        /// Human-readable reason.
        reason: String,
    },
}

/// Outer retry policy with exponential backoff.
///
/// # Delay Calculation
///
/// ```text
/// delay = clamp(multiplier * 2^(attempt-1) s, min_delay, max_delay) + jitter
/// ```
///
/// The result never exceeds `max_delay`. With defaults the waits after the
/// first and second attempts are about 4s and 6s.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    min_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with a custom attempt count and default delays.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// A policy that retries without waiting. Used by tests and dry runs.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 0.0,
            jitter: false,
        }
    }

    /// Disables random jitter.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Maximum attempts per file.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides whether to retry after `attempt` (1-indexed) failed with `kind`.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, kind: FailureKind, attempt: u32) -> RetryDecision {
        if !kind.is_retryable() {
            return RetryDecision::DoNotRetry {
                reason: format!("{kind:?} is not retryable"),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);
        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );
        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = f64::from(attempt.saturating_sub(1));
        let raw_ms = f64::from(self.backoff_multiplier) * 1000.0 * 2f64.powf(exponent);
        let min_ms = self.min_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let clamped = Duration::from_millis(raw_ms.clamp(min_ms, max_ms) as u64);
        (clamped + self.calculate_jitter()).min(self.max_delay)
    }

    fn calculate_jitter(&self) -> Duration {
        if !self.jitter {
            return Duration::ZERO;
        }
        let mut rng = rand::thread_rng();
        #[allow(clippy::cast_possible_truncation)]
        let jitter_ms = rng.gen_range(0..=MAX_JITTER.as_millis() as u64);
        Duration::from_millis(jitter_ms)
    }
}

/// Classifies a transport error.
///
/// | Condition | Kind |
/// |-----------|------|
/// | status 429/500/502/503/504 | Transient |
/// | reason `downloadQuotaExceeded` / `dailyLimitExceeded` | QuotaExceeded |
/// | reason `fileNotDownloadable` | NotExportable |
/// | status 404 or "File not found" in the message | NotFound |
/// | anything else (including unparsable error bodies) | Other |
#[must_use]
pub fn classify_transport_error(error: &TransportError) -> FailureKind {
    if error.is_transient() {
        return FailureKind::Transient;
    }
    if error.is_quota_exceeded() {
        return FailureKind::QuotaExceeded;
    }
    if error.is_not_downloadable() {
        return FailureKind::NotExportable;
    }
    match error {
        TransportError::Api {
            status, message, ..
        } if *status == 404 || message.contains("File not found") => FailureKind::NotFound,
        _ => FailureKind::Other,
    }
}
