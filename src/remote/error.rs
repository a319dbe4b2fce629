//! Error type for remote store requests.
//!
//! Structured error bodies are decoded with serde. A body that fails to
//! decode simply yields no reason code, so the failure classifies as a
//! generic error instead of surfacing a parse failure.

use std::error::Error as StdError;

use serde::Deserialize;
use thiserror::Error;

/// HTTP status codes treated as transient (server overload / rate limiting).
pub const TRANSIENT_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

/// Reason codes reported when the active credential ran out of download quota.
pub const QUOTA_REASONS: [&str; 2] = ["downloadQuotaExceeded", "dailyLimitExceeded"];

/// Reason code for native documents that can only be exported.
pub const NOT_DOWNLOADABLE_REASON: &str = "fileNotDownloadable";

/// Errors returned by a [`ChunkTransport`](super::ChunkTransport).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The remote API answered with a non-success status.
    #[error("HTTP {status} for {resource}: {message}")]
    Api {
        /// Object or endpoint the request targeted.
        resource: String,
        /// HTTP status code.
        status: u16,
        /// Structured reason code from the error body, when present.
        reason: Option<String>,
        /// Human-readable message.
        message: String,
    },

    /// Connection-level failure (DNS, reset, timeout, ...).
    #[error("network error for {resource}: {source}")]
    Network {
        /// Object or endpoint the request targeted.
        resource: String,
        /// The underlying error.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// A success response that could not be interpreted.
    #[error("invalid response for {resource}: {detail}")]
    InvalidResponse {
        /// Object or endpoint the request targeted.
        resource: String,
        /// What was wrong with it.
        detail: String,
    },

    /// An endpoint URL could not be built.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The offending URL text.
        url: String,
    },
}

impl TransportError {
    /// Creates an API status error.
    pub fn api(
        resource: impl Into<String>,
        status: u16,
        reason: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Api {
            resource: resource.into(),
            status,
            reason,
            message: message.into(),
        }
    }

    /// Creates a network error.
    pub fn network(
        resource: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self::Network {
            resource: resource.into(),
            source: source.into(),
        }
    }

    /// Creates an invalid-response error.
    pub fn invalid_response(resource: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidResponse {
            resource: resource.into(),
            detail: detail.into(),
        }
    }

    /// Creates an invalid-URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// HTTP status, for API errors.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Structured reason code, for API errors that carried one.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Api { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }

    /// Whether the status is in [`TRANSIENT_STATUS_CODES`].
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.status()
            .is_some_and(|status| TRANSIENT_STATUS_CODES.contains(&status))
    }

    /// Whether the reason code signals exhausted download quota.
    #[must_use]
    pub fn is_quota_exceeded(&self) -> bool {
        self.reason()
            .is_some_and(|reason| QUOTA_REASONS.contains(&reason))
    }

    /// Whether the reason code says the object must be exported instead.
    #[must_use]
    pub fn is_not_downloadable(&self) -> bool {
        self.reason()
            .is_some_and(|reason| reason.contains(NOT_DOWNLOADABLE_REASON))
    }
}

/// Reason and message extracted from a JSON error body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBodyDetails {
    /// First `errors[].reason` entry.
    pub reason: Option<String>,
    /// Top-level `error.message`.
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorPayload,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    #[serde(default)]
    reason: Option<String>,
}

/// Decodes `{"error": {"message": ..., "errors": [{"reason": ...}]}}`.
///
/// Returns `None` when the body is not in that shape.
#[must_use]
pub fn parse_error_body(body: &str) -> Option<ErrorBodyDetails> {
    let envelope: ErrorEnvelope = serde_json::from_str(body).ok()?;
    let reason = envelope
        .error
        .errors
        .into_iter()
        .find_map(|item| item.reason);
    Some(ErrorBodyDetails {
        reason,
        message: envelope.error.message,
    })
}
