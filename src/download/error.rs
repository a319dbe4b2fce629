//! Error types for the download engine.
//!
//! [`DownloadError`] carries context for logs; [`DownloadError::kind`] maps it
//! onto the recovery taxonomy and [`DownloadError::user_message`] produces the
//! text handed to the listener's error callback.

use std::path::PathBuf;

use thiserror::Error;

use super::retry::{FailureKind, classify_transport_error};
use crate::credentials::CredentialError;
use crate::remote::TransportError;

/// Message reported for quota failures that rotation could not escape.
pub const QUOTA_EXCEEDED_MESSAGE: &str = "Download Quota Exceeded.";

/// Message reported when the root object cannot be found.
pub const NOT_FOUND_MESSAGE: &str = "File not found!";

/// Errors that can end a file transfer or a whole run.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// A remote request failed.
    #[error("{context}: {source}")]
    Transport {
        /// What the engine was doing.
        context: String,
        /// The underlying transport error.
        #[source]
        source: TransportError,
    },

    /// Local file system error.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The credential pool could not supply a credential.
    #[error("credential error: {source}")]
    Credential {
        /// The pool error.
        #[from]
        source: CredentialError,
    },

    /// Quota exhausted on the primary credential (no rotation possible).
    #[error("download quota exceeded for {object_id} on credential {credential}")]
    QuotaExceeded {
        /// Object whose transfer failed.
        object_id: String,
        /// Label of the exhausted credential.
        credential: String,
    },

    /// Quota exhausted and every allowed service-account rotation used.
    #[error("download quota exceeded for {object_id} after {rotations} service account switches")]
    CredentialsExhausted {
        /// Object whose transfer failed.
        object_id: String,
        /// Rotations performed before giving up.
        rotations: usize,
    },
}

impl DownloadError {
    /// Creates a transport error with context.
    pub fn transport(context: impl Into<String>, source: TransportError) -> Self {
        Self::Transport {
            context: context.into(),
            source,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a primary-credential quota error.
    pub fn quota_exceeded(object_id: impl Into<String>, credential: impl Into<String>) -> Self {
        Self::QuotaExceeded {
            object_id: object_id.into(),
            credential: credential.into(),
        }
    }

    /// Creates a rotation-exhausted error.
    pub fn credentials_exhausted(object_id: impl Into<String>, rotations: usize) -> Self {
        Self::CredentialsExhausted {
            object_id: object_id.into(),
            rotations,
        }
    }

    /// Classifies this error.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transport { source, .. } => classify_transport_error(source),
            Self::Io { .. } => FailureKind::Other,
            Self::Credential { source } => match source {
                CredentialError::Exhausted { .. } => FailureKind::CredentialsExhausted,
                _ => FailureKind::Other,
            },
            Self::QuotaExceeded { .. } => FailureKind::QuotaExceeded,
            Self::CredentialsExhausted { .. } => FailureKind::CredentialsExhausted,
        }
    }

    /// Display text for the listener's error callback.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self.kind() {
            FailureKind::QuotaExceeded | FailureKind::CredentialsExhausted => {
                QUOTA_EXCEEDED_MESSAGE.to_string()
            }
            FailureKind::NotFound => NOT_FOUND_MESSAGE.to_string(),
            _ => strip_markup(&self.to_string()),
        }
    }
}

/// Removes `<` and `>` so the message is safe to embed in markup.
#[must_use]
pub fn strip_markup(message: &str) -> String {
    message.chars().filter(|c| !matches!(c, '<' | '>')).collect()
}
