//! Caller-facing callbacks and per-request state.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::progress::ProgressSnapshot;
use super::state::CancelFlag;

/// Receives the outcome of a download run.
///
/// Exactly one of [`on_download_complete`](Self::on_download_complete) and
/// [`on_download_error`](Self::on_download_error) fires per run, and neither
/// fires when the run is cancelled.
#[async_trait]
pub trait DownloadListener: Send + Sync {
    /// The whole tree (or single file) finished.
    async fn on_download_complete(&self);

    /// The run failed; `message` is safe for display.
    async fn on_download_error(&self, message: &str);

    /// Periodic progress sample. Called from the timer task, so keep it short.
    fn on_progress(&self, _snapshot: &ProgressSnapshot) {}
}

/// Mutable state of one download request, shared by caller and engine.
#[derive(Debug)]
pub struct DownloadRequest {
    link: String,
    user_id: Option<String>,
    name: Mutex<String>,
    excluded_extensions: BTreeSet<String>,
    cancel: CancelFlag,
}

impl DownloadRequest {
    /// Creates a request for `link` with display name `name`.
    pub fn new(link: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            user_id: None,
            name: Mutex::new(name.into()),
            excluded_extensions: BTreeSet::new(),
            cancel: CancelFlag::new(),
        }
    }

    /// Attaches the account identifier whose own token authorizes lookups
    /// for `mtp:` links.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the excluded suffixes (stored lowercase, leading dot optional).
    #[must_use]
    pub fn with_excluded_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.excluded_extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        self
    }

    /// Uses an existing cancel flag (e.g. one wired to Ctrl-C).
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// The link as the user gave it, auth prefix included.
    #[must_use]
    pub fn link(&self) -> &str {
        &self.link
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Current display name.
    #[must_use]
    pub fn name(&self) -> String {
        self.name
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the display name.
    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.lock().unwrap_or_else(PoisonError::into_inner) = name.into();
    }

    /// Replaces the display name only while it still equals `expected`.
    ///
    /// Returns whether the name changed.
    pub fn replace_name_if(&self, expected: &str, name: &str) -> bool {
        let mut current = self.name.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_str() == expected {
            *current = name.to_string();
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn excluded_extensions(&self) -> &BTreeSet<String> {
        &self.excluded_extensions
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}
