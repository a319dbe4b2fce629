//! Credential pool with bounded service-account rotation.
//!
//! The pool holds one optional primary (interactive) credential and an ordered
//! list of service-account credentials. Quota exhaustion on a service account
//! is escaped by [`CredentialPool::advance`], which is bounded by an explicit
//! `max_rotations` so a run can never cycle through credentials forever.
//!
//! Token acquisition happens elsewhere; every [`Credential`] carries an
//! already-authorized bearer token.

use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

/// An already-authorized bearer credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    label: String,
    token: String,
}

impl Credential {
    /// Creates a credential from a human-readable label and a bearer token.
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            token: token.into(),
        }
    }

    /// Label used in logs (file name, account e-mail, ...).
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Bearer token sent with every request.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("label", &self.label)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Errors raised by [`CredentialPool`] operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    /// The pool was built without any credential at all.
    #[error("no credentials configured")]
    Empty,

    /// Rotation was requested while still on the primary credential.
    #[error("credential rotation requires service accounts to be active")]
    NotRotating,

    /// Every allowed rotation has been used.
    #[error("reached maximum number of service account switches ({max})")]
    Exhausted {
        /// Rotations performed so far.
        rotations: usize,
        /// Configured upper bound.
        max: usize,
    },

    /// The primary credential was requested but is missing or disabled.
    #[error("primary credential is unavailable")]
    PrimaryUnavailable,
}

/// Source of truth for the active credential during a run.
///
/// Owned by the single transfer worker and mutated only there.
#[derive(Debug, Clone)]
pub struct CredentialPool {
    primary: Option<Credential>,
    service_accounts: Vec<Credential>,
    current_index: usize,
    rotation_count: usize,
    max_rotations: usize,
    using_service: bool,
    primary_disabled: bool,
    alt_auth_attempted: bool,
}

impl CredentialPool {
    /// Creates a pool that starts on the primary credential.
    ///
    /// `max_rotations` defaults to the number of service accounts. A pool
    /// without a primary starts directly in service-account mode.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Empty`] when neither a primary nor any
    /// service account is supplied.
    pub fn new(
        primary: Option<Credential>,
        service_accounts: Vec<Credential>,
    ) -> Result<Self, CredentialError> {
        if primary.is_none() && service_accounts.is_empty() {
            return Err(CredentialError::Empty);
        }
        let using_service = primary.is_none();
        let max_rotations = service_accounts.len();
        debug!(
            has_primary = primary.is_some(),
            service_accounts = service_accounts.len(),
            using_service,
            "credential pool created"
        );
        Ok(Self {
            primary,
            service_accounts,
            current_index: 0,
            rotation_count: 0,
            max_rotations,
            using_service,
            primary_disabled: false,
            alt_auth_attempted: false,
        })
    }

    /// Overrides the rotation bound.
    #[must_use]
    pub fn with_max_rotations(mut self, max_rotations: usize) -> Self {
        self.max_rotations = max_rotations;
        self
    }

    /// Starts the run on service accounts instead of the primary credential.
    ///
    /// The primary stays enabled; this only picks the initial mode.
    #[must_use]
    pub fn starting_with_service_accounts(mut self) -> Self {
        if !self.service_accounts.is_empty() {
            self.using_service = true;
        }
        self
    }

    /// Starts rotation at a specific service account (wrapped into range).
    #[must_use]
    pub fn with_start_index(mut self, index: usize) -> Self {
        if !self.service_accounts.is_empty() {
            self.current_index = index % self.service_accounts.len();
        }
        self
    }

    /// Returns the active credential.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::PrimaryUnavailable`] when the pool is on the
    /// primary credential but none is configured or it has been disabled.
    pub fn current(&self) -> Result<&Credential, CredentialError> {
        if self.using_service {
            // current_index is kept in range by every mutation.
            return self
                .service_accounts
                .get(self.current_index)
                .ok_or(CredentialError::Empty);
        }
        if self.primary_disabled {
            return Err(CredentialError::PrimaryUnavailable);
        }
        self.primary
            .as_ref()
            .ok_or(CredentialError::PrimaryUnavailable)
    }

    /// Moves to the next service account.
    ///
    /// # Errors
    ///
    /// - [`CredentialError::NotRotating`] when not in service-account mode
    /// - [`CredentialError::Exhausted`] once `max_rotations` is reached
    pub fn advance(&mut self) -> Result<(), CredentialError> {
        if !self.using_service || self.service_accounts.is_empty() {
            return Err(CredentialError::NotRotating);
        }
        if self.rotation_count >= self.max_rotations {
            info!(
                rotations = self.rotation_count,
                "reached maximum number of service account switches"
            );
            return Err(CredentialError::Exhausted {
                rotations: self.rotation_count,
                max: self.max_rotations,
            });
        }
        self.current_index = (self.current_index + 1) % self.service_accounts.len();
        self.rotation_count += 1;
        info!(
            index = self.current_index,
            rotations = self.rotation_count,
            label = %self.service_accounts[self.current_index].label(),
            "switched service account"
        );
        Ok(())
    }

    /// One-shot transition from the primary credential to service accounts.
    ///
    /// Disables the primary. Returns `true` when a switch happened, `false`
    /// when already in service mode or when no service accounts exist.
    pub fn switch_to_service_accounts(&mut self) -> bool {
        if self.using_service || self.service_accounts.is_empty() {
            return false;
        }
        warn!(
            service_accounts = self.service_accounts.len(),
            "switching to service accounts; primary credential disabled"
        );
        self.using_service = true;
        self.primary_disabled = true;
        true
    }

    /// Whether a service account is the active credential.
    #[must_use]
    pub fn using_service(&self) -> bool {
        self.using_service
    }

    /// Whether any service account is configured.
    #[must_use]
    pub fn has_service_accounts(&self) -> bool {
        !self.service_accounts.is_empty()
    }

    /// Number of successful rotations so far.
    #[must_use]
    pub fn rotation_count(&self) -> usize {
        self.rotation_count
    }

    /// Configured rotation bound.
    #[must_use]
    pub fn max_rotations(&self) -> usize {
        self.max_rotations
    }

    /// Index of the active service account.
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Whether the whole-run alternate-auth fallback has already fired.
    #[must_use]
    pub fn alt_auth_attempted(&self) -> bool {
        self.alt_auth_attempted
    }

    /// Latches the alternate-auth fallback so it fires at most once.
    pub fn mark_alt_auth_attempted(&mut self) {
        self.alt_auth_attempted = true;
    }
}
