//! Drive Downloader Core Library
//!
//! Downloads single files and whole folder trees from a cloud drive,
//! surviving transient server errors, per-credential download quotas,
//! documents that can only be exported, and user cancellation.
//!
//! # Architecture
//!
//! - [`remote`] - node model, the [`ChunkTransport`](remote::ChunkTransport)
//!   seam and its Drive v3 HTTP implementation
//! - [`credentials`] - primary and service-account credentials with bounded rotation
//! - [`download`] - per-file state machine, folder walker, progress timer and
//!   the top-level orchestrator
//! - [`config`] - engine tunables

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod credentials;
pub mod download;
pub mod remote;
mod user_agent;

// Re-export commonly used types
pub use config::{EngineConfig, ExportFormat};
pub use credentials::{Credential, CredentialError, CredentialPool};
pub use download::{
    CancelFlag, DownloadError, DownloadListener, DownloadOrchestrator, DownloadRequest,
    FailureKind, ProgressSnapshot, RetryPolicy, RunOutcome, TransferOutcome, WalkSummary,
};
pub use remote::{ChunkTransport, DriveClient, RemoteNode, TransportError, parse_link};
