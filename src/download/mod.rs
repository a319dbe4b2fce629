//! Download engine: transfer state machine, folder walking and run orchestration.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use drive_core::credentials::{Credential, CredentialPool};
//! use drive_core::download::{DownloadListener, DownloadOrchestrator, DownloadRequest};
//! use drive_core::remote::DriveClient;
//! use drive_core::EngineConfig;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl DownloadListener for Printer {
//!     async fn on_download_complete(&self) {
//!         println!("done");
//!     }
//!     async fn on_download_error(&self, message: &str) {
//!         eprintln!("failed: {message}");
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = CredentialPool::new(Some(Credential::new("me", "ya29.token")), Vec::new())?;
//! let request = Arc::new(DownloadRequest::new("1AbCdEfGhIjK", "Reports"));
//! let mut orchestrator = DownloadOrchestrator::new(
//!     Arc::new(DriveClient::new()?),
//!     pool,
//!     EngineConfig::default(),
//!     request,
//!     Arc::new(Printer),
//! );
//! let outcome = orchestrator.run("1AbCdEfGhIjK", Path::new("./downloads")).await;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

mod error;
pub mod filename;
mod job;
mod listener;
mod orchestrator;
mod progress;
mod retry;
mod state;
mod walker;

pub use error::{DownloadError, NOT_FOUND_MESSAGE, QUOTA_EXCEEDED_MESSAGE, strip_markup};
pub use job::{FileTransferJob, TransferOutcome};
pub use listener::{DownloadListener, DownloadRequest};
pub use orchestrator::{DownloadOrchestrator, RunOutcome};
pub use progress::{ProgressReporter, ProgressSnapshot};
pub use retry::{
    DEFAULT_MAX_ATTEMPTS, FailureKind, RetryDecision, RetryPolicy, classify_transport_error,
};
pub use state::{CancelFlag, TransferState};
pub use walker::{FolderWalker, WalkSummary};
