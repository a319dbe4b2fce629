//! Top-level run: resolve the root, dispatch, report exactly once.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use super::error::DownloadError;
use super::job::{FileTransferJob, TransferOutcome};
use super::listener::{DownloadListener, DownloadRequest};
use super::progress::ProgressReporter;
use super::retry::FailureKind;
use super::state::TransferState;
use super::walker::FolderWalker;
use crate::config::EngineConfig;
use crate::credentials::CredentialPool;
use crate::remote::{ChunkTransport, NodeKind};

/// Terminal result of [`DownloadOrchestrator::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Everything was downloaded; the completion callback fired.
    Completed,
    /// Cancellation was observed; no callback fired.
    Cancelled,
    /// The run failed; the error callback fired with `message`.
    Failed {
        /// Classification of the failure.
        kind: FailureKind,
        /// Message passed to the error callback.
        message: String,
    },
}

/// Runs one download request from root lookup to the final callback.
pub struct DownloadOrchestrator {
    transport: Arc<dyn ChunkTransport>,
    pool: CredentialPool,
    config: EngineConfig,
    request: Arc<DownloadRequest>,
    listener: Arc<dyn DownloadListener>,
}

impl DownloadOrchestrator {
    pub fn new(
        transport: Arc<dyn ChunkTransport>,
        pool: CredentialPool,
        config: EngineConfig,
        request: Arc<DownloadRequest>,
        listener: Arc<dyn DownloadListener>,
    ) -> Self {
        Self {
            transport,
            pool,
            config,
            request,
            listener,
        }
    }

    /// Credential pool state after (or during) a run.
    #[must_use]
    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    #[must_use]
    pub fn request(&self) -> &Arc<DownloadRequest> {
        &self.request
    }

    /// Downloads `root_id` into `destination`.
    ///
    /// Folders land in `destination/<display name>`, single files in
    /// `destination` under the display name. A root that is not found on the
    /// primary credential is retried once, in full, on service accounts;
    /// files the failed pass left partial are downloaded again.
    #[instrument(skip(self, destination), fields(destination = %destination.display()))]
    pub async fn run(&mut self, root_id: &str, destination: &Path) -> RunOutcome {
        let mut incomplete = BTreeSet::new();
        loop {
            let state = Arc::new(TransferState::with_incomplete(incomplete));
            let mut reporter = self.start_reporter(&state);
            let result = self.run_once(root_id, destination, &state).await;
            reporter.stop().await;
            incomplete = state.take_incomplete();

            let error = match result {
                Ok(()) if self.request.is_cancelled() => {
                    info!("download cancelled");
                    return RunOutcome::Cancelled;
                }
                Ok(()) => {
                    info!(
                        name = %self.request.name(),
                        bytes = state.run_processed_bytes(),
                        "download complete"
                    );
                    self.listener.on_download_complete().await;
                    return RunOutcome::Completed;
                }
                Err(error) => error,
            };

            if self.request.is_cancelled() {
                info!(error = %error, "download cancelled");
                return RunOutcome::Cancelled;
            }

            let kind = error.kind();
            if kind == FailureKind::NotFound
                && !self.pool.using_service()
                && self.pool.has_service_accounts()
                && !self.pool.alt_auth_attempted()
            {
                warn!(root_id, "file not found on primary credential, retrying with service accounts");
                self.pool.mark_alt_auth_attempted();
                self.pool.switch_to_service_accounts();
                continue;
            }

            let message = error.user_message();
            error!(root_id, ?kind, error = %error, "download failed");
            self.listener.on_download_error(&message).await;
            self.request.cancel();
            return RunOutcome::Failed { kind, message };
        }
    }

    fn start_reporter(&self, state: &Arc<TransferState>) -> ProgressReporter {
        let state = Arc::clone(state);
        let listener = Arc::clone(&self.listener);
        ProgressReporter::start(self.config.progress_interval, move || {
            listener.on_progress(&state.snapshot());
        })
    }

    async fn run_once(
        &mut self,
        root_id: &str,
        destination: &Path,
        state: &TransferState,
    ) -> Result<(), DownloadError> {
        let credential = self.pool.current()?.clone();
        let root = self
            .transport
            .fetch_metadata(&credential, root_id)
            .await
            .map_err(|e| DownloadError::transport(format!("fetching metadata for {root_id}"), e))?;

        let mut name = self.request.name();
        if name.trim().is_empty() {
            name.clone_from(&root.name);
            self.request.set_name(name.as_str());
        }

        let target = root.resolve_target();
        let job = FileTransferJob::new(self.transport.as_ref(), &self.config, &self.request, state);
        if target.kind == NodeKind::Folder {
            info!(root_id, name = %name, user_id = self.request.user_id(), "downloading folder");
            FolderWalker::new(job)
                .expand(&mut self.pool, target.id, destination, &name)
                .await?;
        } else {
            info!(
                root_id,
                name = %name,
                mime_type = target.mime_type,
                user_id = self.request.user_id(),
                "downloading file"
            );
            tokio::fs::create_dir_all(destination)
                .await
                .map_err(|e| DownloadError::io(destination, e))?;
            let outcome = job
                .transfer(&mut self.pool, target.id, destination, &name, target.mime_type)
                .await?;
            // Export adds an extension; the display name tracks the file on disk.
            if let TransferOutcome::Completed { path, .. } = outcome
                && let Some(local) = path.file_name().and_then(|n| n.to_str())
                && local != self.request.name()
            {
                debug!(name = %local, "display name follows local file name");
                self.request.set_name(local);
            }
        }
        Ok(())
    }
}
