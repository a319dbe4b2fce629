//! Single-object transfer with in-place, export and credential recovery.
//!
//! One attempt moves through `Preparing -> Streaming -> {Completed,
//! Cancelled, Failed}`. Two recoveries re-enter `Preparing` within the same
//! attempt: switching to export mode when raw media is refused for a native
//! document, and restarting from byte 0 after rotating to the next service
//! account. Transient chunk failures are retried in place without touching
//! the file. Whatever still escapes an attempt goes through the outer
//! [`RetryPolicy`](super::RetryPolicy).

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use super::error::DownloadError;
use super::filename::{MAX_NAME_BYTES, sanitize_name, truncate_to_byte_limit, with_export_extension};
use super::listener::DownloadRequest;
use super::retry::{FailureKind, RetryDecision, classify_transport_error};
use super::state::TransferState;
use crate::config::EngineConfig;
use crate::credentials::{CredentialError, CredentialPool};
use crate::remote::{ChunkTransport, TransferMode, is_native_document};

/// Result of a transfer that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The object was written completely.
    Completed {
        /// Final local path.
        path: PathBuf,
        /// Bytes written.
        bytes: u64,
    },
    /// Cancellation was observed; a partial file may remain on disk.
    Cancelled,
}

/// How one pass through `Preparing`/`Streaming` ended.
enum Step {
    Done(TransferOutcome),
    /// Re-enter `Preparing` in export mode.
    RetryExport,
    /// Re-enter `Preparing` from byte 0 with the next service account.
    RetryRotatedCredential,
}

/// Downloads one object into a directory.
///
/// Borrowed pieces are shared with the folder walker; the credential pool is
/// passed per call because rotation mutates it.
#[derive(Clone, Copy)]
pub struct FileTransferJob<'a> {
    transport: &'a dyn ChunkTransport,
    config: &'a EngineConfig,
    request: &'a DownloadRequest,
    state: &'a TransferState,
}

impl<'a> FileTransferJob<'a> {
    pub fn new(
        transport: &'a dyn ChunkTransport,
        config: &'a EngineConfig,
        request: &'a DownloadRequest,
        state: &'a TransferState,
    ) -> Self {
        Self {
            transport,
            config,
            request,
            state,
        }
    }

    pub(crate) fn request(&self) -> &'a DownloadRequest {
        self.request
    }

    pub(crate) fn transport(&self) -> &'a dyn ChunkTransport {
        self.transport
    }

    pub(crate) fn state(&self) -> &'a TransferState {
        self.state
    }

    /// Local file name for `file_name`, without side effects.
    #[must_use]
    pub fn local_file_name(&self, file_name: &str, exporting: bool) -> String {
        truncate_to_byte_limit(&self.full_name(file_name, exporting), MAX_NAME_BYTES)
    }

    fn full_name(&self, file_name: &str, exporting: bool) -> String {
        let name = sanitize_name(file_name);
        if exporting {
            with_export_extension(&name, &self.config.export_format.extension)
        } else {
            name
        }
    }

    /// Downloads `object_id` into `destination_dir/file_name`.
    ///
    /// # Errors
    ///
    /// Returns the last [`DownloadError`] once recovery and the outer retry
    /// policy are exhausted, or immediately for quota kinds.
    #[instrument(skip(self, pool, destination_dir), fields(dir = %destination_dir.display()))]
    pub async fn transfer(
        &self,
        pool: &mut CredentialPool,
        object_id: &str,
        destination_dir: &Path,
        file_name: &str,
        mime_type: &str,
    ) -> Result<TransferOutcome, DownloadError> {
        let policy = &self.config.retry_policy;
        let mut attempt = 1;
        loop {
            let error = match self
                .attempt(pool, object_id, destination_dir, file_name, mime_type)
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(error) => error,
            };
            if self.request.is_cancelled() {
                debug!(error = %error, "error after cancellation ignored");
                return Ok(TransferOutcome::Cancelled);
            }
            match policy.should_retry(error.kind(), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    warn!(
                        object_id,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "transfer attempt failed, retrying"
                    );
                    self.state.restart_file();
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    info!(object_id, total_attempts = attempt, %reason, "giving up on transfer");
                    return Err(error);
                }
            }
        }
    }

    /// One full attempt, including export and rotation restarts.
    async fn attempt(
        &self,
        pool: &mut CredentialPool,
        object_id: &str,
        destination_dir: &Path,
        file_name: &str,
        mime_type: &str,
    ) -> Result<TransferOutcome, DownloadError> {
        let mut mode = TransferMode::Media;
        loop {
            match self
                .stream_once(pool, object_id, destination_dir, file_name, mime_type, &mode)
                .await?
            {
                Step::Done(outcome) => return Ok(outcome),
                Step::RetryExport => {
                    info!(object_id, mime_type, "object not downloadable, exporting instead");
                    mode = TransferMode::Export {
                        mime_type: self.config.export_format.mime_type.clone(),
                    };
                }
                Step::RetryRotatedCredential => {
                    info!(object_id, "restarting transfer with rotated credential");
                }
            }
            self.state.restart_file();
        }
    }

    /// `Preparing` plus `Streaming` for one transfer mode and credential.
    async fn stream_once(
        &self,
        pool: &mut CredentialPool,
        object_id: &str,
        destination_dir: &Path,
        file_name: &str,
        mime_type: &str,
        mode: &TransferMode,
    ) -> Result<Step, DownloadError> {
        let exporting = matches!(mode, TransferMode::Export { .. });
        let local_name = self.prepare_name(file_name, exporting);

        if self.request.is_cancelled() {
            return Ok(Step::Done(TransferOutcome::Cancelled));
        }

        let path = destination_dir.join(&local_name);
        let mut file = File::create(&path)
            .await
            .map_err(|e| DownloadError::io(&path, e))?;
        self.state.mark_incomplete(&path);
        let credential = pool.current()?.clone();
        self.state.begin_file(&local_name);
        info!(
            object_id,
            file = %local_name,
            credential = %credential.label(),
            exporting,
            "starting transfer"
        );

        let mut stream =
            self.transport
                .open_chunk_stream(&credential, object_id, mode, self.config.chunk_size);
        let mut transient_retries = 0;
        let mut written: u64 = 0;
        loop {
            if self.request.is_cancelled() {
                file.flush().await.map_err(|e| DownloadError::io(&path, e))?;
                info!(file = %local_name, written, "transfer cancelled");
                return Ok(Step::Done(TransferOutcome::Cancelled));
            }

            let error = match stream.next_chunk().await {
                Ok(chunk) => {
                    file.write_all(&chunk.data)
                        .await
                        .map_err(|e| DownloadError::io(&path, e))?;
                    let len = chunk.data.len() as u64;
                    written += len;
                    self.state.add_bytes(len);
                    if chunk.is_final {
                        file.flush().await.map_err(|e| DownloadError::io(&path, e))?;
                        self.state.finish_file();
                        self.state.clear_incomplete(&path);
                        info!(file = %local_name, bytes = written, "transfer complete");
                        return Ok(Step::Done(TransferOutcome::Completed {
                            path,
                            bytes: written,
                        }));
                    }
                    continue;
                }
                Err(error) => error,
            };

            match classify_transport_error(&error) {
                FailureKind::Transient if transient_retries < self.config.transient_retry_limit => {
                    transient_retries += 1;
                    warn!(
                        status = error.status(),
                        retry = transient_retries,
                        limit = self.config.transient_retry_limit,
                        "transient chunk failure, retrying chunk"
                    );
                }
                FailureKind::QuotaExceeded => {
                    warn!(credential = %credential.label(), reason = error.reason(), "quota exceeded");
                    if !pool.using_service() {
                        return Err(DownloadError::quota_exceeded(object_id, credential.label()));
                    }
                    if self.request.is_cancelled() {
                        return Ok(Step::Done(TransferOutcome::Cancelled));
                    }
                    return match pool.advance() {
                        Ok(()) => Ok(Step::RetryRotatedCredential),
                        Err(CredentialError::Exhausted { rotations, .. }) => {
                            Err(DownloadError::credentials_exhausted(object_id, rotations))
                        }
                        Err(other) => Err(other.into()),
                    };
                }
                FailureKind::NotExportable if !exporting && is_native_document(mime_type) => {
                    // The export lands under a different name; drop the empty media file.
                    drop(file);
                    match tokio::fs::remove_file(&path).await {
                        Ok(()) => self.state.clear_incomplete(&path),
                        Err(e) => {
                            debug!(path = %path.display(), error = %e, "could not remove media placeholder");
                        }
                    }
                    return Ok(Step::RetryExport);
                }
                _ => {
                    return Err(DownloadError::transport(
                        format!("downloading {local_name}"),
                        error,
                    ));
                }
            }
        }
    }

    /// Builds the local name and corrects the display name on truncation.
    fn prepare_name(&self, file_name: &str, exporting: bool) -> String {
        let name = self.full_name(file_name, exporting);
        if name.len() <= MAX_NAME_BYTES {
            return name;
        }
        let truncated = truncate_to_byte_limit(&name, MAX_NAME_BYTES);
        if self.request.replace_name_if(file_name, &truncated) {
            debug!(name = %truncated, "display name updated after truncation");
        }
        truncated
    }
}
