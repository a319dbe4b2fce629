//! Recursive folder expansion.

use std::path::Path;

use futures_util::future::BoxFuture;
use tracing::{debug, info, instrument};

use super::error::DownloadError;
use super::filename::{is_excluded, sanitize_name};
use super::job::{FileTransferJob, TransferOutcome};
use crate::credentials::CredentialPool;
use crate::remote::{NodeKind, RemoteNode, is_native_document};

/// Counters collected while walking a tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    /// Files written completely.
    pub files_transferred: usize,
    /// Files skipped because they exist locally or are excluded.
    pub files_skipped: usize,
    /// Local directories that did not exist before.
    pub folders_created: usize,
}

/// Mirrors a remote folder tree into a local directory.
///
/// Children are visited in name order at every level. Cancellation is
/// checked before each folder and after each child.
pub struct FolderWalker<'a> {
    job: FileTransferJob<'a>,
}

impl<'a> FolderWalker<'a> {
    pub fn new(job: FileTransferJob<'a>) -> Self {
        Self { job }
    }

    /// Expands `folder_id` into `destination_dir/folder_name`.
    ///
    /// # Errors
    ///
    /// Returns the first [`DownloadError`] from listing, directory creation or
    /// a file transfer; remaining siblings are not visited.
    #[instrument(skip(self, pool, destination_dir), fields(dir = %destination_dir.display()))]
    pub async fn expand(
        &self,
        pool: &mut CredentialPool,
        folder_id: &str,
        destination_dir: &Path,
        folder_name: &str,
    ) -> Result<WalkSummary, DownloadError> {
        let mut summary = WalkSummary::default();
        self.expand_folder(pool, folder_id, destination_dir, folder_name, &mut summary)
            .await?;
        info!(
            transferred = summary.files_transferred,
            skipped = summary.files_skipped,
            folders = summary.folders_created,
            "folder expanded"
        );
        Ok(summary)
    }

    fn expand_folder<'b>(
        &'b self,
        pool: &'b mut CredentialPool,
        folder_id: &'b str,
        destination_dir: &'b Path,
        folder_name: &'b str,
        summary: &'b mut WalkSummary,
    ) -> BoxFuture<'b, Result<(), DownloadError>> {
        Box::pin(async move {
            let request = self.job.request();
            if request.is_cancelled() {
                return Ok(());
            }

            let path = destination_dir.join(sanitize_name(folder_name));
            let existed = tokio::fs::try_exists(&path).await.unwrap_or(false);
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| DownloadError::io(&path, e))?;
            if !existed {
                summary.folders_created += 1;
            }

            let credential = pool.current()?.clone();
            let mut children = self
                .job
                .transport()
                .list_children(&credential, folder_id)
                .await
                .map_err(|e| DownloadError::transport(format!("listing folder {folder_id}"), e))?;
            if children.is_empty() {
                debug!(folder_id, "empty folder");
                return Ok(());
            }
            children.sort_by(|a, b| a.name.cmp(&b.name));

            for child in &children {
                let target = child.resolve_target();
                if target.kind == NodeKind::Folder {
                    self.expand_folder(pool, target.id, &path, &child.name, summary)
                        .await?;
                } else if self.should_skip(child, target.mime_type, &path).await {
                    summary.files_skipped += 1;
                } else {
                    let outcome = self
                        .job
                        .transfer(pool, target.id, &path, &child.name, target.mime_type)
                        .await?;
                    if matches!(outcome, TransferOutcome::Completed { .. }) {
                        summary.files_transferred += 1;
                    }
                }
                if request.is_cancelled() {
                    debug!(folder_id, "cancelled, skipping remaining children");
                    break;
                }
            }
            Ok(())
        })
    }

    /// Whether a file child matches an excluded suffix or already exists
    /// locally. Files left partial by an earlier failed attempt do not count.
    async fn should_skip(&self, child: &RemoteNode, mime_type: &str, dir: &Path) -> bool {
        if is_excluded(&child.name, self.job.request().excluded_extensions()) {
            debug!(name = %child.name, "excluded by suffix");
            return true;
        }
        let mut candidates = vec![self.job.local_file_name(&child.name, false)];
        if is_native_document(mime_type) {
            candidates.push(self.job.local_file_name(&child.name, true));
        }
        for candidate in candidates {
            let path = dir.join(&candidate);
            if self.job.state().is_incomplete(&path) {
                debug!(name = %candidate, "partial file from a failed attempt, downloading again");
                continue;
            }
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                debug!(name = %candidate, "already present locally");
                return true;
            }
        }
        false
    }
}
