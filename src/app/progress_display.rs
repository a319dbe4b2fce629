//! Terminal listener: spinner with live byte counts, final status lines.

use std::time::Duration;

use async_trait::async_trait;
use drive_core::{DownloadListener, ProgressSnapshot};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use tracing::{error, info};

/// Listener used by the binary.
///
/// When `use_spinner` is false (quiet, piped stderr, dumb terminal) progress
/// samples go to the debug log instead.
pub(crate) struct CliListener {
    spinner: Option<ProgressBar>,
}

impl CliListener {
    pub(crate) fn new(use_spinner: bool) -> Self {
        let spinner = use_spinner.then(|| {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::with_template("{spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner.set_message("Resolving link...");
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner
        });
        Self { spinner }
    }

    /// Clears the spinner if a run ended without a callback (cancellation).
    pub(crate) fn finish(&self) {
        if let Some(spinner) = &self.spinner
            && !spinner.is_finished()
        {
            spinner.finish_and_clear();
        }
    }
}

pub(crate) fn format_progress(snapshot: &ProgressSnapshot) -> String {
    format!(
        "{} {} (total {}, {}/s)",
        snapshot.file_name,
        HumanBytes(snapshot.file_bytes),
        HumanBytes(snapshot.run_bytes),
        HumanBytes(snapshot.bytes_per_second),
    )
}

#[async_trait]
impl DownloadListener for CliListener {
    async fn on_download_complete(&self) {
        self.finish();
        info!("Download complete");
    }

    async fn on_download_error(&self, message: &str) {
        self.finish();
        error!(message, "Download failed");
    }

    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        let line = format_progress(snapshot);
        match &self.spinner {
            Some(spinner) => spinner.set_message(line),
            None => tracing::debug!(progress = %line, "Progress"),
        }
    }
}
