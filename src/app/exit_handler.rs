//! Exit code logic for the downloader process.
//!
//! Single responsibility: map the run outcome to the process exit outcome.

use drive_core::RunOutcome;

use crate::ProcessExit;

/// Determines the process exit outcome from the run outcome.
pub(crate) fn determine_exit_outcome(outcome: &RunOutcome) -> ProcessExit {
    match outcome {
        RunOutcome::Completed => ProcessExit::Success,
        RunOutcome::Cancelled => ProcessExit::Interrupted,
        RunOutcome::Failed { .. } => ProcessExit::Failure,
    }
}
