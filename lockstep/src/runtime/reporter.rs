//! Progress reporting for the root host's polling loop.

use tracing::{debug, info};

use crate::executor::AggregateProgress;

/// Receives aggregated progress from [`RootHost::run`](super::RootHost::run).
///
/// Terminal rendering lives in the CLI; the library only ships a
/// `tracing`-backed reporter.
pub trait ProgressReporter: Send + Sync {
    /// Called on every poll tick.
    fn report(&self, progress: &AggregateProgress);

    /// Called once after the orchestrator is idle or the run was cancelled.
    fn finish(&self, progress: &AggregateProgress) {
        self.report(progress);
    }
}

/// Reporter that logs progress with `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgressReporter;

impl ProgressReporter for TracingProgressReporter {
    fn report(&self, progress: &AggregateProgress) {
        debug!(
            running = progress.running,
            joining = progress.joining,
            queued = progress.queued,
            finished = progress.finished(),
            total = progress.total,
            percent = ?progress.percent,
            "Progress"
        );
    }

    fn finish(&self, progress: &AggregateProgress) {
        info!(
            completed = progress.completed,
            failed = progress.failed,
            canceled = progress.canceled,
            "Run finished"
        );
    }
}
