//! Stall detection watchdog.
//!
//! Tracks the orchestrator's activity timestamp and warns when work is
//! pending but no unit has started, finished or reported progress for
//! longer than a threshold. A shard search that hangs on a blocking worker
//! shows up here; a slow download that keeps reporting does not.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::core::now_ms;

/// Default stall detection threshold (60 seconds).
pub const STALL_DETECTION_THRESHOLD_MS: u64 = 60_000;

/// Default watchdog check interval (15 seconds).
pub const STALL_WATCHDOG_INTERVAL_SECS: u64 = 15;

/// Health of the orchestrator as seen by the watchdog.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Idle,
    Stalled,
}

/// Stall detection watchdog.
pub struct StallWatchdog {
    last_activity_ms: Arc<AtomicU64>,
    pending_work: Arc<AtomicU64>,
    threshold_ms: u64,
    interval: Duration,
}

impl StallWatchdog {
    /// Creates a watchdog over counters from
    /// [`Orchestrator::activity_counters`](super::Orchestrator::activity_counters).
    pub fn new(last_activity_ms: Arc<AtomicU64>, pending_work: Arc<AtomicU64>) -> Self {
        Self {
            last_activity_ms,
            pending_work,
            threshold_ms: STALL_DETECTION_THRESHOLD_MS,
            interval: Duration::from_secs(STALL_WATCHDOG_INTERVAL_SECS),
        }
    }

    pub fn with_threshold(mut self, threshold: Duration, interval: Duration) -> Self {
        self.threshold_ms = threshold.as_millis() as u64;
        self.interval = interval;
        self
    }

    /// Runs until cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.check_health();
                }
            }
        }
    }

    fn check_health(&self) -> Health {
        let elapsed_ms = self.elapsed_since_last_activity();
        let pending = self.pending_work.load(Ordering::Relaxed);

        match (elapsed_ms > self.threshold_ms, pending > 0) {
            (true, true) => {
                warn!(
                    elapsed_ms,
                    pending,
                    threshold_ms = self.threshold_ms,
                    "STALL DETECTED: {} pending units but no progress for {}s",
                    pending,
                    elapsed_ms / 1000
                );
                Health::Stalled
            }
            (true, false) => {
                debug!(elapsed_ms, "Stall watchdog: orchestrator idle");
                Health::Idle
            }
            (false, _) => {
                debug!(elapsed_ms, pending, "Stall watchdog: orchestrator healthy");
                Health::Healthy
            }
        }
    }

    fn elapsed_since_last_activity(&self) -> u64 {
        now_ms().saturating_sub(self.last_activity_ms.load(Ordering::Relaxed))
    }
}
