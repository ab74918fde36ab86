//! Orchestrator core: state and public API.
//!
//! The [`Orchestrator`] owns every submitted unit, admits them through a
//! bounded gate in submission order, hands out cancellation scopes and
//! aggregates progress. Admission and completion bookkeeping lives in
//! [`lifecycle`](super::lifecycle).

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::config::OrchestratorConfig;
use super::error::{HostError, JoinError};
use super::handle::UnitHandle;
use super::host::{RequestHandler, SubmitOptions};
use super::progress::{AggregateProgress, UnitSnapshot};
use super::scope::{CancellationScope, ScopeId};
use super::telemetry::{NullTelemetrySink, TelemetrySink};
use super::unit::{UnitId, WorkUnit};

// =============================================================================
// Internal State
// =============================================================================

/// One entry in the admission queue.
pub(crate) enum Admission {
    /// Start a scheduled unit.
    Start(UnitId),
    /// Hand a slot back to a unit that released it while joining children.
    Resume(oneshot::Sender<OwnedSemaphorePermit>),
}

/// Bookkeeping for one registered unit.
pub(crate) struct UnitEntry {
    pub(crate) unit: Arc<dyn WorkUnit>,
    pub(crate) parent: Option<UnitId>,
    pub(crate) options: SubmitOptions,
    /// Token the unit's own token was derived from.
    pub(crate) base_token: CancellationToken,
    pub(crate) token: CancellationToken,
    pub(crate) scheduled: bool,
    /// Slot released while waiting in `join_children`.
    pub(crate) joining: bool,
    pub(crate) queued_at: Option<Instant>,
}

/// A registered cancellation scope.
pub(crate) struct ScopeEntry {
    /// Unit that opened the scope, or `None` for the root.
    pub(crate) owner: Option<UnitId>,
    pub(crate) token: CancellationToken,
}

/// State guarded by the registry lock.
#[derive(Default)]
pub(crate) struct Registry {
    /// Ordered by id, which is submission order.
    pub(crate) units: BTreeMap<UnitId, UnitEntry>,
    pub(crate) admission: VecDeque<Admission>,
    pub(crate) scopes: HashMap<ScopeId, ScopeEntry>,
    pub(crate) next_scope: u64,
    /// Scheduled units not yet terminal, plus detached work.
    pub(crate) pending: usize,
    /// Scheduled, non-terminal children per parent.
    pub(crate) child_pending: HashMap<UnitId, usize>,
}

pub(crate) struct Inner {
    pub(crate) config: OrchestratorConfig,
    pub(crate) gate: Arc<Semaphore>,
    pub(crate) registry: Mutex<Registry>,
    pub(crate) pending_tx: watch::Sender<usize>,
    pub(crate) root: CancellationToken,
    pub(crate) telemetry: Arc<dyn TelemetrySink>,
    pub(crate) requests: Option<Arc<dyn RequestHandler>>,
    /// Milliseconds since the epoch of the last start, finish or progress
    /// update.
    pub(crate) last_activity_ms: Arc<AtomicU64>,
    /// Mirror of `Registry::pending` for the stall watchdog.
    pub(crate) pending_work: Arc<AtomicU64>,
    /// Units currently holding a slot.
    pub(crate) running: AtomicUsize,
    pub(crate) peak_running: AtomicUsize,
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Bounded, cancellable runner for [`WorkUnit`]s.
///
/// Cloning is cheap; clones share the same state. Methods that admit units
/// spawn onto the current Tokio runtime and must be called from within one.
#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self::with_parts(config, Arc::new(NullTelemetrySink), None)
    }

    pub fn with_telemetry(config: OrchestratorConfig, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self::with_parts(config, telemetry, None)
    }

    /// Creates an orchestrator with a telemetry sink and an optional
    /// handler for unit requests. Without a handler every request fails
    /// with `NotSupported`.
    pub fn with_parts(
        config: OrchestratorConfig,
        telemetry: Arc<dyn TelemetrySink>,
        requests: Option<Arc<dyn RequestHandler>>,
    ) -> Self {
        let config = OrchestratorConfig {
            max_concurrent: config.max_concurrent.max(1),
            ..config
        };
        let (pending_tx, _) = watch::channel(0usize);

        info!(
            max_concurrent = config.max_concurrent,
            interactive = requests.is_some(),
            "Orchestrator created"
        );

        Self {
            inner: Arc::new(Inner {
                gate: Arc::new(Semaphore::new(config.max_concurrent)),
                config,
                registry: Mutex::new(Registry::default()),
                pending_tx,
                root: CancellationToken::new(),
                telemetry,
                requests,
                last_activity_ms: Arc::new(AtomicU64::new(now_ms())),
                pending_work: Arc::new(AtomicU64::new(0)),
                running: AtomicUsize::new(0),
                peak_running: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.config.max_concurrent
    }

    // -------------------------------------------------------------------------
    // Submission
    // -------------------------------------------------------------------------

    /// Registers a top-level unit. Returns immediately.
    pub fn submit(
        &self,
        unit: Arc<dyn WorkUnit>,
        options: SubmitOptions,
    ) -> Result<UnitHandle, HostError> {
        let root = self.inner.root.clone();
        self.inner.register(None, &root, unit, options)
    }

    /// Schedules a unit that was submitted without `auto_start`.
    ///
    /// Returns false if it was already scheduled or is terminal.
    pub fn start(&self, id: UnitId) -> Result<bool, HostError> {
        let mut reg = self.inner.registry.lock();
        if !reg.units.contains_key(&id) {
            return Err(HostError::UnknownUnit(id));
        }
        let scheduled = self.inner.schedule(&mut reg, id);
        self.inner.admit(&mut reg);
        self.inner.publish_pending(&reg);
        Ok(scheduled)
    }

    /// Finalises every registered unit that was never scheduled with
    /// [`EndReason::NeverStarted`](super::EndReason::NeverStarted). Returns
    /// how many were discarded.
    pub fn discard_pending(&self) -> usize {
        let mut reg = self.inner.registry.lock();
        self.inner.discard_unscheduled(&mut reg)
    }

    /// Tracks background work so [`join`](Self::join) waits for it.
    pub fn track_detached<F>(&self, name: impl Into<String>, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.track_detached(name.into(), Box::pin(work));
    }

    // -------------------------------------------------------------------------
    // Waiting
    // -------------------------------------------------------------------------

    /// Waits until every scheduled unit and all detached work has finished.
    ///
    /// Units submitted while waiting extend the wait. Units registered
    /// without `auto_start` and never started do not block. Fails
    /// immediately if `external` is already cancelled, and stops waiting
    /// (without cancelling anything) if it fires later.
    pub async fn join(&self, external: &CancellationToken) -> Result<(), JoinError> {
        if external.is_cancelled() {
            return Err(JoinError::Cancelled);
        }
        let mut pending_rx = self.inner.pending_tx.subscribe();

        tokio::select! {
            biased;
            _ = external.cancelled() => Err(JoinError::Cancelled),
            idle = pending_rx.wait_for(|pending| *pending == 0) => {
                // The sender lives in `inner`, which we hold.
                drop(idle);
                Ok(())
            }
        }
    }

    // -------------------------------------------------------------------------
    // Cancellation
    // -------------------------------------------------------------------------

    /// Token every top-level unit derives from.
    pub fn root_token(&self) -> CancellationToken {
        self.inner.root.clone()
    }

    /// Cancels every unit the orchestrator owns.
    pub fn cancel_all(&self) {
        info!("Cancelling all units");
        self.inner.root.cancel();
    }

    /// Opens a top-level cancellation scope. Only top-level submissions may
    /// use it; units must open their own through their host.
    pub fn open_scope(&self) -> CancellationScope {
        let root = self.inner.root.clone();
        self.inner.open_scope(None, &root)
    }

    /// Cancels a scope. Returns false if it was already cancelled.
    pub fn cancel_scope(&self, id: ScopeId) -> Result<bool, HostError> {
        self.inner.cancel_scope(id)
    }

    /// Forgets a scope. Units already derived from it are unaffected.
    pub fn close_scope(&self, id: ScopeId) -> bool {
        self.inner.close_scope(id)
    }

    /// Number of scopes that are open.
    pub fn scope_count(&self) -> usize {
        self.inner.registry.lock().scopes.len()
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn unit(&self, id: UnitId) -> Option<Arc<dyn WorkUnit>> {
        let reg = self.inner.registry.lock();
        reg.units.get(&id).map(|entry| Arc::clone(&entry.unit))
    }

    /// Snapshot of every registered unit in submission order.
    pub fn snapshot(&self) -> Vec<UnitSnapshot> {
        let reg = self.inner.registry.lock();
        reg.units
            .iter()
            .map(|(id, entry)| {
                let core = entry.unit.core();
                UnitSnapshot {
                    id: *id,
                    parent: entry.parent,
                    name: entry.unit.name().to_string(),
                    state: core.state(),
                    scheduled: entry.scheduled,
                    hidden: core.is_hidden(),
                    joining: entry.joining,
                    progress: core.progress(),
                    description: core.description(),
                    end_reason: core.end_reason(),
                }
            })
            .collect()
    }

    /// Aggregated progress over visible units.
    pub fn progress(&self) -> AggregateProgress {
        AggregateProgress::from_snapshots(&self.snapshot())
    }

    /// Number of registered units.
    pub fn len(&self) -> usize {
        self.inner.registry.lock().units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scheduled units not yet terminal, plus detached work.
    pub fn pending_count(&self) -> usize {
        *self.inner.pending_tx.borrow()
    }

    /// Units currently holding a slot.
    pub fn running_count(&self) -> usize {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Highest number of slot holders observed so far.
    pub fn peak_running(&self) -> usize {
        self.inner.peak_running.load(Ordering::Acquire)
    }

    /// Shared counters for the stall watchdog: last activity timestamp and
    /// pending work.
    pub fn activity_counters(&self) -> (Arc<AtomicU64>, Arc<AtomicU64>) {
        (
            Arc::clone(&self.inner.last_activity_ms),
            Arc::clone(&self.inner.pending_work),
        )
    }

    pub fn is_interactive(&self) -> bool {
        self.inner.requests.is_some()
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("max_concurrent", &self.max_concurrent())
            .field("pending", &self.pending_count())
            .field("running", &self.running_count())
            .finish()
    }
}
