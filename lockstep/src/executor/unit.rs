//! Work unit abstraction.
//!
//! A [`WorkUnit`] is the single polymorphic entry point the orchestrator
//! drives. Every unit composes a [`UnitCore`] that owns the bookkeeping the
//! orchestrator and the UI read: lifecycle state, progress, description, the
//! terminal outcome and an optional continuation.
//!
//! # Example
//!
//! ```ignore
//! use lockstep::executor::{checkpoint, HostCapability, UnitCore, UnitError, UnitFuture, WorkUnit};
//!
//! struct CountTo { core: UnitCore, limit: u32 }
//!
//! impl WorkUnit for CountTo {
//!     fn name(&self) -> &str { "CountTo" }
//!     fn core(&self) -> &UnitCore { &self.core }
//!
//!     fn run<'a>(&'a self, _host: &'a dyn HostCapability, cancel: CancellationToken) -> UnitFuture<'a> {
//!         Box::pin(async move {
//!             for i in 0..self.limit {
//!                 checkpoint(&cancel)?;
//!                 self.core.set_progress(Progress::fraction(i as u64, self.limit as u64));
//!             }
//!             Ok(true)
//!         })
//!     }
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::core::now_ms;
use super::error::UnitError;
use super::host::HostCapability;

// =============================================================================
// Identity
// =============================================================================

static UNIT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifier assigned to a unit when it is submitted.
///
/// Identifiers are allocated from a process-wide monotonic counter, so
/// ordering by id is ordering by submission.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(u64);

impl UnitId {
    pub(crate) fn next() -> Self {
        Self(UNIT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit-{}", self.0)
    }
}

impl fmt::Debug for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnitId({})", self.0)
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Lifecycle state of a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnitState {
    /// Registered but not yet running.
    Created,
    /// `run` is executing.
    Running,
    /// Finished and declared success.
    Completed,
    /// Finished with an error.
    Failed,
    /// Observed cancellation, or was never started.
    Canceled,
}

impl UnitState {
    /// Returns true once the unit can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// Why a unit reached its terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EndReason {
    Completed,
    Canceled,
    Failed,
    /// The unit was discarded before it was ever admitted, e.g. a
    /// continuation whose predecessor did not complete.
    NeverStarted,
}

impl EndReason {
    /// The terminal state this reason maps to.
    pub fn state(&self) -> UnitState {
        match self {
            Self::Completed => UnitState::Completed,
            Self::Failed => UnitState::Failed,
            Self::Canceled | Self::NeverStarted => UnitState::Canceled,
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
            Self::NeverStarted => "never started",
        };
        f.write_str(s)
    }
}

/// Terminal outcome recorded exactly once per unit.
#[derive(Clone, Debug)]
pub struct EndRecord {
    pub reason: EndReason,
    /// Present only when `reason` is [`EndReason::Failed`].
    pub error: Option<Arc<UnitError>>,
}

// =============================================================================
// Progress
// =============================================================================

/// Progress reported by a unit.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Progress {
    #[default]
    Indeterminate,
    /// Percentage in `[0, 100]`.
    Percent(f64),
}

impl Progress {
    /// Creates a percentage, clamped into range. NaN becomes indeterminate.
    pub fn percent(value: f64) -> Self {
        if value.is_nan() {
            Self::Indeterminate
        } else {
            Self::Percent(value.clamp(0.0, 100.0))
        }
    }

    /// Progress of `done` out of `total`; indeterminate when `total` is zero.
    pub fn fraction(done: u64, total: u64) -> Self {
        if total == 0 {
            Self::Indeterminate
        } else {
            Self::percent(done as f64 * 100.0 / total as f64)
        }
    }

    pub fn as_percent(&self) -> Option<f64> {
        match self {
            Self::Indeterminate => None,
            Self::Percent(p) => Some(*p),
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Indeterminate => f.write_str("--"),
            Self::Percent(p) => write!(f, "{:.1}%", p),
        }
    }
}

/// Progress and description cell shared between a unit and any blocking
/// workers it hands off to.
#[derive(Debug, Default)]
struct StatusCell {
    progress: Mutex<Progress>,
    description: Mutex<String>,
    /// Orchestrator activity clock, attached when the unit is launched.
    activity: OnceLock<Arc<AtomicU64>>,
}

impl StatusCell {
    fn set_progress(&self, progress: Progress) {
        *self.progress.lock() = progress;
        self.touch();
    }

    fn set_description(&self, description: String) {
        *self.description.lock() = description;
        self.touch();
    }

    fn touch(&self) {
        if let Some(clock) = self.activity.get() {
            clock.store(now_ms(), Ordering::Relaxed);
        }
    }
}

/// Cloneable writer for a unit's progress and description.
///
/// Obtained from [`UnitCore::status_handle`] so work moved onto the blocking
/// pool can keep reporting without borrowing the unit.
#[derive(Clone, Debug)]
pub struct StatusHandle {
    cell: Arc<StatusCell>,
}

impl StatusHandle {
    pub fn set_progress(&self, progress: Progress) {
        self.cell.set_progress(progress);
    }

    pub fn set_description(&self, description: impl Into<String>) {
        self.cell.set_description(description.into());
    }
}

// =============================================================================
// Unit Core
// =============================================================================

/// Bookkeeping shared by every [`WorkUnit`] implementation.
pub struct UnitCore {
    hidden: bool,
    submitted: AtomicBool,
    state_tx: watch::Sender<UnitState>,
    status: Arc<StatusCell>,
    end: OnceLock<EndRecord>,
    continuation: Mutex<Option<Arc<dyn WorkUnit>>>,
}

impl UnitCore {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(UnitState::Created);
        Self {
            hidden: false,
            submitted: AtomicBool::new(false),
            state_tx,
            status: Arc::new(StatusCell::default()),
            end: OnceLock::new(),
            continuation: Mutex::new(None),
        }
    }

    /// Marks the unit as hidden from progress aggregation. Hidden units are
    /// still waited for by `join`.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Attaches a continuation that is submitted only after this unit
    /// completes.
    pub fn with_continuation(self, next: Arc<dyn WorkUnit>) -> Self {
        *self.continuation.lock() = Some(next);
        self
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Current lifecycle state.
    ///
    /// Derived from the end record once it exists, so a terminal state is
    /// never observed without its end reason.
    pub fn state(&self) -> UnitState {
        match self.end.get() {
            Some(end) => end.reason.state(),
            None => *self.state_tx.borrow(),
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<UnitState> {
        self.state_tx.subscribe()
    }

    pub fn progress(&self) -> Progress {
        *self.status.progress.lock()
    }

    /// Updates progress. Counts as activity for the stall watchdog.
    pub fn set_progress(&self, progress: Progress) {
        self.status.set_progress(progress);
    }

    pub fn description(&self) -> String {
        self.status.description.lock().clone()
    }

    pub fn set_description(&self, description: impl Into<String>) {
        self.status.set_description(description.into());
    }

    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle {
            cell: Arc::clone(&self.status),
        }
    }

    pub fn end_record(&self) -> Option<&EndRecord> {
        self.end.get()
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end.get().map(|end| end.reason)
    }

    pub fn last_error(&self) -> Option<Arc<UnitError>> {
        self.end.get().and_then(|end| end.error.clone())
    }

    pub fn has_continuation(&self) -> bool {
        self.continuation.lock().is_some()
    }

    /// Claims the unit for a single submission.
    pub(crate) fn claim_submission(&self) -> bool {
        !self.submitted.swap(true, Ordering::AcqRel)
    }

    /// Moves `Created -> Running`. Returns false if the unit already left
    /// `Created`.
    pub(crate) fn mark_running(&self) -> bool {
        if self.end.get().is_some() {
            return false;
        }
        self.state_tx.send_if_modified(|state| {
            if *state == UnitState::Created {
                *state = UnitState::Running;
                true
            } else {
                false
            }
        })
    }

    /// Records the terminal outcome. The first call wins; later calls return
    /// false and change nothing.
    pub(crate) fn finish(&self, reason: EndReason, error: Option<Arc<UnitError>>) -> bool {
        let error = if reason == EndReason::Failed {
            error
        } else {
            None
        };
        if self.end.set(EndRecord { reason, error }).is_err() {
            return false;
        }
        self.state_tx.send_replace(reason.state());
        true
    }

    pub(crate) fn take_continuation(&self) -> Option<Arc<dyn WorkUnit>> {
        self.continuation.lock().take()
    }

    /// Routes progress updates to the orchestrator's activity clock. Only
    /// the first clock attached is kept.
    pub(crate) fn attach_activity(&self, clock: Arc<AtomicU64>) {
        let _ = self.status.activity.set(clock);
    }
}

impl Default for UnitCore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UnitCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitCore")
            .field("state", &self.state())
            .field("hidden", &self.hidden)
            .field("progress", &self.progress())
            .field("end", &self.end.get().map(|e| e.reason))
            .finish()
    }
}

// =============================================================================
// Work Unit Trait
// =============================================================================

/// Boxed future returned by [`WorkUnit::run`].
pub type UnitFuture<'a> = Pin<Box<dyn Future<Output = Result<bool, UnitError>> + Send + 'a>>;

/// A unit of work driven by the orchestrator.
///
/// `run` is invoked exactly once. Returning `Ok(true)` completes the unit.
/// Returning `Ok(false)` or `Err(UnitError::Cancelled)` after the token has
/// been cancelled marks it canceled; any other error fails it.
pub trait WorkUnit: Send + Sync + 'static {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// The composed bookkeeping helper.
    fn core(&self) -> &UnitCore;

    /// Executes the unit.
    fn run<'a>(&'a self, host: &'a dyn HostCapability, cancel: CancellationToken) -> UnitFuture<'a>;

    fn state(&self) -> UnitState {
        self.core().state()
    }

    fn progress(&self) -> Progress {
        self.core().progress()
    }

    fn description(&self) -> String {
        self.core().description()
    }

    fn is_hidden(&self) -> bool {
        self.core().is_hidden()
    }

    fn end_reason(&self) -> Option<EndReason> {
        self.core().end_reason()
    }

    fn last_error(&self) -> Option<Arc<UnitError>> {
        self.core().last_error()
    }
}

/// Returns `Err(UnitError::Cancelled)` once `cancel` has fired.
pub fn checkpoint(cancel: &CancellationToken) -> Result<(), UnitError> {
    if cancel.is_cancelled() {
        Err(UnitError::Cancelled)
    } else {
        Ok(())
    }
}

/// Maps the value returned by `run` to a terminal outcome.
pub(crate) fn classify(
    result: Result<bool, UnitError>,
    cancelled: bool,
) -> (EndReason, Option<UnitError>) {
    match result {
        Ok(true) => (EndReason::Completed, None),
        Ok(false) if cancelled => (EndReason::Canceled, None),
        Ok(false) => (EndReason::Failed, Some(UnitError::Unsuccessful)),
        Err(UnitError::Cancelled) => (EndReason::Canceled, None),
        Err(e) => (EndReason::Failed, Some(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_ids_are_monotonic() {
        let a = UnitId::next();
        let b = UnitId::next();
        assert!(a < b);
        assert!(a.to_string().starts_with("unit-"));
    }

    #[test]
    fn test_progress_clamps() {
        assert_eq!(Progress::percent(150.0), Progress::Percent(100.0));
        assert_eq!(Progress::percent(-1.0), Progress::Percent(0.0));
        assert_eq!(Progress::percent(f64::NAN), Progress::Indeterminate);
        assert_eq!(Progress::fraction(1, 4), Progress::Percent(25.0));
        assert_eq!(Progress::fraction(1, 0), Progress::Indeterminate);
    }

    #[test]
    fn test_end_reason_set_once() {
        let core = UnitCore::new();
        assert_eq!(core.state(), UnitState::Created);
        assert!(core.end_reason().is_none());

        assert!(core.mark_running());
        assert!(!core.mark_running());
        assert_eq!(core.state(), UnitState::Running);

        assert!(core.finish(EndReason::Failed, Some(Arc::new(UnitError::Unsuccessful))));
        assert!(!core.finish(EndReason::Completed, None));

        assert_eq!(core.state(), UnitState::Failed);
        assert_eq!(core.end_reason(), Some(EndReason::Failed));
        assert!(core.last_error().is_some());
    }

    #[test]
    fn test_error_dropped_unless_failed() {
        let core = UnitCore::new();
        core.finish(EndReason::Canceled, Some(Arc::new(UnitError::Unsuccessful)));
        assert!(core.last_error().is_none());
        assert_eq!(core.state(), UnitState::Canceled);
    }

    #[test]
    fn test_never_started_maps_to_canceled() {
        let core = UnitCore::new();
        core.finish(EndReason::NeverStarted, None);
        assert_eq!(core.state(), UnitState::Canceled);
        assert!(!core.mark_running());
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(Ok(true), true).0, EndReason::Completed);
        assert_eq!(classify(Ok(false), true).0, EndReason::Canceled);
        assert_eq!(classify(Ok(false), false).0, EndReason::Failed);
        assert_eq!(classify(Err(UnitError::Cancelled), false).0, EndReason::Canceled);
        assert_eq!(
            classify(Err(UnitError::Panicked("boom".into())), true).0,
            EndReason::Failed
        );
    }

    #[test]
    fn test_status_handle_writes_through() {
        let core = UnitCore::new();
        let handle = core.status_handle();
        handle.set_progress(Progress::percent(42.0));
        handle.set_description("scanning");
        assert_eq!(core.progress(), Progress::Percent(42.0));
        assert_eq!(core.description(), "scanning");
    }

    #[test]
    fn test_progress_updates_record_activity() {
        let core = UnitCore::new();
        let clock = Arc::new(AtomicU64::new(0));

        // Nothing to record before launch.
        core.set_progress(Progress::percent(1.0));
        assert_eq!(clock.load(Ordering::Relaxed), 0);

        core.attach_activity(Arc::clone(&clock));
        core.status_handle().set_progress(Progress::percent(5.0));
        let first = clock.load(Ordering::Relaxed);
        assert!(first > 0);

        clock.store(0, Ordering::Relaxed);
        core.set_description("downloading");
        assert!(clock.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn test_checkpoint() {
        let token = CancellationToken::new();
        assert!(checkpoint(&token).is_ok());
        token.cancel();
        assert!(matches!(checkpoint(&token), Err(UnitError::Cancelled)));
    }
}
