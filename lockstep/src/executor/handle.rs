//! Unit handle for status queries and cancellation.
//!
//! A [`UnitHandle`] is returned whenever a unit is submitted. It can be
//! cloned freely; all clones observe the same unit.
//!
//! # Example
//!
//! ```ignore
//! let mut handle = orchestrator.submit(unit, SubmitOptions::default())?;
//!
//! if handle.state() == UnitState::Running {
//!     println!("{} is running", handle.id());
//! }
//!
//! let record = handle.wait().await;
//! ```

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::error::UnitError;
use super::unit::{EndReason, EndRecord, UnitId, UnitState, WorkUnit};

/// Handle to a submitted unit.
#[derive(Clone)]
pub struct UnitHandle {
    id: UnitId,
    unit: Arc<dyn WorkUnit>,
    state_rx: watch::Receiver<UnitState>,
    cancel: CancellationToken,
}

impl UnitHandle {
    pub(crate) fn new(id: UnitId, unit: Arc<dyn WorkUnit>, cancel: CancellationToken) -> Self {
        let state_rx = unit.core().subscribe_state();
        Self {
            id,
            unit,
            state_rx,
            cancel,
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.unit.name()
    }

    pub fn unit(&self) -> &Arc<dyn WorkUnit> {
        &self.unit
    }

    pub fn state(&self) -> UnitState {
        self.unit.state()
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.unit.end_reason()
    }

    pub fn last_error(&self) -> Option<Arc<UnitError>> {
        self.unit.last_error()
    }

    /// The token the unit observes. Cancelling it affects this unit and its
    /// descendants only.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Requests cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits until the unit is terminal and returns its end record.
    ///
    /// A unit that is never started (and never discarded) keeps this future
    /// pending.
    pub async fn wait(&mut self) -> EndRecord {
        loop {
            let _ = self.state_rx.borrow_and_update();
            if let Some(record) = self.unit.core().end_record() {
                return record.clone();
            }
            if self.state_rx.changed().await.is_err() {
                // The unit owns the sender, and we hold the unit.
                return self.unit.core().end_record().cloned().unwrap_or(EndRecord {
                    reason: EndReason::NeverStarted,
                    error: None,
                });
            }
        }
    }
}

impl fmt::Debug for UnitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitHandle")
            .field("id", &self.id)
            .field("name", &self.unit.name())
            .field("state", &self.state())
            .finish()
    }
}
