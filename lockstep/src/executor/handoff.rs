//! Typed hand-off between a predecessor and its continuation.
//!
//! The predecessor publishes its value before reporting success; the
//! continuation reads it once it runs. Since a continuation is only
//! submitted after its predecessor completes, a missing value means the
//! predecessor broke its contract.

use std::fmt;
use std::sync::{Arc, OnceLock};

use super::error::UnitError;

/// Creates a connected sender/receiver pair.
pub fn handoff<T>(name: &'static str) -> (HandoffSender<T>, HandoffReceiver<T>) {
    let slot = Arc::new(OnceLock::new());
    (
        HandoffSender {
            name,
            slot: Arc::clone(&slot),
        },
        HandoffReceiver { name, slot },
    )
}

/// Publishing side, held by the predecessor.
pub struct HandoffSender<T> {
    name: &'static str,
    slot: Arc<OnceLock<T>>,
}

impl<T> HandoffSender<T> {
    /// Publishes the value. Returns it back if one was already published.
    pub fn publish(&self, value: T) -> Result<(), T> {
        self.slot.set(value)
    }

    pub fn is_published(&self) -> bool {
        self.slot.get().is_some()
    }

    /// A receiver reading from the same slot.
    pub fn receiver(&self) -> HandoffReceiver<T> {
        HandoffReceiver {
            name: self.name,
            slot: Arc::clone(&self.slot),
        }
    }
}

/// Reading side, held by the continuation or the caller.
pub struct HandoffReceiver<T> {
    name: &'static str,
    slot: Arc<OnceLock<T>>,
}

impl<T> HandoffReceiver<T> {
    pub fn get(&self) -> Option<&T> {
        self.slot.get()
    }

    /// Returns the value or [`UnitError::MissingHandoff`].
    pub fn require(&self) -> Result<&T, UnitError> {
        self.slot.get().ok_or(UnitError::MissingHandoff(self.name))
    }
}

impl<T> Clone for HandoffReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> fmt::Debug for HandoffReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandoffReceiver")
            .field("name", &self.name)
            .field("published", &self.slot.get().is_some())
            .finish()
    }
}
