//! Telemetry for orchestrator observability.
//!
//! The orchestrator emits structured events to a sink and does not care how
//! they are consumed. Logging, UI updates and test assertions are all just
//! sinks.
//!
//! # Example
//!
//! ```ignore
//! use lockstep::executor::{OrchestratorEvent, TelemetrySink};
//!
//! struct CountingSink(AtomicUsize);
//!
//! impl TelemetrySink for CountingSink {
//!     fn emit(&self, _event: OrchestratorEvent) {
//!         self.0.fetch_add(1, Ordering::Relaxed);
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use super::scope::ScopeId;
use super::unit::{EndReason, UnitId};

// =============================================================================
// Events
// =============================================================================

/// Events emitted by the orchestrator.
#[derive(Clone, Debug)]
pub enum OrchestratorEvent {
    // -------------------------------------------------------------------------
    // Unit lifecycle
    // -------------------------------------------------------------------------
    UnitSubmitted {
        unit_id: UnitId,
        name: String,
        parent: Option<UnitId>,
        auto_start: bool,
    },

    /// A unit was admitted and its `run` started.
    UnitStarted { unit_id: UnitId, queue_wait: Duration },

    UnitFinished {
        unit_id: UnitId,
        reason: EndReason,
        duration: Duration,
    },

    // -------------------------------------------------------------------------
    // Scopes
    // -------------------------------------------------------------------------
    ScopeOpened { scope_id: ScopeId },

    ScopeCancelled { scope_id: ScopeId },

    /// The scope was forgotten, either explicitly or because its owner
    /// finished.
    ScopeClosed { scope_id: ScopeId },

    // -------------------------------------------------------------------------
    // Continuations
    // -------------------------------------------------------------------------
    ContinuationSubmitted {
        predecessor: UnitId,
        unit_id: UnitId,
    },

    /// The predecessor did not complete, so its continuation never runs.
    ContinuationDropped {
        predecessor: UnitId,
        name: String,
        predecessor_reason: EndReason,
    },

    // -------------------------------------------------------------------------
    // Detached work
    // -------------------------------------------------------------------------
    DetachedTracked { name: String },

    DetachedFinished { name: String, duration: Duration },
}

impl OrchestratorEvent {
    /// Returns the unit this event concerns, if any.
    pub fn unit_id(&self) -> Option<UnitId> {
        match self {
            Self::UnitSubmitted { unit_id, .. }
            | Self::UnitStarted { unit_id, .. }
            | Self::UnitFinished { unit_id, .. }
            | Self::ContinuationSubmitted { unit_id, .. } => Some(*unit_id),
            Self::ContinuationDropped { predecessor, .. } => Some(*predecessor),
            Self::ScopeOpened { .. }
            | Self::ScopeCancelled { .. }
            | Self::ScopeClosed { .. }
            | Self::DetachedTracked { .. }
            | Self::DetachedFinished { .. } => None,
        }
    }

    /// Returns a short name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::UnitSubmitted { .. } => "unit_submitted",
            Self::UnitStarted { .. } => "unit_started",
            Self::UnitFinished { .. } => "unit_finished",
            Self::ScopeOpened { .. } => "scope_opened",
            Self::ScopeCancelled { .. } => "scope_cancelled",
            Self::ScopeClosed { .. } => "scope_closed",
            Self::ContinuationSubmitted { .. } => "continuation_submitted",
            Self::ContinuationDropped { .. } => "continuation_dropped",
            Self::DetachedTracked { .. } => "detached_tracked",
            Self::DetachedFinished { .. } => "detached_finished",
        }
    }
}

// =============================================================================
// Sink Trait
// =============================================================================

/// Sink for orchestrator events.
///
/// Events are emitted while the orchestrator holds its registry lock, so
/// implementations must be fast and must not call back into the
/// orchestrator.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: OrchestratorEvent);
}

// =============================================================================
// Built-in Sinks
// =============================================================================

/// No-op sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTelemetrySink;

impl TelemetrySink for NullTelemetrySink {
    fn emit(&self, _event: OrchestratorEvent) {}
}

/// Sink that logs events using `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn emit(&self, event: OrchestratorEvent) {
        match &event {
            OrchestratorEvent::UnitSubmitted {
                unit_id,
                name,
                parent,
                auto_start,
            } => {
                tracing::debug!(
                    unit_id = %unit_id,
                    name = %name,
                    parent = ?parent,
                    auto_start = auto_start,
                    "Unit submitted"
                );
            }
            OrchestratorEvent::UnitStarted {
                unit_id,
                queue_wait,
            } => {
                tracing::debug!(
                    unit_id = %unit_id,
                    queue_wait_ms = queue_wait.as_millis(),
                    "Unit started"
                );
            }
            OrchestratorEvent::UnitFinished {
                unit_id,
                reason,
                duration,
            } => {
                tracing::debug!(
                    unit_id = %unit_id,
                    reason = %reason,
                    duration_ms = duration.as_millis(),
                    "Unit finished"
                );
            }
            OrchestratorEvent::ScopeOpened { scope_id } => {
                tracing::trace!(scope_id = %scope_id, "Scope opened");
            }
            OrchestratorEvent::ScopeCancelled { scope_id } => {
                tracing::debug!(scope_id = %scope_id, "Scope cancelled");
            }
            OrchestratorEvent::ScopeClosed { scope_id } => {
                tracing::trace!(scope_id = %scope_id, "Scope closed");
            }
            OrchestratorEvent::ContinuationSubmitted {
                predecessor,
                unit_id,
            } => {
                tracing::debug!(
                    predecessor = %predecessor,
                    unit_id = %unit_id,
                    "Continuation submitted"
                );
            }
            OrchestratorEvent::ContinuationDropped {
                predecessor,
                name,
                predecessor_reason,
            } => {
                tracing::info!(
                    predecessor = %predecessor,
                    continuation = %name,
                    predecessor_reason = %predecessor_reason,
                    "Continuation dropped"
                );
            }
            OrchestratorEvent::DetachedTracked { name } => {
                tracing::trace!(name = %name, "Detached work tracked");
            }
            OrchestratorEvent::DetachedFinished { name, duration } => {
                tracing::trace!(
                    name = %name,
                    duration_ms = duration.as_millis(),
                    "Detached work finished"
                );
            }
        }
    }
}

/// Sink that forwards events to multiple sinks.
pub struct MultiplexTelemetrySink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl MultiplexTelemetrySink {
    pub fn new(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self { sinks }
    }
}

impl TelemetrySink for MultiplexTelemetrySink {
    fn emit(&self, event: OrchestratorEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}
