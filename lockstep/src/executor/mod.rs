//! Task Orchestration Core
//!
//! This module provides the unit-of-work abstraction every lockstep workflow
//! runs on, and the orchestrator that drives it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        RootHost                              │
//! │  CLI-facing host: submit, poll progress, join               │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      Orchestrator                            │
//! │  Registry, FIFO admission gate, scopes, progress            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │ UnitHost    │  │ Scopes      │  │ Telemetry           │  │
//! │  │ (per unit)  │  │ (tokens)    │  │ Sink                │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Core Concepts
//!
//! - **WorkUnit**: one async entry point, `run`, plus a composed
//!   [`UnitCore`] holding state, progress, description and the end record.
//!
//! - **HostCapability**: what a running unit may ask of its host: submit
//!   children, track detached work, raise typed requests, open and cancel
//!   scopes, and join its children.
//!
//! - **Orchestrator**: owns every unit, admits at most `max_concurrent` at a
//!   time in submission order, and submits continuations after their
//!   predecessor completes.
//!
//! - **Scopes**: cancellation tokens registered with the orchestrator.
//!   Cancelling one reaches every unit derived from it and nothing else.
//!
//! # Example
//!
//! ```ignore
//! use lockstep::executor::{Orchestrator, OrchestratorConfig, SubmitOptions};
//!
//! let orchestrator = Orchestrator::new(OrchestratorConfig::with_max_concurrent(4));
//! let handle = orchestrator.submit(Arc::new(MyUnit::new()), SubmitOptions::default())?;
//!
//! orchestrator.join(&CancellationToken::new()).await?;
//! assert_eq!(handle.end_reason(), Some(EndReason::Completed));
//! ```

mod config;
mod context;
mod core;
mod error;
mod handle;
mod handoff;
mod host;
mod lifecycle;
mod progress;
mod scope;
mod signals;
mod telemetry;
mod unit;
mod watchdog;

pub use config::{
    default_max_concurrent, OrchestratorConfig, DEFAULT_POLL_INTERVAL_MS, DEFAULT_RESERVED_CORES,
    FALLBACK_CPU_COUNT,
};
pub use context::UnitHost;
pub use self::core::Orchestrator;
pub use error::{HostError, JoinError, UnitError};
pub use handle::UnitHandle;
pub use handoff::{handoff, HandoffReceiver, HandoffSender};
pub use host::{
    downcast_request, respond, AnyPayload, HostCapability, HostCapabilityExt, HostRequest,
    RequestContext, RequestHandler, SubmitOptions,
};
pub use progress::{AggregateProgress, UnitSnapshot};
pub use scope::{CancellationScope, ScopeId};
pub use signals::{FoundLatch, Signal, SignalReceiver, Stopwatch};
pub use telemetry::{
    MultiplexTelemetrySink, NullTelemetrySink, OrchestratorEvent, TelemetrySink,
    TracingTelemetrySink,
};
pub use unit::{
    checkpoint, EndReason, EndRecord, Progress, StatusHandle, UnitCore, UnitFuture, UnitId,
    UnitState, WorkUnit,
};
pub use watchdog::{Health, StallWatchdog, STALL_DETECTION_THRESHOLD_MS, STALL_WATCHDOG_INTERVAL_SECS};
