//! Runtime components for driving a lockstep session.
//!
//! The CLI process owns one [`RootHost`], which owns one
//! [`Orchestrator`](crate::executor::Orchestrator). The host submits the
//! top-level unit of a command, reports aggregated progress on a fixed
//! interval and returns once the orchestrator is idle.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 CLI command                   │
//! │                     │                         │
//! │                     ▼                         │
//! │  ┌──────────────────────────────────────┐    │
//! │  │ RootHost                              │    │
//! │  │  • launch(unit)                       │    │
//! │  │  • run(cancel, reporter) ── poll ──►  │ ProgressReporter
//! │  │  • stall watchdog                     │    │
//! │  └──────────────────┬───────────────────┘    │
//! │                     ▼                         │
//! │               Orchestrator                    │
//! └──────────────────────────────────────────────┘
//! ```

mod reporter;
mod root;

pub use reporter::{ProgressReporter, TracingProgressReporter};
pub use root::RootHost;
