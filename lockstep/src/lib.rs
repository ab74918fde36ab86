//! lockstep - brute-force estimates, keystores and wordlists on a small
//! task-orchestration core.
//!
//! Every workflow is a tree of [`executor::WorkUnit`]s driven by an
//! [`executor::Orchestrator`]:
//!
//! - [`executor`]: units, hosts, the orchestrator and its scopes
//! - [`runtime`]: the root host the CLI drives
//! - [`jobs`]: the concrete workflows
//! - [`digest`], [`keystore`], [`wordlist`]: collaborator boundaries
//!
//! # Example
//!
//! ```ignore
//! use lockstep::executor::{Orchestrator, OrchestratorConfig};
//! use lockstep::jobs::{CrackEstimateJob, KeySource};
//! use lockstep::runtime::{RootHost, TracingProgressReporter};
//!
//! let root = RootHost::new(Orchestrator::new(OrchestratorConfig::default()));
//! let job = Arc::new(CrackEstimateJob::new(KeySource::Fixed(1)));
//! let estimate = job.output();
//! root.launch(job)?;
//! root.run(&CancellationToken::new(), &TracingProgressReporter).await?;
//! println!("{}", estimate.require()?);
//! ```

pub mod config;
pub mod digest;
pub mod executor;
pub mod jobs;
pub mod keystore;
pub mod logging;
pub mod runtime;
pub mod wordlist;

/// Version of the lockstep library and CLI.
///
/// Synchronized across the workspace and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
