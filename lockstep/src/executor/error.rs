//! Error types for the executor.

use std::error::Error as StdError;

use thiserror::Error;

use super::scope::ScopeId;
use super::unit::UnitId;

/// Outcome errors returned from [`WorkUnit::run`](super::WorkUnit::run).
///
/// Cancellation is carried as a variant so `?` works at checkpoints, but the
/// orchestrator records it as [`EndReason::Canceled`](super::EndReason) with
/// no error payload.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("cancelled")]
    Cancelled,

    /// `run` returned `Ok(false)` without being cancelled.
    #[error("unit reported failure")]
    Unsuccessful,

    #[error("unit panicked: {0}")]
    Panicked(String),

    /// A predecessor did not publish the value this unit depends on.
    #[error("missing hand-off value: {0}")]
    MissingHandoff(&'static str),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Domain error raised by a concrete job.
    #[error(transparent)]
    Job(Box<dyn StdError + Send + Sync + 'static>),
}

impl UnitError {
    /// Wraps a domain error.
    pub fn job<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Job(Box::new(error))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the wrapped domain error if it has type `E`.
    pub fn downcast_job<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        match self {
            Self::Job(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// Errors from [`HostCapability`](super::HostCapability) operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    /// The host does not provide this capability, e.g. interactive requests
    /// on a batch host.
    #[error("{operation} is not supported by this host")]
    NotSupported { operation: &'static str },

    #[error("orchestrator has shut down")]
    Closed,

    #[error("unit has already been submitted")]
    AlreadySubmitted,

    #[error("unknown unit {0}")]
    UnknownUnit(UnitId),

    #[error("unknown cancellation scope {0}")]
    UnknownScope(ScopeId),

    /// The scope was opened by a different submitter. Units may only be
    /// submitted into scopes nested under the submitter's own token.
    #[error("cancellation scope {0} belongs to another submitter")]
    ForeignScope(ScopeId),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("unexpected response type for request '{request}'")]
    ResponseType { request: &'static str },
}

impl HostError {
    pub fn not_supported(operation: &'static str) -> Self {
        Self::NotSupported { operation }
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported { .. })
    }
}

/// Errors from [`Orchestrator::join`](super::Orchestrator::join).
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum JoinError {
    /// The external cancellation signal fired before every unit finished.
    #[error("join was cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("domain failure")]
    struct DomainFailure;

    #[test]
    fn test_downcast_job() {
        let err = UnitError::job(DomainFailure);
        assert!(err.downcast_job::<DomainFailure>().is_some());
        assert!(err.downcast_job::<std::io::Error>().is_none());
        assert_eq!(err.to_string(), "domain failure");
    }

    #[test]
    fn test_host_error_converts() {
        let err: UnitError = HostError::not_supported("request").into();
        assert!(matches!(
            err,
            UnitError::Host(HostError::NotSupported { operation: "request" })
        ));
        assert_eq!(err.to_string(), "request is not supported by this host");
    }
}
