//! Cancellation scopes.
//!
//! A scope is a named cancellation token registered with the orchestrator.
//! Units submitted into a scope derive their token from it, so cancelling
//! the scope reaches every unit in the subtree and nothing outside it.

use std::fmt;

use tokio_util::sync::CancellationToken;

/// Identifier of a registered cancellation scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub(crate) u64);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

/// Handle to a cancellation scope.
#[derive(Clone, Debug)]
pub struct CancellationScope {
    id: ScopeId,
    token: CancellationToken,
}

impl CancellationScope {
    pub(crate) fn new(id: ScopeId, token: CancellationToken) -> Self {
        Self { id, token }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// The token every unit in this scope derives from.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
