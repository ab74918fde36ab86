//! Host capability contract.
//!
//! A running unit sees the orchestrator only through [`HostCapability`]. The
//! host lets it submit children, track detached background work, ask typed
//! questions of whoever is driving the run, open and cancel scopes, and wait
//! for its own children.
//!
//! Request/response support is optional: batch hosts answer every request
//! with [`HostError::NotSupported`] and callers are expected to handle it.
//!
//! # Example
//!
//! ```ignore
//! struct AskName;
//!
//! impl HostRequest for AskName {
//!     type Response = String;
//!     const NAME: &'static str = "ask-name";
//! }
//!
//! match host.request(AskName).await {
//!     Ok(name) => greet(&name),
//!     Err(e) if e.is_not_supported() => greet("stranger"),
//!     Err(e) => return Err(e.into()),
//! }
//! ```

use std::any::Any;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use super::error::HostError;
use super::handle::UnitHandle;
use super::scope::CancellationScope;
use super::unit::{UnitId, WorkUnit};

/// Type-erased request payload or response.
pub type AnyPayload = Box<dyn Any + Send>;

/// Options controlling how a submitted unit is scheduled.
#[derive(Clone, Debug)]
pub struct SubmitOptions {
    /// Drop the unit from the orchestrator once it is terminal.
    pub auto_remove: bool,
    /// Queue the unit for admission immediately. Otherwise it waits for
    /// [`Orchestrator::start`](super::Orchestrator::start).
    pub auto_start: bool,
    /// Scope the unit's cancellation token derives from. Defaults to the
    /// submitter's token. The scope must have been opened by the same
    /// submitter, otherwise submission fails with `ForeignScope`.
    pub scope: Option<CancellationScope>,
}

impl SubmitOptions {
    pub fn new(auto_remove: bool, auto_start: bool) -> Self {
        Self {
            auto_remove,
            auto_start,
            scope: None,
        }
    }

    /// Auto-started and removed once terminal.
    pub fn transient() -> Self {
        Self::new(true, true)
    }

    /// Registered but not started.
    pub fn manual() -> Self {
        Self::new(false, false)
    }

    pub fn in_scope(mut self, scope: CancellationScope) -> Self {
        self.scope = Some(scope);
        self
    }
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self::new(false, true)
    }
}

/// A typed request raised by a unit.
pub trait HostRequest: Send + 'static {
    type Response: Send + 'static;

    /// Stable name used for logging and error messages.
    const NAME: &'static str;
}

/// Identifies who raised a request.
#[derive(Clone, Debug)]
pub struct RequestContext {
    /// `None` when the request comes from the root host itself.
    pub from: Option<UnitId>,
    pub unit_name: String,
    pub request: &'static str,
}

/// Answers requests raised by units. Installed on an orchestrator by
/// interactive front ends.
pub trait RequestHandler: Send + Sync {
    fn handle(
        &self,
        context: RequestContext,
        payload: AnyPayload,
    ) -> BoxFuture<'_, Result<AnyPayload, HostError>>;
}

/// Capabilities a host offers to running units.
pub trait HostCapability: Send + Sync {
    /// Registers a child with the owning orchestrator. Returns immediately.
    fn submit_child(
        &self,
        unit: Arc<dyn WorkUnit>,
        options: SubmitOptions,
    ) -> Result<UnitHandle, HostError>;

    /// Tracks background work so `join` waits for it.
    fn track_detached(&self, name: &str, work: BoxFuture<'static, ()>) -> Result<(), HostError>;

    /// Raw request entry point. Prefer [`HostCapabilityExt::request`].
    fn request_raw(
        &self,
        request: &'static str,
        payload: AnyPayload,
    ) -> BoxFuture<'_, Result<AnyPayload, HostError>> {
        let _ = (request, payload);
        Box::pin(async { Err(HostError::not_supported("request")) })
    }

    /// The cancellation token in force for the caller's subtree.
    fn cancellation_handle(&self) -> CancellationToken;

    /// Opens a cancellation scope nested under the caller's token.
    fn open_scope(&self) -> Result<CancellationScope, HostError>;

    /// Cancels every unit in `scope`. Returns false if it was already
    /// cancelled.
    fn cancel_scope(&self, scope: &CancellationScope) -> Result<bool, HostError>;

    /// Forgets `scope` once nothing more will be submitted into it. Units
    /// already in the scope keep running. Returns false if it was already
    /// closed. Scopes still open when their owner finishes are closed
    /// automatically.
    fn close_scope(&self, scope: &CancellationScope) -> Result<bool, HostError>;

    /// Waits until every child submitted through this host is terminal.
    ///
    /// The caller's concurrency slot is released while waiting, so children
    /// can run even with a single slot. The returned future must be polled
    /// to completion.
    fn join_children(&self) -> BoxFuture<'_, Result<(), HostError>>;
}

/// Typed helpers over [`HostCapability`].
pub trait HostCapabilityExt: HostCapability {
    /// Raises a typed request and downcasts the response.
    fn request<R: HostRequest>(&self, request: R) -> BoxFuture<'_, Result<R::Response, HostError>> {
        Box::pin(async move {
            let response = self.request_raw(R::NAME, Box::new(request)).await?;
            response
                .downcast::<R::Response>()
                .map(|boxed| *boxed)
                .map_err(|_| HostError::ResponseType { request: R::NAME })
        })
    }
}

impl<H: HostCapability + ?Sized> HostCapabilityExt for H {}

/// Downcasts a request payload inside a [`RequestHandler`].
pub fn downcast_request<R: HostRequest>(payload: AnyPayload) -> Result<R, AnyPayload> {
    payload.downcast::<R>().map(|boxed| *boxed)
}

/// Boxes a typed response inside a [`RequestHandler`].
pub fn respond<R: HostRequest>(response: R::Response) -> AnyPayload {
    Box::new(response)
}
