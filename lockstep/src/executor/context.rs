//! Per-unit host.
//!
//! Every running unit receives a [`UnitHost`] as its [`HostCapability`]. The
//! host holds only a weak reference to the orchestrator, so a unit can never
//! keep its owner alive, and carries the unit's own cancellation token so
//! children and scopes nest under it.

use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::core::Inner;
use super::error::HostError;
use super::handle::UnitHandle;
use super::host::{AnyPayload, HostCapability, RequestContext, SubmitOptions};
use super::lifecycle::SlotCell;
use super::scope::CancellationScope;
use super::unit::{UnitId, WorkUnit};

/// Flags a unit as joining until dropped, so an abandoned wait cannot leave
/// the flag behind.
struct JoiningGuard<'a> {
    inner: &'a Inner,
    unit_id: UnitId,
}

impl<'a> JoiningGuard<'a> {
    fn new(inner: &'a Inner, unit_id: UnitId) -> Self {
        inner.set_joining(unit_id, true);
        Self { inner, unit_id }
    }
}

impl Drop for JoiningGuard<'_> {
    fn drop(&mut self) {
        self.inner.set_joining(self.unit_id, false);
    }
}

/// Host handed to a running unit.
pub struct UnitHost {
    inner: Weak<Inner>,
    unit_id: UnitId,
    unit_name: String,
    token: CancellationToken,
    slot: SlotCell,
}

impl UnitHost {
    pub(crate) fn new(
        inner: Weak<Inner>,
        unit_id: UnitId,
        unit_name: String,
        token: CancellationToken,
        slot: SlotCell,
    ) -> Self {
        Self {
            inner,
            unit_id,
            unit_name,
            token,
            slot,
        }
    }

    /// Id of the unit this host serves.
    pub fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    fn inner(&self) -> Result<Arc<Inner>, HostError> {
        self.inner.upgrade().ok_or(HostError::Closed)
    }
}

impl HostCapability for UnitHost {
    fn submit_child(
        &self,
        unit: Arc<dyn WorkUnit>,
        options: SubmitOptions,
    ) -> Result<UnitHandle, HostError> {
        self.inner()?
            .register(Some(self.unit_id), &self.token, unit, options)
    }

    fn track_detached(&self, name: &str, work: BoxFuture<'static, ()>) -> Result<(), HostError> {
        self.inner()?.track_detached(name.to_string(), work);
        Ok(())
    }

    fn request_raw(
        &self,
        request: &'static str,
        payload: AnyPayload,
    ) -> BoxFuture<'_, Result<AnyPayload, HostError>> {
        Box::pin(async move {
            let handler = self
                .inner()?
                .requests
                .clone()
                .ok_or(HostError::not_supported("request"))?;

            debug!(unit_id = %self.unit_id, request, "Forwarding unit request");
            let context = RequestContext {
                from: Some(self.unit_id),
                unit_name: self.unit_name.clone(),
                request,
            };
            handler.handle(context, payload).await
        })
    }

    fn cancellation_handle(&self) -> CancellationToken {
        self.token.clone()
    }

    fn open_scope(&self) -> Result<CancellationScope, HostError> {
        Ok(self.inner()?.open_scope(Some(self.unit_id), &self.token))
    }

    fn cancel_scope(&self, scope: &CancellationScope) -> Result<bool, HostError> {
        self.inner()?.cancel_scope(scope.id())
    }

    fn close_scope(&self, scope: &CancellationScope) -> Result<bool, HostError> {
        Ok(self.inner()?.close_scope(scope.id()))
    }

    fn join_children(&self) -> BoxFuture<'_, Result<(), HostError>> {
        Box::pin(async move {
            let inner = self.inner()?;
            let mut pending_rx = inner.pending_tx.subscribe();
            if inner.child_pending(self.unit_id) == 0 {
                return Ok(());
            }

            // Flagged before the slot goes back so a snapshot never counts
            // this unit and its replacement as slot holders at once.
            let joining = JoiningGuard::new(&inner, self.unit_id);
            let released = inner.release_slot(&self.slot);
            let _joining = released.then_some(joining);
            loop {
                let _ = pending_rx.borrow_and_update();
                if inner.child_pending(self.unit_id) == 0 {
                    break;
                }
                if pending_rx.changed().await.is_err() {
                    break;
                }
            }
            if released {
                inner.reacquire_slot(&self.slot).await;
            }
            Ok(())
        })
    }
}
