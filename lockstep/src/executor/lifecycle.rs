//! Unit lifecycle management.
//!
//! This module handles the lifecycle of units inside the orchestrator:
//! - Registration and scheduling
//! - FIFO admission through the concurrency gate
//! - Running a unit with panic isolation
//! - Completion, auto-removal and continuation hand-over
//! - Releasing and re-acquiring slots around `join_children`

use std::any::Any;
use std::collections::hash_map::Entry;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{oneshot, OwnedSemaphorePermit};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::context::UnitHost;
use super::core::{now_ms, Admission, Inner, Registry, ScopeEntry, UnitEntry};
use super::error::{HostError, UnitError};
use super::handle::UnitHandle;
use super::host::SubmitOptions;
use super::scope::{CancellationScope, ScopeId};
use super::telemetry::OrchestratorEvent;
use super::unit::{classify, EndReason, UnitId, WorkUnit};

/// Slot held by a running unit. Shared with its host so the slot can be
/// handed back while the unit waits for children.
pub(crate) type SlotCell = Arc<Mutex<Option<OwnedSemaphorePermit>>>;

impl Inner {
    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    /// Registers a unit submitted by `parent` (or the root when `None`).
    pub(crate) fn register(
        self: &Arc<Self>,
        parent: Option<UnitId>,
        parent_token: &CancellationToken,
        unit: Arc<dyn WorkUnit>,
        options: SubmitOptions,
    ) -> Result<UnitHandle, HostError> {
        let mut reg = self.registry.lock();
        if let Some(scope) = &options.scope {
            Self::check_scope(&reg, parent, scope)?;
        }
        if !unit.core().claim_submission() {
            return Err(HostError::AlreadySubmitted);
        }

        let (id, token) = self.insert(&mut reg, parent, parent_token.clone(), Arc::clone(&unit), options);
        self.admit(&mut reg);
        self.publish_pending(&reg);
        drop(reg);

        Ok(UnitHandle::new(id, unit, token))
    }

    /// A unit may only be placed in a scope opened by its own submitter, so
    /// the scope's token is always a descendant of the submitter's token.
    fn check_scope(
        reg: &Registry,
        parent: Option<UnitId>,
        scope: &CancellationScope,
    ) -> Result<(), HostError> {
        let entry = reg
            .scopes
            .get(&scope.id())
            .ok_or(HostError::UnknownScope(scope.id()))?;
        if entry.owner != parent {
            return Err(HostError::ForeignScope(scope.id()));
        }
        Ok(())
    }

    fn insert(
        &self,
        reg: &mut Registry,
        parent: Option<UnitId>,
        parent_token: CancellationToken,
        unit: Arc<dyn WorkUnit>,
        options: SubmitOptions,
    ) -> (UnitId, CancellationToken) {
        let base_token = options
            .scope
            .as_ref()
            .map(|scope| scope.token().clone())
            .unwrap_or(parent_token);
        let token = base_token.child_token();
        let id = UnitId::next();
        let auto_start = options.auto_start;

        self.telemetry.emit(OrchestratorEvent::UnitSubmitted {
            unit_id: id,
            name: unit.name().to_string(),
            parent,
            auto_start,
        });

        reg.units.insert(
            id,
            UnitEntry {
                unit,
                parent,
                options,
                base_token,
                token: token.clone(),
                scheduled: false,
                joining: false,
                queued_at: None,
            },
        );

        if auto_start {
            self.schedule(reg, id);
        }
        (id, token)
    }

    /// Puts a registered unit at the back of the admission queue.
    pub(crate) fn schedule(&self, reg: &mut Registry, id: UnitId) -> bool {
        let Some(entry) = reg.units.get_mut(&id) else {
            return false;
        };
        if entry.scheduled || entry.unit.core().end_record().is_some() {
            return false;
        }
        entry.scheduled = true;
        entry.queued_at = Some(Instant::now());
        let parent = entry.parent;

        reg.admission.push_back(Admission::Start(id));
        reg.pending += 1;
        if let Some(parent) = parent {
            *reg.child_pending.entry(parent).or_insert(0) += 1;
        }
        true
    }

    pub(crate) fn discard_unscheduled(&self, reg: &mut Registry) -> usize {
        let discarded: Vec<UnitId> = reg
            .units
            .iter()
            .filter(|(_, entry)| !entry.scheduled && entry.unit.core().end_record().is_none())
            .map(|(id, _)| *id)
            .collect();

        for id in &discarded {
            let Some(entry) = reg.units.get(id) else {
                continue;
            };
            let unit = Arc::clone(&entry.unit);
            let auto_remove = entry.options.auto_remove;
            unit.core().finish(EndReason::NeverStarted, None);
            self.drop_continuation(*id, &*unit, EndReason::NeverStarted);
            self.telemetry.emit(OrchestratorEvent::UnitFinished {
                unit_id: *id,
                reason: EndReason::NeverStarted,
                duration: Duration::ZERO,
            });
            if auto_remove {
                reg.units.remove(id);
            }
        }

        if !discarded.is_empty() {
            debug!(count = discarded.len(), "Discarded units that were never started");
        }
        discarded.len()
    }

    // -------------------------------------------------------------------------
    // Admission
    // -------------------------------------------------------------------------

    /// Admits queued entries, front first, while slots are free.
    pub(crate) fn admit(self: &Arc<Self>, reg: &mut Registry) {
        while !reg.admission.is_empty() {
            let Ok(permit) = Arc::clone(&self.gate).try_acquire_owned() else {
                break;
            };
            match reg.admission.pop_front() {
                Some(Admission::Start(id)) => self.launch(reg, id, permit),
                Some(Admission::Resume(tx)) => {
                    // A dropped receiver returns the permit, which is freed
                    // here and offered to the next entry. The receiver
                    // counts the slot once it actually holds it.
                    let _ = tx.send(permit);
                }
                None => break,
            }
        }
    }

    fn launch(self: &Arc<Self>, reg: &mut Registry, id: UnitId, permit: OwnedSemaphorePermit) {
        let Some(entry) = reg.units.get(&id) else {
            return;
        };
        let unit = Arc::clone(&entry.unit);
        let token = entry.token.clone();
        let parent = entry.parent;
        let queue_wait = entry.queued_at.map(|t| t.elapsed()).unwrap_or_default();

        if !unit.core().mark_running() {
            // Finalised while queued; give the bookkeeping back.
            self.release_pending(reg, parent);
            return;
        }

        self.slot_acquired();
        self.touch();
        unit.core().attach_activity(Arc::clone(&self.last_activity_ms));
        self.telemetry.emit(OrchestratorEvent::UnitStarted {
            unit_id: id,
            queue_wait,
        });

        let slot: SlotCell = Arc::new(Mutex::new(Some(permit)));
        let host = UnitHost::new(
            Arc::downgrade(self),
            id,
            unit.name().to_string(),
            token.clone(),
            Arc::clone(&slot),
        );
        let inner = Arc::clone(self);

        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = AssertUnwindSafe(unit.run(&host, token.clone()))
                .catch_unwind()
                .await;
            let result = outcome.unwrap_or_else(|panic| {
                Err(UnitError::Panicked(panic_message(panic.as_ref())))
            });
            let (reason, error) = classify(result, token.is_cancelled());

            if let Some(error) = &error {
                warn!(unit_id = %id, unit = %unit.name(), error = %error, "Unit failed");
            }

            let permit = slot.lock().take();
            inner.finish(id, reason, error, started.elapsed(), permit);
        });
    }

    // -------------------------------------------------------------------------
    // Completion
    // -------------------------------------------------------------------------

    fn finish(
        self: &Arc<Self>,
        id: UnitId,
        reason: EndReason,
        error: Option<UnitError>,
        duration: Duration,
        permit: Option<OwnedSemaphorePermit>,
    ) {
        let mut reg = self.registry.lock();

        if let Some(permit) = permit {
            drop(permit);
            self.slot_released();
        }
        self.touch();

        let Some(entry) = reg.units.get(&id) else {
            return;
        };
        let unit = Arc::clone(&entry.unit);
        let parent = entry.parent;
        let options = entry.options.clone();
        let base_token = entry.base_token.clone();

        unit.core().finish(reason, error.map(Arc::new));
        self.telemetry.emit(OrchestratorEvent::UnitFinished {
            unit_id: id,
            reason,
            duration,
        });

        if options.auto_remove {
            reg.units.remove(&id);
        }
        self.close_owned_scopes(&mut reg, id);

        if reason == EndReason::Completed {
            if let Some(next) = unit.core().take_continuation() {
                if next.core().claim_submission() {
                    let (next_id, _) = self.insert(
                        &mut reg,
                        parent,
                        base_token,
                        next,
                        SubmitOptions {
                            auto_start: true,
                            ..options
                        },
                    );
                    self.telemetry.emit(OrchestratorEvent::ContinuationSubmitted {
                        predecessor: id,
                        unit_id: next_id,
                    });
                } else {
                    warn!(unit_id = %id, "Continuation was already submitted elsewhere");
                }
            }
        } else {
            self.drop_continuation(id, &*unit, reason);
        }

        // Released after any continuation is scheduled so the pending count
        // never touches zero in between.
        self.release_pending(&mut reg, parent);
        self.admit(&mut reg);
        self.publish_pending(&reg);
    }

    fn drop_continuation(&self, id: UnitId, unit: &dyn WorkUnit, reason: EndReason) {
        let Some(next) = unit.core().take_continuation() else {
            return;
        };
        next.core().finish(EndReason::NeverStarted, None);
        self.drop_continuation(id, &*next, reason);
        self.telemetry.emit(OrchestratorEvent::ContinuationDropped {
            predecessor: id,
            name: next.name().to_string(),
            predecessor_reason: reason,
        });
    }

    fn release_pending(&self, reg: &mut Registry, parent: Option<UnitId>) {
        reg.pending = reg.pending.saturating_sub(1);
        if let Some(parent) = parent {
            if let Entry::Occupied(mut count) = reg.child_pending.entry(parent) {
                *count.get_mut() = count.get().saturating_sub(1);
                if *count.get() == 0 {
                    count.remove();
                }
            }
        }
    }

    pub(crate) fn publish_pending(&self, reg: &Registry) {
        self.pending_work.store(reg.pending as u64, Ordering::Relaxed);
        self.pending_tx.send_replace(reg.pending);
    }

    // -------------------------------------------------------------------------
    // Slots
    // -------------------------------------------------------------------------

    fn slot_acquired(&self) {
        let now = self.running.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_running.fetch_max(now, Ordering::AcqRel);
    }

    fn slot_released(&self) {
        self.running.fetch_sub(1, Ordering::AcqRel);
    }

    fn touch(&self) {
        self.last_activity_ms.store(now_ms(), Ordering::Relaxed);
    }

    /// Gives a running unit's slot back to the gate. Returns false if the
    /// unit held none.
    pub(crate) fn release_slot(self: &Arc<Self>, slot: &SlotCell) -> bool {
        let mut reg = self.registry.lock();
        let Some(permit) = slot.lock().take() else {
            return false;
        };
        drop(permit);
        self.slot_released();
        self.admit(&mut reg);
        true
    }

    /// Waits for a slot ahead of every fresh admission.
    pub(crate) async fn reacquire_slot(self: &Arc<Self>, slot: &SlotCell) {
        let rx = {
            let mut reg = self.registry.lock();
            if reg.admission.is_empty() {
                if let Ok(permit) = Arc::clone(&self.gate).try_acquire_owned() {
                    self.slot_acquired();
                    *slot.lock() = Some(permit);
                    return;
                }
            }
            let (tx, rx) = oneshot::channel();
            reg.admission.push_front(Admission::Resume(tx));
            self.admit(&mut reg);
            rx
        };

        if let Ok(permit) = rx.await {
            self.slot_acquired();
            *slot.lock() = Some(permit);
        }
    }

    /// Marks a running unit as having released its slot to join children.
    pub(crate) fn set_joining(&self, id: UnitId, joining: bool) {
        if let Some(entry) = self.registry.lock().units.get_mut(&id) {
            entry.joining = joining;
        }
    }

    pub(crate) fn child_pending(&self, parent: UnitId) -> usize {
        self.registry
            .lock()
            .child_pending
            .get(&parent)
            .copied()
            .unwrap_or(0)
    }

    // -------------------------------------------------------------------------
    // Scopes
    // -------------------------------------------------------------------------

    pub(crate) fn open_scope(
        &self,
        owner: Option<UnitId>,
        parent: &CancellationToken,
    ) -> CancellationScope {
        let mut reg = self.registry.lock();
        reg.next_scope += 1;
        let id = ScopeId(reg.next_scope);
        let token = parent.child_token();
        reg.scopes.insert(
            id,
            ScopeEntry {
                owner,
                token: token.clone(),
            },
        );
        self.telemetry.emit(OrchestratorEvent::ScopeOpened { scope_id: id });
        CancellationScope::new(id, token)
    }

    pub(crate) fn cancel_scope(&self, id: ScopeId) -> Result<bool, HostError> {
        let token = {
            let reg = self.registry.lock();
            reg.scopes
                .get(&id)
                .map(|entry| entry.token.clone())
                .ok_or(HostError::UnknownScope(id))?
        };
        if token.is_cancelled() {
            return Ok(false);
        }
        token.cancel();
        self.telemetry.emit(OrchestratorEvent::ScopeCancelled { scope_id: id });
        Ok(true)
    }

    pub(crate) fn close_scope(&self, id: ScopeId) -> bool {
        let closed = self.registry.lock().scopes.remove(&id).is_some();
        if closed {
            self.telemetry.emit(OrchestratorEvent::ScopeClosed { scope_id: id });
        }
        closed
    }

    /// Forgets every scope opened by `owner`.
    fn close_owned_scopes(&self, reg: &mut Registry, owner: UnitId) {
        let owned: Vec<ScopeId> = reg
            .scopes
            .iter()
            .filter(|(_, entry)| entry.owner == Some(owner))
            .map(|(id, _)| *id)
            .collect();
        for id in owned {
            reg.scopes.remove(&id);
            self.telemetry.emit(OrchestratorEvent::ScopeClosed { scope_id: id });
        }
    }

    // -------------------------------------------------------------------------
    // Detached work
    // -------------------------------------------------------------------------

    pub(crate) fn track_detached(self: &Arc<Self>, name: String, work: BoxFuture<'static, ()>) {
        {
            let mut reg = self.registry.lock();
            reg.pending += 1;
            self.telemetry.emit(OrchestratorEvent::DetachedTracked { name: name.clone() });
            self.publish_pending(&reg);
        }

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let started = Instant::now();
            if let Err(panic) = AssertUnwindSafe(work).catch_unwind().await {
                warn!(name = %name, panic = %panic_message(panic.as_ref()), "Detached work panicked");
            }

            let mut reg = inner.registry.lock();
            reg.pending = reg.pending.saturating_sub(1);
            inner.touch();
            inner.telemetry.emit(OrchestratorEvent::DetachedFinished {
                name,
                duration: started.elapsed(),
            });
            inner.publish_pending(&reg);
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
