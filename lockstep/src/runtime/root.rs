//! Top-level host used by the CLI.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::executor::{
    AnyPayload, CancellationScope, HostCapability, HostError, JoinError, Orchestrator,
    RequestContext, StallWatchdog, SubmitOptions, UnitHandle, WorkUnit,
};

use super::reporter::ProgressReporter;

/// Host that owns an orchestrator and drives it to completion.
///
/// Units submitted through the root host are top-level: their tokens derive
/// from the orchestrator's root token, so [`Orchestrator::cancel_all`]
/// reaches all of them.
pub struct RootHost {
    orchestrator: Orchestrator,
}

impl RootHost {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Submits a top-level unit that starts as soon as a slot is free.
    pub fn launch(&self, unit: Arc<dyn WorkUnit>) -> Result<UnitHandle, HostError> {
        info!(unit = %unit.name(), "Launching");
        self.orchestrator.submit(unit, SubmitOptions::default())
    }

    /// Polls progress until the orchestrator is idle.
    ///
    /// Returns [`JoinError::Cancelled`] if `cancel` fires first; units are
    /// not cancelled by this, the caller decides what to do with them.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        reporter: &dyn ProgressReporter,
    ) -> Result<(), JoinError> {
        let watchdog_shutdown = CancellationToken::new();
        let (last_activity, pending_work) = self.orchestrator.activity_counters();
        tokio::spawn(
            StallWatchdog::new(last_activity, pending_work).run(watchdog_shutdown.clone()),
        );

        let mut ticker = tokio::time::interval(self.orchestrator.config().poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let join = self.orchestrator.join(cancel);
        tokio::pin!(join);

        let result = loop {
            tokio::select! {
                result = &mut join => break result,
                _ = ticker.tick() => {
                    reporter.report(&self.orchestrator.progress());
                }
            }
        };

        watchdog_shutdown.cancel();
        reporter.finish(&self.orchestrator.progress());
        debug!(result = ?result, peak_running = self.orchestrator.peak_running(), "Root host idle");
        result
    }
}

impl HostCapability for RootHost {
    fn submit_child(
        &self,
        unit: Arc<dyn WorkUnit>,
        options: SubmitOptions,
    ) -> Result<UnitHandle, HostError> {
        self.orchestrator.submit(unit, options)
    }

    fn track_detached(&self, name: &str, work: BoxFuture<'static, ()>) -> Result<(), HostError> {
        self.orchestrator.track_detached(name.to_string(), work);
        Ok(())
    }

    fn request_raw(
        &self,
        request: &'static str,
        payload: AnyPayload,
    ) -> BoxFuture<'_, Result<AnyPayload, HostError>> {
        Box::pin(async move {
            let handler = self
                .orchestrator
                .inner
                .requests
                .clone()
                .ok_or(HostError::not_supported("request"))?;
            let context = RequestContext {
                from: None,
                unit_name: "root".to_string(),
                request,
            };
            handler.handle(context, payload).await
        })
    }

    fn cancellation_handle(&self) -> CancellationToken {
        self.orchestrator.root_token()
    }

    fn open_scope(&self) -> Result<CancellationScope, HostError> {
        Ok(self.orchestrator.open_scope())
    }

    fn cancel_scope(&self, scope: &CancellationScope) -> Result<bool, HostError> {
        self.orchestrator.cancel_scope(scope.id())
    }

    fn close_scope(&self, scope: &CancellationScope) -> Result<bool, HostError> {
        Ok(self.orchestrator.close_scope(scope.id()))
    }

    fn join_children(&self) -> BoxFuture<'_, Result<(), HostError>> {
        Box::pin(async move {
            // An untriggered token: the root waits for everything.
            self.orchestrator
                .join(&CancellationToken::new())
                .await
                .map_err(|_| HostError::Closed)
        })
    }
}
