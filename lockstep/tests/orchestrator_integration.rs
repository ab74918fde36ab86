//! Integration tests for the orchestrator.
//!
//! These tests drive the public API end to end:
//! - Bounded concurrency and FIFO admission
//! - Scope cancellation of a parent's children
//! - Continuation ordering and dropped continuations
//! - Requests on a batch host and on an interactive root host
//! - A found race between many children
//! - Scope ownership, nested cancellation and slot accounting

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use lockstep::executor::{
    checkpoint, downcast_request, respond, AggregateProgress, AnyPayload, CancellationScope,
    EndReason, FoundLatch, HostCapability, HostCapabilityExt, HostError, HostRequest,
    NullTelemetrySink, Orchestrator, OrchestratorConfig, RequestContext, RequestHandler, Signal,
    SubmitOptions, UnitCore, UnitError, UnitFuture, UnitHandle, UnitState, WorkUnit,
};
use lockstep::runtime::{ProgressReporter, RootHost};
use tokio_util::sync::CancellationToken;

// =============================================================================
// Test Helpers
// =============================================================================

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn orchestrator(k: usize) -> Orchestrator {
    Orchestrator::new(OrchestratorConfig::with_max_concurrent(k))
}

async fn join(orchestrator: &Orchestrator) {
    tokio::time::timeout(TEST_TIMEOUT, orchestrator.join(&CancellationToken::new()))
        .await
        .expect("join timed out")
        .expect("join cancelled");
}

/// Tracks how many markers run at once.
#[derive(Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A unit that records its index when it starts and optionally fails.
struct Marker {
    core: UnitCore,
    index: usize,
    delay: Duration,
    fail: bool,
    log: Arc<Mutex<Vec<usize>>>,
    gauge: Arc<Gauge>,
}

impl Marker {
    fn new(index: usize, log: &Arc<Mutex<Vec<usize>>>, gauge: &Arc<Gauge>) -> Self {
        Self {
            core: UnitCore::new(),
            index,
            delay: Duration::from_millis(5),
            fail: false,
            log: Arc::clone(log),
            gauge: Arc::clone(gauge),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn then(mut self, next: Arc<dyn WorkUnit>) -> Self {
        self.core = self.core.with_continuation(next);
        self
    }
}

impl WorkUnit for Marker {
    fn name(&self) -> &str {
        "Marker"
    }

    fn core(&self) -> &UnitCore {
        &self.core
    }

    fn run<'a>(&'a self, _host: &'a dyn HostCapability, cancel: CancellationToken) -> UnitFuture<'a> {
        Box::pin(async move {
            self.gauge.enter();
            self.log.lock().unwrap().push(self.index);
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = cancel.cancelled() => {}
            }
            self.gauge.exit();
            checkpoint(&cancel)?;
            if self.fail {
                return Err(UnitError::Unsuccessful);
            }
            Ok(true)
        })
    }
}

/// A unit that runs until cancelled.
struct Sleeper {
    core: UnitCore,
}

impl Sleeper {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            core: UnitCore::new(),
        })
    }
}

impl WorkUnit for Sleeper {
    fn name(&self) -> &str {
        "Sleeper"
    }

    fn core(&self) -> &UnitCore {
        &self.core
    }

    fn run<'a>(&'a self, _host: &'a dyn HostCapability, cancel: CancellationToken) -> UnitFuture<'a> {
        Box::pin(async move {
            cancel.cancelled().await;
            Err(UnitError::Cancelled)
        })
    }
}

/// Opens a scope, starts `children` sleepers in it, cancels the scope, and
/// waits for them.
struct ScopedParent {
    core: UnitCore,
    children: usize,
    handles: Mutex<Vec<UnitHandle>>,
}

impl WorkUnit for ScopedParent {
    fn name(&self) -> &str {
        "ScopedParent"
    }

    fn core(&self) -> &UnitCore {
        &self.core
    }

    fn run<'a>(&'a self, host: &'a dyn HostCapability, cancel: CancellationToken) -> UnitFuture<'a> {
        Box::pin(async move {
            let scope = host.open_scope()?;
            for _ in 0..self.children {
                let handle = host.submit_child(
                    Sleeper::new(),
                    SubmitOptions::new(false, true).in_scope(scope.clone()),
                )?;
                self.handles.lock().unwrap().push(handle);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(host.cancel_scope(&scope)?);
            host.join_children().await?;
            checkpoint(&cancel)?;
            Ok(true)
        })
    }
}

struct Confirm;

impl HostRequest for Confirm {
    type Response = bool;
    const NAME: &'static str = "confirm";
}

/// Asks the host a question and records the error it got back.
struct Asker {
    core: UnitCore,
    error: Mutex<Option<HostError>>,
}

impl WorkUnit for Asker {
    fn name(&self) -> &str {
        "Asker"
    }

    fn core(&self) -> &UnitCore {
        &self.core
    }

    fn run<'a>(&'a self, host: &'a dyn HostCapability, _cancel: CancellationToken) -> UnitFuture<'a> {
        Box::pin(async move {
            match host.request(Confirm).await {
                Ok(answer) => Ok(answer),
                Err(e) => {
                    *self.error.lock().unwrap() = Some(e.clone());
                    Err(e.into())
                }
            }
        })
    }
}

/// Child that raises the shared signal once it gets a slot.
struct Racer {
    core: UnitCore,
    index: usize,
    found: Arc<Signal<usize>>,
}

impl WorkUnit for Racer {
    fn name(&self) -> &str {
        "Racer"
    }

    fn core(&self) -> &UnitCore {
        &self.core
    }

    fn run<'a>(&'a self, _host: &'a dyn HostCapability, cancel: CancellationToken) -> UnitFuture<'a> {
        Box::pin(async move {
            checkpoint(&cancel)?;
            tokio::task::yield_now().await;
            self.found.raise(self.index);
            Ok(true)
        })
    }
}

/// Parent that claims the first raised signal and cancels the rest.
struct RaceParent {
    core: UnitCore,
    children: usize,
    latch: FoundLatch,
    claims: AtomicUsize,
    winner: Mutex<Option<usize>>,
    handles: Mutex<Vec<UnitHandle>>,
}

impl WorkUnit for RaceParent {
    fn name(&self) -> &str {
        "RaceParent"
    }

    fn core(&self) -> &UnitCore {
        &self.core
    }

    fn run<'a>(&'a self, host: &'a dyn HostCapability, cancel: CancellationToken) -> UnitFuture<'a> {
        Box::pin(async move {
            let found = Arc::new(Signal::new("found"));
            let mut hits = found.subscribe();
            let scope = host.open_scope()?;
            for index in 0..self.children {
                let racer = Arc::new(Racer {
                    core: UnitCore::new(),
                    index,
                    found: Arc::clone(&found),
                });
                let handle =
                    host.submit_child(racer, SubmitOptions::new(false, true).in_scope(scope.clone()))?;
                self.handles.lock().unwrap().push(handle);
            }

            let on_hit = |index: usize| -> Result<(), HostError> {
                if self.latch.try_claim() {
                    self.claims.fetch_add(1, Ordering::SeqCst);
                    *self.winner.lock().unwrap() = Some(index);
                    host.cancel_scope(&scope)?;
                }
                Ok(())
            };

            {
                let children = host.join_children();
                tokio::pin!(children);
                loop {
                    tokio::select! {
                        result = &mut children => {
                            result?;
                            break;
                        }
                        Some(index) = hits.recv() => on_hit(index)?,
                    }
                }
            }
            while let Some(index) = hits.try_recv() {
                on_hit(index)?;
            }

            checkpoint(&cancel)?;
            Ok(true)
        })
    }
}

/// Submits a chain of nested units. Leaves wait for cancellation; inner
/// levels wait for their children, optionally through their own scope.
struct Nest {
    core: UnitCore,
    depth: usize,
    scoped: bool,
    handles: Arc<Mutex<Vec<UnitHandle>>>,
}

impl Nest {
    fn new(depth: usize, scoped: bool, handles: &Arc<Mutex<Vec<UnitHandle>>>) -> Arc<Self> {
        Arc::new(Self {
            core: UnitCore::new(),
            depth,
            scoped,
            handles: Arc::clone(handles),
        })
    }
}

impl WorkUnit for Nest {
    fn name(&self) -> &str {
        "Nest"
    }

    fn core(&self) -> &UnitCore {
        &self.core
    }

    fn run<'a>(&'a self, host: &'a dyn HostCapability, cancel: CancellationToken) -> UnitFuture<'a> {
        Box::pin(async move {
            if self.depth == 0 {
                cancel.cancelled().await;
                return Err(UnitError::Cancelled);
            }
            let mut options = SubmitOptions::default();
            if self.scoped {
                options = options.in_scope(host.open_scope()?);
            }
            let child = Nest::new(self.depth - 1, self.scoped, &self.handles);
            let handle = host.submit_child(child, options)?;
            self.handles.lock().unwrap().push(handle);
            host.join_children().await?;
            checkpoint(&cancel)?;
            Ok(true)
        })
    }
}

/// Tries to place a child in a scope it did not open.
struct Trespasser {
    core: UnitCore,
    scope: CancellationScope,
    error: Mutex<Option<HostError>>,
}

impl WorkUnit for Trespasser {
    fn name(&self) -> &str {
        "Trespasser"
    }

    fn core(&self) -> &UnitCore {
        &self.core
    }

    fn run<'a>(&'a self, host: &'a dyn HostCapability, _cancel: CancellationToken) -> UnitFuture<'a> {
        Box::pin(async move {
            let options = SubmitOptions::default().in_scope(self.scope.clone());
            if let Err(e) = host.submit_child(Sleeper::new(), options) {
                *self.error.lock().unwrap() = Some(e);
            }
            Ok(true)
        })
    }
}

/// Puts one sleeper in a scope and one marker outside it, then cancels
/// the scope.
struct SplitParent {
    core: UnitCore,
    log: Arc<Mutex<Vec<usize>>>,
    gauge: Arc<Gauge>,
    inside: Mutex<Option<UnitHandle>>,
    outside: Mutex<Option<UnitHandle>>,
}

impl WorkUnit for SplitParent {
    fn name(&self) -> &str {
        "SplitParent"
    }

    fn core(&self) -> &UnitCore {
        &self.core
    }

    fn run<'a>(&'a self, host: &'a dyn HostCapability, _cancel: CancellationToken) -> UnitFuture<'a> {
        Box::pin(async move {
            let scope = host.open_scope()?;
            let inside =
                host.submit_child(Sleeper::new(), SubmitOptions::default().in_scope(scope.clone()))?;
            let marker = Marker::new(0, &self.log, &self.gauge).with_delay(Duration::from_millis(40));
            let outside = host.submit_child(Arc::new(marker), SubmitOptions::default())?;
            *self.inside.lock().unwrap() = Some(inside);
            *self.outside.lock().unwrap() = Some(outside);

            tokio::time::sleep(Duration::from_millis(10)).await;
            host.cancel_scope(&scope)?;
            host.join_children().await?;
            Ok(true)
        })
    }
}

/// Hands background work to the host and returns straight away.
struct Detacher {
    core: UnitCore,
    flushed: Arc<AtomicUsize>,
}

impl WorkUnit for Detacher {
    fn name(&self) -> &str {
        "Detacher"
    }

    fn core(&self) -> &UnitCore {
        &self.core
    }

    fn run<'a>(&'a self, host: &'a dyn HostCapability, _cancel: CancellationToken) -> UnitFuture<'a> {
        Box::pin(async move {
            let flushed = Arc::clone(&self.flushed);
            host.track_detached(
                "flush",
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    flushed.fetch_add(1, Ordering::SeqCst);
                }),
            )?;
            Ok(true)
        })
    }
}

/// Submits `children` markers and waits for them.
struct FanOut {
    core: UnitCore,
    children: usize,
    log: Arc<Mutex<Vec<usize>>>,
    gauge: Arc<Gauge>,
}

impl WorkUnit for FanOut {
    fn name(&self) -> &str {
        "FanOut"
    }

    fn core(&self) -> &UnitCore {
        &self.core
    }

    fn run<'a>(&'a self, host: &'a dyn HostCapability, _cancel: CancellationToken) -> UnitFuture<'a> {
        Box::pin(async move {
            for index in 0..self.children {
                let marker =
                    Marker::new(index, &self.log, &self.gauge).with_delay(Duration::from_millis(30));
                host.submit_child(Arc::new(marker), SubmitOptions::default())?;
            }
            host.join_children().await?;
            Ok(true)
        })
    }
}

/// Starts waiting for one child and stops waiting when `stop` fires.
struct Impatient {
    core: UnitCore,
    stop: CancellationToken,
    log: Arc<Mutex<Vec<usize>>>,
    gauge: Arc<Gauge>,
}

impl WorkUnit for Impatient {
    fn name(&self) -> &str {
        "Impatient"
    }

    fn core(&self) -> &UnitCore {
        &self.core
    }

    fn run<'a>(&'a self, host: &'a dyn HostCapability, _cancel: CancellationToken) -> UnitFuture<'a> {
        Box::pin(async move {
            let child = Marker::new(1, &self.log, &self.gauge).with_delay(Duration::from_millis(20));
            host.submit_child(Arc::new(child), SubmitOptions::default())?;
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => {}
                result = host.join_children() => result?,
            }
            Ok(true)
        })
    }
}

/// Holds a slot for a while, then fires `done` just before finishing.
struct Holder {
    core: UnitCore,
    delay: Duration,
    done: CancellationToken,
}

impl WorkUnit for Holder {
    fn name(&self) -> &str {
        "Holder"
    }

    fn core(&self) -> &UnitCore {
        &self.core
    }

    fn run<'a>(&'a self, _host: &'a dyn HostCapability, _cancel: CancellationToken) -> UnitFuture<'a> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.done.cancel();
            Ok(true)
        })
    }
}

/// Answers every confirmation with yes.
struct AlwaysYes {
    seen: Mutex<Vec<Option<String>>>,
}

impl RequestHandler for AlwaysYes {
    fn handle(
        &self,
        context: RequestContext,
        payload: AnyPayload,
    ) -> BoxFuture<'_, Result<AnyPayload, HostError>> {
        Box::pin(async move {
            downcast_request::<Confirm>(payload)
                .map_err(|_| HostError::Rejected("unexpected request".into()))?;
            self.seen
                .lock()
                .unwrap()
                .push(context.from.map(|id| id.to_string()));
            Ok(respond::<Confirm>(true))
        })
    }
}

// =============================================================================
// Integration Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_running_never_exceeds_k() {
    let orchestrator = orchestrator(3);
    let log = Arc::new(Mutex::new(Vec::new()));
    let gauge = Arc::new(Gauge::default());

    for index in 0..24 {
        orchestrator
            .submit(Arc::new(Marker::new(index, &log, &gauge)), SubmitOptions::default())
            .unwrap();
    }
    join(&orchestrator).await;

    assert!(gauge.peak.load(Ordering::SeqCst) <= 3);
    assert!(orchestrator.peak_running() <= 3);
    assert_eq!(log.lock().unwrap().len(), 24);

    let progress = orchestrator.progress();
    assert_eq!(progress.completed, 24);
    assert!(progress.is_idle());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_slot_admits_in_submission_order() {
    let orchestrator = orchestrator(1);
    let log = Arc::new(Mutex::new(Vec::new()));
    let gauge = Arc::new(Gauge::default());

    for index in 0..10 {
        orchestrator
            .submit(Arc::new(Marker::new(index, &log, &gauge)), SubmitOptions::default())
            .unwrap();
    }
    join(&orchestrator).await;

    assert_eq!(*log.lock().unwrap(), (0..10).collect::<Vec<_>>());
    assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scope_cancel_reaches_every_child() {
    let orchestrator = orchestrator(4);
    let parent = Arc::new(ScopedParent {
        core: UnitCore::new(),
        children: 8,
        handles: Mutex::new(Vec::new()),
    });
    let handle = orchestrator
        .submit(parent.clone(), SubmitOptions::default())
        .unwrap();
    join(&orchestrator).await;

    assert_eq!(handle.end_reason(), Some(EndReason::Completed));
    let children = parent.handles.lock().unwrap();
    assert_eq!(children.len(), 8);
    for child in children.iter() {
        assert!(matches!(
            child.end_reason(),
            Some(EndReason::Canceled) | Some(EndReason::NeverStarted)
        ));
        assert!(child.last_error().is_none());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_continuation_runs_after_predecessor() {
    let orchestrator = orchestrator(2);
    let log = Arc::new(Mutex::new(Vec::new()));
    let gauge = Arc::new(Gauge::default());

    let second = Arc::new(Marker::new(2, &log, &gauge));
    let first = Arc::new(Marker::new(1, &log, &gauge).then(second.clone()));
    let handle = orchestrator
        .submit(first.clone(), SubmitOptions::default())
        .unwrap();

    // The continuation is not registered until its predecessor completes.
    assert_eq!(second.state(), UnitState::Created);

    join(&orchestrator).await;

    assert_eq!(*log.lock().unwrap(), vec![1, 2]);
    assert_eq!(handle.end_reason(), Some(EndReason::Completed));
    assert_eq!(second.core().end_reason(), Some(EndReason::Completed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_predecessor_drops_continuation() {
    let orchestrator = orchestrator(2);
    let log = Arc::new(Mutex::new(Vec::new()));
    let gauge = Arc::new(Gauge::default());

    let third = Arc::new(Marker::new(3, &log, &gauge));
    let second = Arc::new(Marker::new(2, &log, &gauge).then(third.clone()));
    let first = Arc::new(Marker::new(1, &log, &gauge).failing().then(second.clone()));
    let handle = orchestrator.submit(first, SubmitOptions::default()).unwrap();

    join(&orchestrator).await;

    assert_eq!(handle.end_reason(), Some(EndReason::Failed));
    assert!(matches!(
        handle.last_error().as_deref(),
        Some(UnitError::Unsuccessful)
    ));
    assert_eq!(second.core().end_reason(), Some(EndReason::NeverStarted));
    assert_eq!(third.core().end_reason(), Some(EndReason::NeverStarted));
    assert_eq!(*log.lock().unwrap(), vec![1]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_request_on_batch_host_is_not_supported() {
    let orchestrator = orchestrator(2);
    let log = Arc::new(Mutex::new(Vec::new()));
    let gauge = Arc::new(Gauge::default());

    let asker = Arc::new(Asker {
        core: UnitCore::new(),
        error: Mutex::new(None),
    });
    let asking = orchestrator
        .submit(asker.clone(), SubmitOptions::default())
        .unwrap();
    let sibling = orchestrator
        .submit(Arc::new(Marker::new(0, &log, &gauge)), SubmitOptions::default())
        .unwrap();

    join(&orchestrator).await;

    assert!(asker
        .error
        .lock()
        .unwrap()
        .as_ref()
        .is_some_and(HostError::is_not_supported));
    assert_eq!(asking.end_reason(), Some(EndReason::Failed));
    assert_eq!(sibling.end_reason(), Some(EndReason::Completed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_found_race_has_one_winner() {
    let orchestrator = orchestrator(4);
    let parent = Arc::new(RaceParent {
        core: UnitCore::new(),
        children: 256,
        latch: FoundLatch::new(),
        claims: AtomicUsize::new(0),
        winner: Mutex::new(None),
        handles: Mutex::new(Vec::new()),
    });
    let handle = orchestrator
        .submit(parent.clone(), SubmitOptions::default())
        .unwrap();
    join(&orchestrator).await;

    assert_eq!(handle.end_reason(), Some(EndReason::Completed));
    assert!(parent.latch.is_claimed());
    assert_eq!(parent.claims.load(Ordering::SeqCst), 1);
    assert!(parent.winner.lock().unwrap().is_some());

    let children = parent.handles.lock().unwrap();
    assert_eq!(children.len(), 256);
    assert!(children.iter().all(|child| child.state().is_terminal()));
    assert!(children.iter().all(|child| child.last_error().is_none()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_all_through_root_host() {
    struct Recorder(Mutex<Vec<AggregateProgress>>);

    impl ProgressReporter for Recorder {
        fn report(&self, progress: &AggregateProgress) {
            self.0.lock().unwrap().push(progress.clone());
        }
    }

    let root = RootHost::new(orchestrator(2));
    let first = root.launch(Sleeper::new()).unwrap();
    let second = root.launch(Sleeper::new()).unwrap();
    let third = root.launch(Sleeper::new()).unwrap();

    let orchestrator = root.orchestrator().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        orchestrator.cancel_all();
    });

    let recorder = Recorder(Mutex::new(Vec::new()));
    tokio::time::timeout(TEST_TIMEOUT, root.run(&CancellationToken::new(), &recorder))
        .await
        .expect("run timed out")
        .unwrap();

    for handle in [&first, &second, &third] {
        assert!(matches!(
            handle.end_reason(),
            Some(EndReason::Canceled) | Some(EndReason::NeverStarted)
        ));
    }
    let reports = recorder.0.lock().unwrap();
    assert!(reports.last().is_some_and(AggregateProgress::is_idle));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parent_cancel_reaches_grandchildren() {
    for scoped in [false, true] {
        let orchestrator = orchestrator(4);
        let handles = Arc::new(Mutex::new(Vec::new()));
        let top = orchestrator
            .submit(Nest::new(3, scoped, &handles), SubmitOptions::default())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        top.cancel();
        join(&orchestrator).await;

        assert_eq!(top.end_reason(), Some(EndReason::Canceled), "scoped: {scoped}");
        let descendants = handles.lock().unwrap();
        assert_eq!(descendants.len(), 3);
        for handle in descendants.iter() {
            assert_eq!(handle.end_reason(), Some(EndReason::Canceled), "scoped: {scoped}");
        }
        // Scopes close with the units that opened them.
        assert_eq!(orchestrator.scope_count(), 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_child_cannot_join_a_foreign_scope() {
    let orchestrator = orchestrator(2);
    let scope = orchestrator.open_scope();
    let parent = Arc::new(Trespasser {
        core: UnitCore::new(),
        scope: scope.clone(),
        error: Mutex::new(None),
    });
    let handle = orchestrator
        .submit(parent.clone(), SubmitOptions::default())
        .unwrap();
    join(&orchestrator).await;

    assert_eq!(handle.end_reason(), Some(EndReason::Completed));
    assert_eq!(
        *parent.error.lock().unwrap(),
        Some(HostError::ForeignScope(scope.id()))
    );
    // Nothing was registered, so nothing escapes the parent's cancellation.
    assert_eq!(orchestrator.len(), 1);

    // The root may still use its own scope.
    let sleeper = orchestrator
        .submit(Sleeper::new(), SubmitOptions::default().in_scope(scope.clone()))
        .unwrap();
    assert!(orchestrator.cancel_scope(scope.id()).unwrap());
    join(&orchestrator).await;
    assert_eq!(sleeper.end_reason(), Some(EndReason::Canceled));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scope_cancel_leaves_outside_units_alone() {
    let orchestrator = orchestrator(4);
    let parent = Arc::new(SplitParent {
        core: UnitCore::new(),
        log: Arc::new(Mutex::new(Vec::new())),
        gauge: Arc::new(Gauge::default()),
        inside: Mutex::new(None),
        outside: Mutex::new(None),
    });
    let handle = orchestrator
        .submit(parent.clone(), SubmitOptions::default())
        .unwrap();
    join(&orchestrator).await;

    assert_eq!(handle.end_reason(), Some(EndReason::Completed));
    let inside = parent.inside.lock().unwrap();
    let outside = parent.outside.lock().unwrap();
    assert_eq!(
        inside.as_ref().and_then(UnitHandle::end_reason),
        Some(EndReason::Canceled)
    );
    assert_eq!(
        outside.as_ref().and_then(UnitHandle::end_reason),
        Some(EndReason::Completed)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_detached_work_from_a_unit_blocks_join() {
    let orchestrator = orchestrator(1);
    let flushed = Arc::new(AtomicUsize::new(0));
    let handle = orchestrator
        .submit(
            Arc::new(Detacher {
                core: UnitCore::new(),
                flushed: Arc::clone(&flushed),
            }),
            SubmitOptions::default(),
        )
        .unwrap();
    join(&orchestrator).await;

    assert_eq!(handle.end_reason(), Some(EndReason::Completed));
    assert_eq!(flushed.load(Ordering::SeqCst), 1);
    assert_eq!(orchestrator.pending_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_joining_parent_is_not_counted_as_running() {
    let orchestrator = orchestrator(2);
    let log = Arc::new(Mutex::new(Vec::new()));
    let gauge = Arc::new(Gauge::default());
    let handle = orchestrator
        .submit(
            Arc::new(FanOut {
                core: UnitCore::new(),
                children: 6,
                log: Arc::clone(&log),
                gauge: Arc::clone(&gauge),
            }),
            SubmitOptions::default(),
        )
        .unwrap();

    let mut saw_joining = false;
    while !handle.state().is_terminal() {
        let progress = orchestrator.progress();
        assert!(progress.running <= 2, "running: {}", progress.running);
        saw_joining |= progress.joining == 1;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    join(&orchestrator).await;

    assert!(saw_joining);
    assert_eq!(handle.end_reason(), Some(EndReason::Completed));
    assert_eq!(gauge.peak.load(Ordering::SeqCst), 2);
    assert_eq!(orchestrator.running_count(), 0);
    assert_eq!(orchestrator.progress().joining, 0);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_join_does_not_leak_running_count() {
    let orchestrator = orchestrator(1);
    let log = Arc::new(Mutex::new(Vec::new()));
    let gauge = Arc::new(Gauge::default());
    let stop = CancellationToken::new();

    let impatient = orchestrator
        .submit(
            Arc::new(Impatient {
                core: UnitCore::new(),
                stop: stop.clone(),
                log: Arc::clone(&log),
                gauge: Arc::clone(&gauge),
            }),
            SubmitOptions::default(),
        )
        .unwrap();

    // Queued behind the child, so the parent has to wait for a slot after
    // its child finishes. The slot is handed over as this unit finishes,
    // in the same step that tells the parent to stop waiting.
    tokio::time::sleep(Duration::from_millis(5)).await;
    let holder = orchestrator
        .submit(
            Arc::new(Holder {
                core: UnitCore::new(),
                delay: Duration::from_millis(30),
                done: stop,
            }),
            SubmitOptions::default(),
        )
        .unwrap();
    join(&orchestrator).await;

    assert_eq!(impatient.end_reason(), Some(EndReason::Completed));
    assert_eq!(holder.end_reason(), Some(EndReason::Completed));
    assert_eq!(orchestrator.running_count(), 0);
    assert_eq!(orchestrator.peak_running(), 1);

    // The gate still has its slot.
    let after = orchestrator
        .submit(Arc::new(Marker::new(2, &log, &gauge)), SubmitOptions::default())
        .unwrap();
    join(&orchestrator).await;
    assert_eq!(after.end_reason(), Some(EndReason::Completed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_root_host_capabilities() {
    let handler = Arc::new(AlwaysYes {
        seen: Mutex::new(Vec::new()),
    });
    let root = RootHost::new(Orchestrator::with_parts(
        OrchestratorConfig::with_max_concurrent(2),
        Arc::new(NullTelemetrySink),
        Some(handler.clone() as Arc<dyn RequestHandler>),
    ));
    let host: &dyn HostCapability = &root;
    let log = Arc::new(Mutex::new(Vec::new()));
    let gauge = Arc::new(Gauge::default());

    // Requests from the root and from units reach the handler.
    assert!(host.request(Confirm).await.unwrap());
    let asker = Arc::new(Asker {
        core: UnitCore::new(),
        error: Mutex::new(None),
    });
    let asking = host.submit_child(asker.clone(), SubmitOptions::default()).unwrap();

    // Children of the root and its scopes.
    let marker = host
        .submit_child(Arc::new(Marker::new(0, &log, &gauge)), SubmitOptions::default())
        .unwrap();
    let scope = host.open_scope().unwrap();
    let scoped = host
        .submit_child(Sleeper::new(), SubmitOptions::default().in_scope(scope.clone()))
        .unwrap();
    assert!(host.cancel_scope(&scope).unwrap());
    tokio::time::timeout(TEST_TIMEOUT, host.join_children())
        .await
        .expect("join timed out")
        .unwrap();

    assert_eq!(asking.end_reason(), Some(EndReason::Completed));
    assert!(asker.error.lock().unwrap().is_none());
    assert_eq!(marker.end_reason(), Some(EndReason::Completed));
    assert_eq!(scoped.end_reason(), Some(EndReason::Canceled));
    {
        let seen = handler.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], None);
        assert_eq!(seen[1], Some(asking.id().to_string()));
    }

    assert!(host.close_scope(&scope).unwrap());
    assert!(!host.close_scope(&scope).unwrap());
    assert_eq!(root.orchestrator().scope_count(), 0);

    // The root's cancellation handle is the orchestrator's root token.
    let late = host.submit_child(Sleeper::new(), SubmitOptions::default()).unwrap();
    host.cancellation_handle().cancel();
    assert!(root.orchestrator().root_token().is_cancelled());
    tokio::time::timeout(TEST_TIMEOUT, host.join_children())
        .await
        .expect("join timed out")
        .unwrap();
    assert_eq!(late.end_reason(), Some(EndReason::Canceled));
}
