// tests/feeders.rs

use std::error::Error;
use std::future::ready;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use convoy::convoy::{load_convoy, StrandedConvoy};
use convoy::engine::{
    ConvoyManager, EngineContext, EventFeeder, ManagerSettings, ScanCadence, SharedContext,
    StoreAcquirer, StoreMap, StrandedScanner,
};
use convoy::errors::ConvoyError;
use convoy::routing::Routes;
use convoy::store::{
    BackingStore, DepEdge, EventKind, EventLog, ItemFilter, MemoryStore, NewItem, StoreEvent,
    StoreFuture, StoreSet, WorkItem, WorkStore,
};
use convoy::types::{ConvoyStatus, ItemStatus};
use convoy_test_utils::{init_tracing, routes, with_timeout, FakeDispatcher, StoreBuilder};

type TestResult = Result<(), Box<dyn Error>>;

/// Three stores named after their targets so that pausing a target also
/// pauses polling of its store.
struct Fleet {
    hq: Arc<MemoryStore>,
    gastown: Arc<MemoryStore>,
    beads: Arc<MemoryStore>,
    routes: Routes,
}

impl Fleet {
    fn new(hq: StoreBuilder, gastown: StoreBuilder, beads: StoreBuilder, paused: &[&str]) -> Self {
        Self {
            hq: hq.build_arc(),
            gastown: gastown.build_arc(),
            beads: beads.build_arc(),
            routes: routes(
                "hq",
                &[
                    ("gt-", "gastown", Some("gastown")),
                    ("bd-", "beads", Some("beads")),
                ],
                paused,
            ),
        }
    }

    fn stores(&self) -> StoreMap {
        let mut map = StoreMap::new();
        map.insert("hq".to_string(), self.hq.clone() as Arc<dyn BackingStore>);
        map.insert("gastown".to_string(), self.gastown.clone() as Arc<dyn BackingStore>);
        map.insert("beads".to_string(), self.beads.clone() as Arc<dyn BackingStore>);
        map
    }

    fn set(&self) -> StoreSet {
        StoreSet::new(self.stores(), self.routes.clone())
    }

    fn acquirer(&self) -> StoreAcquirer {
        let stores = self.stores();
        Arc::new(move || Ok(stores.clone()))
    }

    /// A dispatcher that hooks what it dispatches in these stores.
    fn dispatcher(&self) -> FakeDispatcher {
        FakeDispatcher::with_store(Arc::new(self.set()))
    }

    fn context(&self, dispatcher: &FakeDispatcher) -> SharedContext {
        Arc::new(EngineContext::new(
            self.acquirer(),
            self.routes.clone(),
            Arc::new(dispatcher.clone()),
            fast_settings(),
        ))
    }
}

fn fast_settings() -> ManagerSettings {
    ManagerSettings {
        poll_interval: Duration::from_millis(20),
        store_timeout: Duration::from_secs(1),
        scan_interval: Duration::from_secs(3600),
        recovery_interval: Duration::from_millis(30),
        startup_grace: Duration::from_secs(3600),
    }
}

/// An open convoy over three stores:
/// gt-b waits on gt-a, bd-c waits on gt-b. gt-a is being worked on.
fn relay() -> Fleet {
    Fleet::new(
        StoreBuilder::new("hq-").convoy("hq-cv-1", ConvoyStatus::Open, &["gt-a", "gt-b", "bd-c"]),
        StoreBuilder::new("gt-")
            .task("gt-a")
            .task("gt-b")
            .blocked_by("gt-b", "gt-a")
            .status("gt-a", ItemStatus::Hooked),
        StoreBuilder::new("bd-").task("bd-c").blocked_by("bd-c", "gt-b"),
        &[],
    )
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    with_timeout(async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}

#[tokio::test]
async fn close_in_one_store_feeds_the_next_item() -> TestResult {
    init_tracing();
    let fleet = relay();
    let dispatcher = fleet.dispatcher();
    let feeder = EventFeeder::new(fleet.context(&dispatcher));

    let warm = feeder.poll_once().await;
    assert_eq!(warm.warmed.len(), 3);
    assert!(feeder.is_warmed_up());
    assert_eq!(feeder.mark("gastown"), Some(fleet.gastown.last_ordinal()));

    fleet.gastown.set_status("gt-a", ItemStatus::Closed).await?;
    let summary = feeder.poll_once().await;
    assert_eq!(summary.closes, vec!["gt-a".to_string()]);
    assert_eq!(
        summary.dispatched,
        vec![("hq-cv-1".to_string(), "gt-b".to_string())]
    );
    assert_eq!(
        dispatcher.dispatched(),
        vec![("gt-b".to_string(), "gastown".to_string())]
    );

    // The next close crosses into the other store.
    fleet.gastown.set_status("gt-b", ItemStatus::Closed).await?;
    let summary = feeder.poll_once().await;
    assert_eq!(
        summary.dispatched,
        vec![("hq-cv-1".to_string(), "bd-c".to_string())]
    );

    // Last close triggers the auto-close check.
    fleet.beads.set_status("bd-c", ItemStatus::Closed).await?;
    let summary = feeder.poll_once().await;
    assert!(summary.dispatched.is_empty());
    assert_eq!(summary.close_checks, vec!["hq-cv-1".to_string()]);
    assert_eq!(
        load_convoy(&fleet.set(), "hq-cv-1").await?.status,
        ConvoyStatus::Closed
    );
    Ok(())
}

#[tokio::test]
async fn warm_up_skips_history() -> TestResult {
    init_tracing();
    let fleet = relay();
    let dispatcher = fleet.dispatcher();
    let feeder = EventFeeder::new(fleet.context(&dispatcher));

    // Closed before the feeder ever looked.
    fleet.gastown.set_status("gt-a", ItemStatus::Closed).await?;

    let first = feeder.poll_once().await;
    assert!(first.closes.is_empty());
    let second = feeder.poll_once().await;
    assert!(second.closes.is_empty());
    assert!(dispatcher.dispatched().is_empty());
    Ok(())
}

#[tokio::test]
async fn replayed_close_is_processed_once() -> TestResult {
    init_tracing();
    let fleet = relay();
    let dispatcher = fleet.dispatcher();
    let feeder = EventFeeder::new(fleet.context(&dispatcher));
    feeder.poll_once().await;

    fleet.gastown.set_status("gt-a", ItemStatus::Closed).await?;
    // The same transition delivered twice in one batch, and again later.
    fleet.gastown.push_event(EventKind::StatusChanged, "gt-a", Some("closed"));
    feeder.poll_once().await;
    fleet.gastown.push_event(EventKind::Closed, "gt-a", Some("closed"));
    let again = feeder.poll_once().await;

    assert!(again.closes.is_empty());
    assert_eq!(dispatcher.dispatched_items(), vec!["gt-b".to_string()]);
    Ok(())
}

#[tokio::test]
async fn close_reported_by_two_stores_is_handled_once() -> TestResult {
    init_tracing();
    let fleet = relay();
    let dispatcher = fleet.dispatcher();
    let feeder = EventFeeder::new(fleet.context(&dispatcher));
    feeder.poll_once().await;

    // gastown owns gt-a; hq mirrors the same close in its own log.
    fleet.gastown.set_status("gt-a", ItemStatus::Closed).await?;
    fleet.hq.push_event(EventKind::Closed, "gt-a", Some("closed"));
    let summary = feeder.poll_once().await;

    assert_eq!(summary.closes, vec!["gt-a".to_string()]);
    assert_eq!(
        dispatcher.dispatched(),
        vec![("gt-b".to_string(), "gastown".to_string())]
    );
    Ok(())
}

/// Delegates to a memory store, but item reads fail while `failing` is set.
#[derive(Debug)]
struct FlakyReads {
    inner: Arc<MemoryStore>,
    failing: AtomicBool,
}

impl WorkStore for FlakyReads {
    fn get(&self, id: &str) -> StoreFuture<'_, Option<WorkItem>> {
        if self.failing.load(Ordering::SeqCst) {
            return Box::pin(ready(Err(ConvoyError::Store("read refused".to_string()))));
        }
        self.inner.get(id)
    }

    fn create(&self, item: NewItem) -> StoreFuture<'_, WorkItem> {
        self.inner.create(item)
    }

    fn set_status(&self, id: &str, status: ItemStatus) -> StoreFuture<'_, ()> {
        self.inner.set_status(id, status)
    }

    fn add_dependency(&self, edge: DepEdge) -> StoreFuture<'_, ()> {
        self.inner.add_dependency(edge)
    }

    fn dependencies_of(&self, id: &str) -> StoreFuture<'_, Vec<DepEdge>> {
        self.inner.dependencies_of(id)
    }

    fn dependents_of(&self, id: &str) -> StoreFuture<'_, Vec<DepEdge>> {
        self.inner.dependents_of(id)
    }

    fn list(&self, filter: ItemFilter) -> StoreFuture<'_, Vec<WorkItem>> {
        self.inner.list(filter)
    }
}

impl EventLog for FlakyReads {
    fn events_since(&self, after: u64) -> StoreFuture<'_, Vec<StoreEvent>> {
        self.inner.events_since(after)
    }
}

#[tokio::test]
async fn failed_close_handling_is_retried_next_cycle() -> TestResult {
    init_tracing();
    let fleet = relay();
    let hq = Arc::new(FlakyReads {
        inner: fleet.hq.clone(),
        failing: AtomicBool::new(false),
    });
    let mut stores = fleet.stores();
    stores.insert("hq".to_string(), hq.clone() as Arc<dyn BackingStore>);

    let dispatcher = fleet.dispatcher();
    let ctx: SharedContext = Arc::new(EngineContext::new(
        Arc::new(move || Ok(stores.clone())),
        fleet.routes.clone(),
        Arc::new(dispatcher.clone()),
        fast_settings(),
    ));
    let feeder = EventFeeder::new(ctx);
    feeder.poll_once().await;

    // The convoy lookup fails while the close is handled.
    hq.failing.store(true, Ordering::SeqCst);
    fleet.gastown.set_status("gt-a", ItemStatus::Closed).await?;
    let failed = feeder.poll_once().await;
    assert_eq!(failed.closes, vec!["gt-a".to_string()]);
    assert!(failed.dispatched.is_empty());

    // No new events, but the close is picked up again.
    hq.failing.store(false, Ordering::SeqCst);
    let retried = feeder.poll_once().await;
    assert_eq!(retried.closes, vec!["gt-a".to_string()]);
    assert_eq!(
        retried.dispatched,
        vec![("hq-cv-1".to_string(), "gt-b".to_string())]
    );

    let after = feeder.poll_once().await;
    assert!(after.closes.is_empty());
    assert_eq!(dispatcher.dispatched_items(), vec!["gt-b".to_string()]);
    Ok(())
}

#[tokio::test]
async fn stores_that_appear_later_are_acquired() -> TestResult {
    init_tracing();
    let fleet = relay();
    let beads_ready = Arc::new(AtomicBool::new(false));
    let acquirer: StoreAcquirer = {
        let stores = fleet.stores();
        let ready = beads_ready.clone();
        Arc::new(move || {
            let mut map = stores.clone();
            if !ready.load(Ordering::SeqCst) {
                map.remove("beads");
            }
            Ok(map)
        })
    };
    let dispatcher = fleet.dispatcher();
    let ctx: SharedContext = Arc::new(EngineContext::new(
        acquirer,
        fleet.routes.clone(),
        Arc::new(dispatcher.clone()),
        fast_settings(),
    ));
    let feeder = EventFeeder::new(ctx.clone());

    let first = feeder.poll_once().await;
    assert_eq!(first.warmed, vec!["gastown".to_string(), "hq".to_string()]);
    assert_eq!(feeder.mark("beads"), None);

    beads_ready.store(true, Ordering::SeqCst);
    let second = feeder.poll_once().await;
    assert_eq!(second.warmed, vec!["beads".to_string()]);
    assert!(ctx.snapshot().contains_key("beads"));

    fleet.beads.set_status("bd-c", ItemStatus::Closed).await?;
    let third = feeder.poll_once().await;
    assert_eq!(third.closes, vec!["bd-c".to_string()]);
    Ok(())
}

#[tokio::test]
async fn staged_convoys_are_never_fed() -> TestResult {
    init_tracing();
    let fleet = Fleet::new(
        StoreBuilder::new("hq-").convoy("hq-cv-1", ConvoyStatus::StagedReady, &["gt-a", "gt-b"]),
        StoreBuilder::new("gt-")
            .task("gt-a")
            .task("gt-b")
            .blocked_by("gt-b", "gt-a"),
        StoreBuilder::new("bd-"),
        &[],
    );
    let dispatcher = fleet.dispatcher();
    let feeder = EventFeeder::new(fleet.context(&dispatcher));
    feeder.poll_once().await;

    fleet.gastown.set_status("gt-a", ItemStatus::Closed).await?;
    let summary = feeder.poll_once().await;

    assert_eq!(summary.closes, vec!["gt-a".to_string()]);
    assert!(summary.dispatched.is_empty());
    assert!(dispatcher.checks().is_empty());
    Ok(())
}

#[tokio::test]
async fn paused_store_is_not_polled() -> TestResult {
    init_tracing();
    let fleet = Fleet::new(
        StoreBuilder::new("hq-").convoy("hq-cv-1", ConvoyStatus::Open, &["bd-a", "bd-b"]),
        StoreBuilder::new("gt-"),
        StoreBuilder::new("bd-").task("bd-a").task("bd-b"),
        &["beads"],
    );
    let dispatcher = fleet.dispatcher();
    let feeder = EventFeeder::new(fleet.context(&dispatcher));
    feeder.poll_once().await;

    fleet.beads.set_status("bd-a", ItemStatus::Closed).await?;
    let summary = feeder.poll_once().await;

    assert!(summary.closes.is_empty());
    assert_eq!(feeder.mark("beads"), None);
    assert!(dispatcher.dispatched().is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_poll_enters_recovery_and_scan_leaves_it() -> TestResult {
    init_tracing();
    let fleet = relay();
    let dispatcher = fleet.dispatcher();
    let ctx = fleet.context(&dispatcher);
    let feeder = EventFeeder::new(ctx.clone());
    let scanner = StrandedScanner::new(ctx.clone());
    feeder.poll_once().await;

    fleet.beads.set_unavailable(true);
    let summary = feeder.poll_once().await;
    assert_eq!(summary.failed_stores, vec!["beads".to_string()]);
    assert!(ctx.in_recovery());

    fleet.beads.set_unavailable(false);
    scanner.scan().await?;
    assert!(!ctx.in_recovery());
    Ok(())
}

#[tokio::test]
async fn scanner_feeds_stranded_and_checks_finished_convoys() -> TestResult {
    init_tracing();
    let fleet = Fleet::new(
        StoreBuilder::new("hq-"),
        StoreBuilder::new("gt-").task("gt-x").task("gt-y"),
        StoreBuilder::new("bd-"),
        &[],
    );
    let dispatcher = FakeDispatcher::new();
    dispatcher.set_stranded(&[
        StrandedConvoy {
            convoy_id: "hq-cv-1".to_string(),
            title: "done".to_string(),
            ready_count: 0,
            ready_item_ids: Vec::new(),
        },
        StrandedConvoy {
            convoy_id: "hq-cv-2".to_string(),
            title: "stuck".to_string(),
            ready_count: 2,
            ready_item_ids: vec!["gt-x".to_string(), "gt-y".to_string()],
        },
    ]);
    let scanner = StrandedScanner::new(fleet.context(&dispatcher));

    let summary = scanner.scan().await?;

    assert_eq!(summary.stranded, 2);
    assert_eq!(summary.close_checks, vec!["hq-cv-1".to_string()]);
    // One item per convoy per scan.
    assert_eq!(
        summary.dispatched,
        vec![("hq-cv-2".to_string(), "gt-x".to_string())]
    );
    assert_eq!(dispatcher.checks(), vec!["hq-cv-1".to_string()]);
    Ok(())
}

#[tokio::test]
async fn scanner_dispatches_blind_when_the_store_is_down() -> TestResult {
    init_tracing();
    let fleet = Fleet::new(
        StoreBuilder::new("hq-"),
        StoreBuilder::new("gt-").task("gt-x"),
        StoreBuilder::new("bd-"),
        &[],
    );
    let dispatcher = FakeDispatcher::new();
    dispatcher.set_stranded(&[StrandedConvoy {
        convoy_id: "hq-cv-2".to_string(),
        title: String::new(),
        ready_count: 1,
        ready_item_ids: vec!["gt-x".to_string()],
    }]);
    let scanner = StrandedScanner::new(fleet.context(&dispatcher));
    fleet.gastown.set_unavailable(true);

    let summary = scanner.scan().await?;
    assert_eq!(summary.dispatched.len(), 1);
    Ok(())
}

#[tokio::test]
async fn unparseable_stranded_output_fails_the_scan() -> TestResult {
    init_tracing();
    let fleet = relay();
    let dispatcher = FakeDispatcher::new();
    dispatcher.set_stranded_raw("warning: config drift\n[]");
    let ctx = fleet.context(&dispatcher);
    let scanner = StrandedScanner::new(ctx.clone());
    ctx.set_recovery(true);

    let err = scanner.scan().await.unwrap_err();
    match err {
        ConvoyError::StrandedParse { first_line, .. } => {
            assert_eq!(first_line, "warning: config drift")
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(ctx.in_recovery());

    // Empty output is an empty list.
    dispatcher.set_stranded_raw("");
    let summary = scanner.scan().await?;
    assert_eq!(summary.stranded, 0);
    assert!(!ctx.in_recovery());
    Ok(())
}

#[tokio::test]
async fn manager_start_is_idempotent_and_stop_joins() -> TestResult {
    init_tracing();
    let fleet = relay();
    let dispatcher = fleet.dispatcher();
    let manager = ConvoyManager::new(
        fleet.acquirer(),
        fleet.routes.clone(),
        Arc::new(dispatcher.clone()),
        fast_settings(),
    );

    assert!(manager.start());
    assert!(!manager.start());
    assert_eq!(manager.cadence(), ScanCadence::Normal);

    // The scanner runs once right away.
    wait_until(|| dispatcher.stranded_calls() >= 1).await;

    with_timeout(manager.stop()).await;
    Ok(())
}

#[tokio::test]
async fn manager_feeds_on_close() -> TestResult {
    init_tracing();
    let fleet = relay();
    let dispatcher = fleet.dispatcher();
    let manager = ConvoyManager::new(
        fleet.acquirer(),
        fleet.routes.clone(),
        Arc::new(dispatcher.clone()),
        fast_settings(),
    );
    manager.start();
    wait_until(|| manager.feeder().is_warmed_up()).await;

    fleet.gastown.set_status("gt-a", ItemStatus::Closed).await?;
    wait_until(|| dispatcher.dispatched_items().contains(&"gt-b".to_string())).await;

    with_timeout(manager.stop()).await;
    Ok(())
}

#[tokio::test]
async fn recovery_shortens_the_scan_cadence() -> TestResult {
    init_tracing();
    let fleet = relay();
    let dispatcher = fleet.dispatcher();
    let manager = ConvoyManager::new(
        fleet.acquirer(),
        fleet.routes.clone(),
        Arc::new(dispatcher.clone()),
        fast_settings(),
    );
    manager.start();
    wait_until(|| dispatcher.stranded_calls() >= 1).await;
    wait_until(|| manager.feeder().is_warmed_up()).await;

    // With an hour-long normal interval, a second scan only happens on the
    // recovery cadence.
    fleet.beads.set_unavailable(true);
    wait_until(|| dispatcher.stranded_calls() >= 2).await;

    fleet.beads.set_unavailable(false);
    with_timeout(manager.stop()).await;
    Ok(())
}

#[tokio::test]
async fn startup_sweep_runs_after_the_grace_period() -> TestResult {
    init_tracing();
    let fleet = relay();
    let dispatcher = fleet.dispatcher();
    let settings = ManagerSettings {
        startup_grace: Duration::from_millis(30),
        ..fast_settings()
    };
    let manager = ConvoyManager::new(
        fleet.acquirer(),
        fleet.routes.clone(),
        Arc::new(dispatcher.clone()),
        settings,
    );
    manager.start();

    wait_until(|| dispatcher.stranded_calls() >= 2).await;
    assert!(!manager.in_recovery());

    with_timeout(manager.stop()).await;
    Ok(())
}
