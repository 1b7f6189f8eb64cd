//! End-to-end lifecycle runs against a scripted dataset source.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use formats::{DistrictRecord, Site};
use foundation::SessionClock;
use lifecycle::{
    Completion, ControllerConfig, DataOrigin, DatasetFetcher, DatasetSource, ExternalSignal,
    FetchError, HeadlessBackend, LifecycleController, LifecycleState, ManualSignals, MapSession,
    MemoryScope, Outcome, SampleDataset, StatusLevel, Trigger, Visibility,
};
use pretty_assertions::assert_eq;
use runtime::{LocalBoxFuture, TokioExecutor};
use serde_json::json;
use tokio::sync::oneshot;
use tokio::task::LocalSet;

struct Round {
    sites: Result<usize, FetchError>,
    districts: usize,
    gate: Option<oneshot::Receiver<()>>,
}

impl Round {
    fn ok(sites: usize, districts: usize) -> Self {
        Self {
            sites: Ok(sites),
            districts,
            gate: None,
        }
    }

    fn failing() -> Self {
        Self {
            sites: Err(FetchError::Network {
                resource: "sites",
                message: "connection refused".into(),
            }),
            districts: 0,
            gate: None,
        }
    }

    fn gated(mut self, gate: oneshot::Receiver<()>) -> Self {
        self.gate = Some(gate);
        self
    }
}

/// Answers each fetch with the next queued [`Round`]; 10 sites and 6 districts
/// once the queue is empty.
#[derive(Default, Clone)]
struct ScriptedSource {
    rounds: Rc<RefCell<VecDeque<Round>>>,
    districts: Rc<RefCell<VecDeque<usize>>>,
    fetches: Rc<RefCell<usize>>,
}

impl ScriptedSource {
    fn push(&self, round: Round) {
        self.rounds.borrow_mut().push_back(round);
    }

    fn fetches(&self) -> usize {
        *self.fetches.borrow()
    }
}

fn site(id: i64) -> Site {
    Site {
        id,
        name: format!("Site {id}"),
        description: None,
        latitude: 23.0 + id as f64 * 0.1,
        longitude: 85.0,
        district: "Ranchi".into(),
        category: Some("Heritage".into()),
        image_url: None,
        rating: 4.0,
        created_at: None,
    }
}

fn district(id: i64) -> DistrictRecord {
    let x = 84.0 + id as f64 * 0.5;
    DistrictRecord {
        id,
        name: format!("District {id}"),
        geojson_data: json!({
            "type": "Feature",
            "properties": {"name": format!("District {id}")},
            "geometry": {"type": "Polygon", "coordinates": [[[x, 23.0], [x + 0.4, 23.0], [x + 0.4, 23.4], [x, 23.0]]]}
        }),
        population: None,
        area: None,
        created_at: None,
    }
}

impl DatasetSource for ScriptedSource {
    fn sites(&self) -> LocalBoxFuture<'_, Result<Vec<Site>, FetchError>> {
        *self.fetches.borrow_mut() += 1;
        let round = self
            .rounds
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Round::ok(10, 6));
        self.districts.borrow_mut().push_back(round.districts);
        Box::pin(async move {
            if let Some(gate) = round.gate {
                let _ = gate.await;
            }
            round
                .sites
                .map(|n| (1..=n as i64).map(site).collect())
        })
    }

    fn districts(&self) -> LocalBoxFuture<'_, Result<Vec<DistrictRecord>, FetchError>> {
        let n = self.districts.borrow_mut().pop_front().unwrap_or(6);
        Box::pin(async move { Ok((1..=n as i64).map(district).collect()) })
    }
}

struct Page {
    session: MapSession<HeadlessBackend>,
    source: ScriptedSource,
    backend: HeadlessBackend,
    scope: MemoryScope,
}

fn page(config: ControllerConfig) -> Page {
    let source = ScriptedSource::default();
    let backend = HeadlessBackend::new();
    let scope = MemoryScope::new();
    let controller = LifecycleController::new(config, backend.clone(), scope.clone(), SampleDataset)
        .with_clock(SessionClock::counting());
    let session = MapSession::new(
        controller,
        DatasetFetcher::new(Rc::new(source.clone())),
        Rc::new(TokioExecutor),
    );
    Page {
        session,
        source,
        backend,
        scope,
    }
}

fn transitions(page: &Page) -> Vec<String> {
    page.session.with_controller(|c| {
        c.events()
            .messages_of("transition")
            .into_iter()
            .map(str::to_string)
            .collect()
    })
}

#[tokio::test(start_paused = true)]
async fn fresh_mount_binds_all_sites_and_districts() {
    let page = page(ControllerConfig::default());
    let outcome = page.session.dispatch(Trigger::Mount).await;
    assert!(matches!(
        outcome,
        Outcome::Completed(Completion::Ready {
            origin: DataOrigin::Live,
            ..
        })
    ));

    assert_eq!(
        transitions(&page),
        vec![
            "unmounted -> preparing (mount)".to_string(),
            "preparing -> ready (fetch complete)".to_string(),
        ]
    );
    let built = page.backend.last_constructed().expect("instance");
    assert_eq!((built.markers, built.boundaries), (10, 6));
    let status = page.session.map_status();
    assert!(status.ready);
    assert_eq!(status.first_site.as_deref(), Some("Site 1"));
}

#[tokio::test(start_paused = true)]
async fn refresh_replaces_handle_with_latest_data() {
    let page = page(ControllerConfig::default());
    page.session.dispatch(Trigger::Mount).await;
    let (first_handle, first_session) =
        page.session.with_controller(|c| (c.handle_id(), c.session()));

    page.source.push(Round::ok(3, 2));
    page.session.dispatch(Trigger::Refresh).await;

    page.session.with_controller(|c| {
        assert_eq!(c.state(), LifecycleState::Ready);
        assert!(c.session() > first_session);
        assert_ne!(c.handle_id(), first_handle);
        assert_eq!(c.map_status().sites, 3);
    });
    assert_eq!(page.backend.released(), 1);
    assert_eq!(page.backend.live_count(), 1);
    assert_eq!(page.backend.max_live(), 1);
    assert_eq!(page.backend.last_constructed().map(|i| i.markers), Some(3));
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_reaches_ready_with_sample_data() {
    let page = page(ControllerConfig::default());
    page.source.push(Round::failing());
    page.session.dispatch(Trigger::Mount).await;

    assert_eq!(
        transitions(&page),
        vec![
            "unmounted -> preparing (mount)".to_string(),
            "preparing -> ready (fetch complete)".to_string(),
        ]
    );
    let status = page.session.map_status();
    assert_eq!(status.origin, Some(DataOrigin::Fallback));
    assert_eq!((status.sites, status.features), (2, 1));
    let line = status.status.expect("status line");
    assert_eq!(line.level, StatusLevel::Warning);
    assert!(line.text.contains("using sample data"));
}

#[tokio::test(start_paused = true)]
async fn hidden_then_visible_rebuilds_the_map() {
    let page = page(ControllerConfig::default());
    let local = LocalSet::new();
    local
        .run_until(async {
            let signals = ManualSignals::new();
            page.session
                .attach_signals(signals.clone())
                .expect("attach");
            page.session.dispatch(Trigger::Mount).await;
            let before = page.session.with_controller(|c| c.handle_id());

            signals.emit(ExternalSignal::Visibility(Visibility::Hidden));
            tokio::time::sleep(Duration::from_secs(1)).await;
            assert_eq!(page.session.with_controller(|c| c.handle_id()), before);

            signals.emit(ExternalSignal::Visibility(Visibility::Visible));
            tokio::time::sleep(Duration::from_secs(1)).await;
            let after = page.session.with_controller(|c| c.handle_id());
            assert_eq!(page.session.state(), LifecycleState::Ready);
            assert!(after.is_some());
            assert_ne!(after, before);
            assert_eq!(page.source.fetches(), 2);
            assert_eq!(page.backend.max_live(), 1);

            page.session.dispatch(Trigger::Teardown).await;
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn unmount_then_mount_yields_one_cycle() {
    let page = page(ControllerConfig::default());
    let (release, gate) = oneshot::channel();
    page.source.push(Round::ok(10, 6).gated(gate));
    page.source.push(Round::ok(4, 2));

    let first = page.session.dispatch(Trigger::Mount);
    let second = async {
        // Let the first mount get into its fetch.
        tokio::time::sleep(Duration::from_millis(100)).await;
        page.session.dispatch(Trigger::Unmount).await;
        let outcome = page.session.dispatch(Trigger::Mount).await;
        let _ = release.send(());
        outcome
    };
    let (first, second) = tokio::join!(first, second);

    assert!(matches!(first, Outcome::Completed(Completion::Stale { .. })));
    assert!(matches!(second, Outcome::Completed(Completion::Ready { .. })));
    assert_eq!(page.backend.constructed().len(), 1);
    assert_eq!(page.backend.live_count(), 1);
    assert_eq!(page.session.map_status().sites, 4);
    let ready_cycles = transitions(&page)
        .iter()
        .filter(|t| t.starts_with("preparing -> ready"))
        .count();
    assert_eq!(ready_cycles, 1);
}

#[tokio::test(start_paused = true)]
async fn refresh_during_settle_supersedes() {
    let page = page(ControllerConfig::default());
    let first = page.session.dispatch(Trigger::Mount);
    let second = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        page.session.dispatch(Trigger::Refresh).await
    };
    let (first, second) = tokio::join!(first, second);
    assert!(matches!(first, Outcome::Superseded(_)));
    assert!(matches!(second, Outcome::Completed(Completion::Ready { .. })));
    assert_eq!(page.source.fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn teardown_leaves_no_listeners_or_handles() {
    let page = page(ControllerConfig::default());
    let local = LocalSet::new();
    local
        .run_until(async {
            let signals = ManualSignals::new();
            page.session
                .attach_signals(signals.clone())
                .expect("attach");
            page.session.dispatch(Trigger::Mount).await;
            assert_eq!(signals.listener_count(), 2);

            signals.emit(ExternalSignal::PageHide);
            tokio::time::sleep(Duration::from_secs(1)).await;

            assert_eq!(signals.listener_count(), 0);
            assert_eq!(signals.removals(), 2);
            assert!(!page.session.signals_attached());
            assert_eq!(page.backend.live_count(), 0);
            assert!(page.scope.is_pristine());
            assert!(page.session.with_controller(|c| c.is_detached()));

            // A second teardown finds nothing left to remove.
            page.session.dispatch(Trigger::Teardown).await;
            assert_eq!(signals.removals(), 2);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn signal_dispatches_notify_the_observer() {
    let page = page(ControllerConfig::default());
    let seen: Rc<RefCell<Vec<(String, bool)>>> = Rc::default();
    let log = seen.clone();
    page.session.on_dispatched(move |controller, _| {
        let text = controller.status().map(|s| s.text.clone()).unwrap_or_default();
        log.borrow_mut().push((text, controller.is_detached()));
    });

    let local = LocalSet::new();
    local
        .run_until(async {
            let signals = ManualSignals::new();
            page.session
                .attach_signals(signals.clone())
                .expect("attach");
            page.session.dispatch(Trigger::Mount).await;

            page.source.push(Round::failing());
            signals.emit(ExternalSignal::Visibility(Visibility::Visible));
            tokio::time::sleep(Duration::from_secs(1)).await;

            signals.emit(ExternalSignal::PageHide);
            tokio::time::sleep(Duration::from_secs(1)).await;
        })
        .await;

    let seen = seen.borrow();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0], ("loaded 10 sites and 6 districts".to_string(), false));
    assert!(seen[1].0.starts_with("using sample data"));
    assert!(!seen[1].1);
    assert!(seen[2].1);
}

#[tokio::test(start_paused = true)]
async fn hung_fetch_times_out_when_configured() {
    let config = ControllerConfig {
        fallback_enabled: false,
        fetch_timeout: Some(Duration::from_millis(200)),
        ..ControllerConfig::default()
    };
    let page = page(config);
    let (_never, gate) = oneshot::channel::<()>();
    page.source.push(Round::ok(1, 1).gated(gate));

    let outcome = page.session.dispatch(Trigger::Mount).await;
    assert_eq!(
        outcome,
        Outcome::Completed(Completion::Failed(
            "failed to load map data: fetch timed out after 200 ms".into()
        ))
    );
    assert_eq!(page.session.state(), LifecycleState::Error);
}

#[tokio::test(start_paused = true)]
async fn conflict_needs_unmount_and_mount() {
    let page = page(ControllerConfig::default());
    page.scope.claim_externally("map");
    let outcome = page.session.dispatch(Trigger::Mount).await;
    assert!(matches!(outcome, Outcome::Completed(Completion::Failed(_))));
    assert_eq!(page.session.state(), LifecycleState::Error);

    page.scope.release_externally("map");
    assert_eq!(
        page.session.dispatch(Trigger::Mount).await,
        Outcome::Idle(LifecycleState::Error)
    );
    assert_eq!(
        page.session
            .dispatch(Trigger::VisibilityChanged(Visibility::Visible))
            .await,
        Outcome::Idle(LifecycleState::Error)
    );
    page.session.dispatch(Trigger::Unmount).await;
    page.session.dispatch(Trigger::Mount).await;
    assert_eq!(page.session.state(), LifecycleState::Ready);
}

/// Interleaves triggers and out-of-order fetch completions and checks that at
/// most one instance is ever live and stale results change nothing.
#[test]
fn arbitrary_interleavings_keep_one_live_handle() {
    use lifecycle::{Directive, FallbackProvider, Fetched};

    let triggers = [
        Trigger::Mount,
        Trigger::Unmount,
        Trigger::Clear,
        Trigger::Refresh,
        Trigger::VisibilityChanged(Visibility::Visible),
        Trigger::VisibilityChanged(Visibility::Hidden),
    ];

    for seed in 1..=64u64 {
        let backend = HeadlessBackend::new();
        let scope = MemoryScope::new();
        let mut controller = LifecycleController::new(
            ControllerConfig::default(),
            backend.clone(),
            scope.clone(),
            SampleDataset,
        )
        .with_clock(SessionClock::counting());
        let mut pending = Vec::new();
        let mut rng = seed;
        let mut next = move || {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (rng >> 33) as usize
        };

        for _ in 0..200 {
            let roll = next();
            if roll % 3 == 0 && !pending.is_empty() {
                let index = next() % pending.len();
                let session = pending.swap_remove(index);
                let before = (controller.state(), controller.handle_id());
                let stale = session != controller.session();
                let result = if next() % 4 == 0 {
                    Err(FetchError::TimedOut { after_ms: 1 })
                } else {
                    Ok(SampleDataset.provide().expect("sample"))
                };
                controller.complete_fetch(Fetched { session, result });
                if stale {
                    assert_eq!((controller.state(), controller.handle_id()), before);
                }
            } else if let Directive::Fetch(session) =
                controller.apply(triggers[next() % triggers.len()])
            {
                pending.push(session);
            }
            controller.deliver_ready();

            assert!(backend.live_count() <= 1, "seed {seed}");
            assert_eq!(
                controller.state() == LifecycleState::Ready,
                controller.handle_id().is_some(),
                "seed {seed}"
            );
        }

        controller.apply(Trigger::Teardown);
        assert_eq!(backend.live_count(), 0);
        assert!(scope.is_pristine());
    }
}
