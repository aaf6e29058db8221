use super::aggregate::ResultSource;
use super::*;
use crate::geo::Coordinate;
use crate::location::resolver::stub::StubResolver;
use crate::store::{MemoryStore, PersistenceError};
use async_trait::async_trait;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tokio::time::Instant;
use tokio::sync::broadcast::error::TryRecvError;

fn config() -> SessionConfig {
    SessionConfig {
        pacing: Duration::from_millis(1),
        event_capacity: 64,
    }
}

fn session_with(stub: StubResolver, store: Arc<MemoryStore>) -> (Session, Arc<StubResolver>) {
    let stub = Arc::new(stub);
    (Session::new(config(), stub.clone(), store), stub)
}

fn session(stub: StubResolver) -> (Session, Arc<StubResolver>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let (session, stub) = session_with(stub, store.clone());
    (session, stub, store)
}

fn paced_session(stub: StubResolver, pacing: Duration) -> (Session, Arc<StubResolver>) {
    let stub = Arc::new(stub);
    let config = SessionConfig {
        pacing,
        event_capacity: 64,
    };
    (Session::new(config, stub.clone(), Arc::new(MemoryStore::new())), stub)
}

fn names(session: &Session) -> Vec<String> {
    session.entries().into_iter().map(|e| e.name).collect()
}

fn drain_events(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn test_one_lookup_at_a_time_in_order() {
    let stub = StubResolver::default()
        .with_city("A", 0.0, 0.0)
        .with_city("B", 0.0, 10.0)
        .with_city("C", 10.0, 0.0)
        .with_delay(Duration::from_millis(5));
    let (s, stub, _) = session(stub);

    for name in ["A", "B", "C"] {
        s.add_city(name).unwrap();
    }
    assert_eq!(s.queue_state(), QueueState::Draining);
    s.wait_idle().await;

    assert_eq!(stub.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(*lock(&stub.forward_log), vec!["A", "B", "C"]);
    assert!(s.entries().iter().all(|e| e.coordinate().is_some()));
    assert_eq!(s.queue_state(), QueueState::Idle);
    assert_eq!(s.aggregate().unwrap().resolved_count, 3);
}

#[tokio::test]
async fn test_add_publishes_pending_entry_immediately() {
    let (s, _, _) = session(StubResolver::default().with_city("Oslo", 59.91, 10.75));
    let mut rx = s.subscribe();

    s.add_city("  Oslo ").unwrap();

    match rx.try_recv().unwrap() {
        SessionEvent::EntriesChanged(groups) => {
            assert_eq!(groups.len(), 1);
            assert_eq!(groups[0].name, "Oslo");
            assert!(groups[0].representative.is_pending());
        }
        other => panic!("unexpected event: {:?}", other),
    }
    s.wait_idle().await;
}

#[tokio::test]
async fn test_duplicate_names_resolved_by_one_lookup() {
    let (s, stub, _) = session(StubResolver::default().with_city("Paris", 48.8566, 2.3522));

    s.add_city("Paris").unwrap();
    s.add_city("paris").unwrap();
    s.wait_idle().await;

    assert_eq!(stub.forwards(), 1);
    let groups = s.grouped();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].count, 2);
    assert!(s.entries().iter().all(|e| !e.is_pending()));

    let legs = s.legs();
    assert_eq!(legs.len(), 1);
    assert_eq!(legs[0].count, 2);
}

#[tokio::test]
async fn test_failure_drops_only_that_name() {
    let (s, _, _) = session(StubResolver::default().with_city("Oslo", 59.91, 10.75));
    let mut rx = s.subscribe();

    s.add_city("Atlantis").unwrap();
    s.add_city("Oslo").unwrap();
    s.wait_idle().await;

    assert_eq!(names(&s), vec!["Oslo"]);
    assert!(s.entries()[0].coordinate().is_some());

    let errors: Vec<String> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::ResolutionError { name, message } => {
                assert!(message.contains("Atlantis"));
                Some(name)
            }
            _ => None,
        })
        .collect();
    assert_eq!(errors, vec!["Atlantis"]);
}

#[tokio::test]
async fn test_failure_is_retried_on_next_add() {
    let (s, stub, _) = session(StubResolver::default());

    s.add_city("Atlantis").unwrap();
    s.wait_idle().await;
    s.add_city("Atlantis").unwrap();
    s.wait_idle().await;

    assert_eq!(stub.forwards(), 2);
    assert!(s.entries().is_empty());
    assert!(s.aggregate().is_none());
}

#[tokio::test]
async fn test_open_water_centroid_moves_to_settlement() {
    let town = Coordinate::new(1.0, 4.0);
    let stub = StubResolver::default()
        .with_city("West", 0.0, 0.0)
        .with_city("East", 0.0, 10.0)
        .with_settlement(town, "Townsville");
    let (s, _, _) = session(stub);

    s.add_city("West").unwrap();
    s.add_city("East").unwrap();
    s.wait_idle().await;

    let agg = s.aggregate().unwrap();
    assert_eq!(agg.centroid, Coordinate::new(0.0, 5.0));
    assert_eq!(agg.result.coordinate, town);
    assert_ne!(agg.result.coordinate, agg.centroid);
    assert_eq!(agg.result.place_label, "Townsville");
    assert_eq!(agg.result.source, ResultSource::NearestSettlement);
}

#[tokio::test]
async fn test_remove_takes_first_occurrence() {
    let stub = StubResolver::default()
        .with_city("Paris", 48.8566, 2.3522)
        .with_city("Berlin", 52.52, 13.405);
    let (s, _, _) = session(stub);

    let first = s.add_city("Paris").unwrap();
    s.add_city("Berlin").unwrap();
    s.add_city("Paris").unwrap();
    s.wait_idle().await;

    let removed = s.remove_city("PARIS").unwrap();
    assert_eq!(removed.id, first);
    assert_eq!(names(&s), vec!["Berlin", "Paris"]);

    s.wait_idle().await;
    assert_eq!(s.aggregate().unwrap().resolved_count, 2);
    assert!(s.remove_city("Madrid").is_none());
}

#[tokio::test]
async fn test_removing_last_city_clears_aggregate() {
    let (s, _, _) = session(StubResolver::default().with_city("Oslo", 59.91, 10.75));

    s.add_city("Oslo").unwrap();
    s.wait_idle().await;
    assert!(s.aggregate().is_some());

    s.remove_city("Oslo").unwrap();
    s.wait_idle().await;
    assert!(s.aggregate().is_none());
    assert!(s.legs().is_empty());
}

#[tokio::test]
async fn test_clear_resets_and_persists() {
    let (s, _, store) = session(StubResolver::default().with_city("Oslo", 59.91, 10.75));

    s.add_city("Oslo").unwrap();
    s.wait_idle().await;
    s.clear();
    s.wait_idle().await;

    assert!(s.entries().is_empty());
    assert!(s.aggregate().is_none());
    assert_eq!(store.get(StoreKey::Cities).as_deref(), Some("[]"));
    assert_eq!(store.get(StoreKey::Aggregate).as_deref(), Some("null"));
}

#[tokio::test]
async fn test_empty_name_rejected() {
    let (s, _, _) = session(StubResolver::default());
    assert_eq!(s.add_city("   "), Err(SessionError::EmptyName));
    assert!(s.entries().is_empty());
    assert_eq!(s.queue_state(), QueueState::Idle);
}

#[tokio::test]
async fn test_restore_round_trip() {
    let store = Arc::new(MemoryStore::new());
    let stub = StubResolver::default()
        .with_city("Oslo", 59.91, 10.75)
        .with_city("Bergen", 60.39, 5.32);
    let (first, _) = session_with(stub, store.clone());

    first.add_city("Oslo").unwrap();
    first.add_city("Bergen").unwrap();
    first.add_city("Oslo").unwrap();
    let viewport = MapViewport {
        center: Coordinate::new(60.0, 8.0),
        zoom: 6,
    };
    first.set_viewport(viewport);
    first.wait_idle().await;

    // A fresh resolver that knows nothing: everything must come from storage.
    let (second, stub) = session_with(StubResolver::default(), store);
    second.restore().await;
    second.wait_idle().await;

    assert_eq!(names(&second), vec!["Oslo", "Bergen", "Oslo"]);
    let coords = |s: &Session| -> Vec<Coordinate> { s.entries().iter().filter_map(|e| e.coordinate()).collect() };
    assert_eq!(coords(&second), coords(&first));
    assert_eq!(second.aggregate(), first.aggregate());
    assert_eq!(second.viewport(), viewport);

    // Restored forward cache answers without a network call.
    second.add_city("bergen").unwrap();
    second.wait_idle().await;
    assert_eq!(stub.forwards(), 0);
    assert_eq!(second.grouped()[1].count, 2);
}

#[tokio::test]
async fn test_restore_recomputes_missing_aggregate() {
    let store = Arc::new(MemoryStore::new());
    store
        .write(
            StoreKey::Cities,
            r#"[{"name":"Oslo","lat":59.91,"lon":10.75,"display_name":"Oslo"}]"#.into(),
        )
        .await
        .unwrap();
    store.write(StoreKey::Aggregate, "{broken".into()).await.unwrap();

    let (s, stub) = session_with(StubResolver::default(), store);
    s.restore().await;
    s.wait_idle().await;

    assert_eq!(names(&s), vec!["Oslo"]);
    assert_eq!(s.aggregate().unwrap().resolved_count, 1);
    assert_eq!(stub.reverse_calls.load(Ordering::SeqCst), 1);
    assert_eq!(s.viewport(), MapViewport::default());
}

#[tokio::test]
async fn test_stale_recompute_is_discarded() {
    let stub = StubResolver::default()
        .with_city("Oslo", 59.91, 10.75)
        .with_city("Bergen", 60.39, 5.32);
    let (s, _, _) = session(stub);

    s.add_city("Oslo").unwrap();
    s.add_city("Bergen").unwrap();
    s.wait_idle().await;

    let stale = lock(&s.inner.book).generation;
    s.remove_city("Bergen").unwrap();
    s.wait_idle().await;
    let current = s.aggregate();
    assert_eq!(current.as_ref().unwrap().resolved_count, 1);

    let mut rx = s.subscribe();
    s.inner.clone().recompute(stale).await;
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(s.aggregate(), current);

    let latest = lock(&s.inner.book).generation;
    s.inner.clone().recompute(latest).await;
    assert!(matches!(rx.try_recv(), Ok(SessionEvent::AggregateChanged(Some(_)))));
}

#[tokio::test]
async fn test_view_snapshot() {
    let (s, _, _) = session(StubResolver::default().with_city("Oslo", 59.91, 10.75));
    s.add_city("Oslo").unwrap();
    s.wait_idle().await;

    let view = s.view();
    assert_eq!(view.cities.len(), 1);
    assert_eq!(view.legs.len(), 1);
    assert_eq!(view.queued, 0);
    assert!(view.aggregate.is_some());

    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["cities"][0]["name"], "Oslo");
}

#[tokio::test(start_paused = true)]
async fn test_pacing_only_between_network_lookups() {
    let pacing = Duration::from_millis(300);
    let stub = StubResolver::default()
        .with_city("A", 0.0, 0.0)
        .with_city("B", 0.0, 10.0)
        .with_city("C", 10.0, 0.0);
    let (s, stub) = paced_session(stub, pacing);

    let start = Instant::now();
    for name in ["A", "B", "C"] {
        s.add_city(name).unwrap();
    }
    s.wait_idle().await;
    let elapsed = start.elapsed();
    assert!(elapsed >= pacing * 2, "three misses took {:?}", elapsed);
    assert!(elapsed < pacing * 3, "trailing pause after the last miss: {:?}", elapsed);
    assert_eq!(stub.forwards(), 3);

    // Second round is served from the cache and runs unpaced.
    let start = Instant::now();
    for name in ["A", "B", "C"] {
        s.add_city(name).unwrap();
    }
    s.wait_idle().await;
    assert!(start.elapsed() < pacing);
    assert_eq!(stub.forwards(), 3);
    assert_eq!(s.grouped().iter().map(|g| g.count).sum::<usize>(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_single_lookup_has_no_pause() {
    let pacing = Duration::from_millis(300);
    let (s, stub) = paced_session(StubResolver::default().with_city("Oslo", 59.91, 10.75), pacing);

    let start = Instant::now();
    s.add_city("Oslo").unwrap();
    s.wait_idle().await;

    assert!(start.elapsed() < pacing);
    assert_eq!(stub.forwards(), 1);
}

#[tokio::test]
async fn test_repeated_failing_name_looked_up_once() {
    let (s, stub, _) = session(StubResolver::default());
    let mut rx = s.subscribe();

    s.add_city("Atlantis").unwrap();
    s.add_city("atlantis").unwrap();
    s.wait_idle().await;

    assert_eq!(stub.forwards(), 1);
    assert!(s.entries().is_empty());
    let errors = drain_events(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::ResolutionError { .. }))
        .count();
    assert_eq!(errors, 1);
}

/// Holds the first viewport write back so a later one can finish first.
#[derive(Default)]
struct SlowFirstViewport {
    values: MemoryStore,
    held: AtomicBool,
}

#[async_trait]
impl PersistenceGateway for SlowFirstViewport {
    async fn read(&self, key: StoreKey) -> Result<Option<String>, PersistenceError> {
        self.values.read(key).await
    }

    async fn write(&self, key: StoreKey, value: String) -> Result<(), PersistenceError> {
        if key == StoreKey::Viewport && !self.held.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.values.write(key, value).await
    }
}

#[tokio::test]
async fn test_latest_viewport_is_the_one_saved() {
    let store = Arc::new(SlowFirstViewport::default());
    let s = Session::new(config(), Arc::new(StubResolver::default()), store.clone());
    let first = MapViewport {
        center: Coordinate::new(10.0, 10.0),
        zoom: 3,
    };
    let second = MapViewport {
        center: Coordinate::new(20.0, 20.0),
        zoom: 7,
    };

    s.set_viewport(first);
    // Let the first save start and stall before the second is requested.
    tokio::task::yield_now().await;
    s.set_viewport(second);
    s.wait_idle().await;

    assert_eq!(s.viewport(), second);
    let saved: MapViewport = serde_json::from_str(&store.values.get(StoreKey::Viewport).unwrap()).unwrap();
    assert_eq!(saved, second);
}
