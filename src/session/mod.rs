//! One meeting-point session.
//!
//! Owns the entry set, the lookup cache, the current aggregate and the
//! resolution queue, and talks to the two outside collaborators: a
//! [`PlaceResolver`] and a [`PersistenceGateway`]. Renderers listen on
//! [`Session::subscribe`].
//!
//! Flow:  add_city → pending entry → queue → forward lookup (cached)
//!        → mark resolved → recompute → save → events
//!
//! Every method that schedules work spawns tokio tasks, so a session must be
//! used from inside a runtime.

pub mod aggregate;
pub mod entries;
pub mod events;
pub mod queue;

#[cfg(test)]
mod tests;

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::location::{CachingResolver, CacheSnapshot, LookupCache, LookupSource, PlaceResolver};
use crate::lock;
use crate::store::snapshot::{persisted_cities, restore_cities};
use crate::store::{encode, read_json, MapViewport, PersistedCity, PersistenceGateway, StoreKey};

use aggregate::{Aggregate, AggregateEngine, Leg};
use entries::{CityGroup, Entry, EntryId, LocationSet};
use events::{EventBus, SessionEvent};
use queue::{QueueState, ResolutionQueue};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Enter a city name")]
    EmptyName,
}

/// Everything a renderer needs in one serializable value.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub cities: Vec<CityGroup>,
    pub aggregate: Option<Aggregate>,
    pub legs: Vec<Leg>,
    pub viewport: MapViewport,
    pub queued: usize,
}

struct Book {
    set: LocationSet,
    aggregate: Option<Aggregate>,
    viewport: Option<MapViewport>,
    /// Bumped on every scheduled recompute; only the latest may apply.
    generation: u64,
}

struct Inner {
    config: SessionConfig,
    resolver: CachingResolver,
    engine: AggregateEngine,
    store: Arc<dyn PersistenceGateway>,
    events: EventBus,
    book: Mutex<Book>,
    queue: Mutex<ResolutionQueue>,
    /// Serializes snapshot writes so the freshest state lands last.
    persist_lock: tokio::sync::Mutex<()>,
    busy: AtomicUsize,
    idle: Notify,
}

/// Counts one spawned task for [`Session::wait_idle`].
struct BusyGuard(Arc<Inner>);

impl BusyGuard {
    fn new(inner: &Arc<Inner>) -> Self {
        inner.busy.fetch_add(1, Ordering::SeqCst);
        Self(inner.clone())
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        if self.0.busy.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        resolver: Arc<dyn PlaceResolver>,
        store: Arc<dyn PersistenceGateway>,
    ) -> Self {
        let cache = Arc::new(Mutex::new(LookupCache::new()));
        let resolver = CachingResolver::new(resolver, cache);
        let events = EventBus::new(config.event_capacity);

        Self {
            inner: Arc::new(Inner {
                engine: AggregateEngine::new(resolver.clone()),
                resolver,
                store,
                events,
                config,
                book: Mutex::new(Book {
                    set: LocationSet::new(),
                    aggregate: None,
                    viewport: None,
                    generation: 0,
                }),
                queue: Mutex::new(ResolutionQueue::new()),
                persist_lock: tokio::sync::Mutex::new(()),
                busy: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Load the last snapshot, replacing the in-memory state. Call once,
    /// before any city is added. Unreadable keys are logged and skipped.
    pub async fn restore(&self) {
        let inner = &self.inner;
        let store = inner.store.as_ref();

        let cities: Option<Vec<PersistedCity>> = load(store, StoreKey::Cities).await;
        let aggregate: Option<Option<Aggregate>> = load(store, StoreKey::Aggregate).await;
        let viewport: Option<MapViewport> = load(store, StoreKey::Viewport).await;
        let cache: Option<CacheSnapshot> = load(store, StoreKey::LookupCache).await;

        if let Some(snapshot) = cache {
            lock(inner.resolver.cache()).restore(snapshot);
        }

        let (groups, aggregate, needs_recompute) = {
            let mut book = lock(&inner.book);
            book.set = restore_cities(cities.as_deref().unwrap_or_default());
            book.aggregate = aggregate.flatten();
            book.viewport = viewport;
            let needs = book.aggregate.is_none() && book.set.resolved().next().is_some();
            (book.set.grouped(), book.aggregate.clone(), needs)
        };

        info!(cities = groups.iter().map(|g| g.count).sum::<usize>(), "session restored");
        inner.events.publish(SessionEvent::EntriesChanged(groups));
        inner.events.publish(SessionEvent::AggregateChanged(aggregate));

        if needs_recompute {
            inner.schedule_recompute();
        }
    }

    /// Add one occurrence of a city. The entry starts pending and resolves in
    /// the background.
    pub fn add_city(&self, name: &str) -> Result<EntryId, SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::EmptyName);
        }

        let (id, groups) = {
            let mut book = lock(&self.inner.book);
            let id = book.set.add(name);
            (id, book.set.grouped())
        };
        self.inner.events.publish(SessionEvent::EntriesChanged(groups));

        let start_worker = lock(&self.inner.queue).push(name);
        debug!(name, %id, start_worker, "city queued");
        if start_worker {
            let inner = self.inner.clone();
            self.inner.spawn_tracked(async move { inner.drain().await });
        }
        Ok(id)
    }

    /// Remove the first occurrence of a city (case-insensitive).
    pub fn remove_city(&self, name: &str) -> Option<Entry> {
        let (removed, groups) = {
            let mut book = lock(&self.inner.book);
            let removed = book.set.remove_first_by_name(name)?;
            (removed, book.set.grouped())
        };
        info!(name = %removed.name, id = %removed.id, "city removed");
        self.inner.events.publish(SessionEvent::EntriesChanged(groups));

        if removed.coordinate().is_some() {
            self.inner.schedule_recompute();
        }
        self.inner.persist();
        Some(removed)
    }

    /// Back to an empty session. The lookup cache is kept; queued names
    /// still run but find nothing to resolve.
    pub fn clear(&self) {
        {
            let mut book = lock(&self.inner.book);
            book.set.clear();
            book.aggregate = None;
            book.generation += 1;
        }
        info!("session cleared");
        self.inner.events.publish(SessionEvent::EntriesChanged(Vec::new()));
        self.inner.events.publish(SessionEvent::AggregateChanged(None));
        self.inner.persist();
    }

    /// Force a recompute of the meeting point.
    pub fn recompute(&self) {
        self.inner.schedule_recompute();
    }

    /// Record the renderer's viewport. Saved in the background; the value
    /// written is whatever is current once the write lock is held.
    pub fn set_viewport(&self, viewport: MapViewport) {
        lock(&self.inner.book).viewport = Some(viewport);
        let inner = self.inner.clone();
        self.inner.spawn_tracked(async move {
            let _write = inner.persist_lock.lock().await;
            let latest = lock(&inner.book).viewport;
            let Some(latest) = latest else {
                return;
            };
            let saved = match encode(StoreKey::Viewport, &latest) {
                Ok(json) => inner.store.write(StoreKey::Viewport, json).await,
                Err(e) => Err(e),
            };
            if let Err(e) = saved {
                warn!(error = %e, "viewport not saved");
            }
        });
    }

    pub fn viewport(&self) -> MapViewport {
        lock(&self.inner.book).viewport.unwrap_or_default()
    }

    pub fn entries(&self) -> Vec<Entry> {
        lock(&self.inner.book).set.entries().to_vec()
    }

    pub fn grouped(&self) -> Vec<CityGroup> {
        lock(&self.inner.book).set.grouped()
    }

    pub fn aggregate(&self) -> Option<Aggregate> {
        lock(&self.inner.book).aggregate.clone()
    }

    pub fn legs(&self) -> Vec<Leg> {
        let book = lock(&self.inner.book);
        match &book.aggregate {
            Some(agg) => aggregate::legs(&book.set.grouped(), agg),
            None => Vec::new(),
        }
    }

    pub fn view(&self) -> SessionView {
        let queued = lock(&self.inner.queue).len();
        let book = lock(&self.inner.book);
        let cities = book.set.grouped();
        let legs = match &book.aggregate {
            Some(agg) => aggregate::legs(&cities, agg),
            None => Vec::new(),
        };
        SessionView {
            cities,
            aggregate: book.aggregate.clone(),
            legs,
            viewport: book.viewport.unwrap_or_default(),
            queued,
        }
    }

    pub fn queue_state(&self) -> QueueState {
        lock(&self.inner.queue).state()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Wait until the queue has drained and no recompute or save is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.busy.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

async fn load<T>(store: &dyn PersistenceGateway, key: StoreKey) -> Option<T>
where
    T: serde::de::DeserializeOwned,
{
    match read_json(store, key).await {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "ignoring unreadable snapshot");
            None
        }
    }
}

impl Inner {
    fn spawn_tracked<F>(self: &Arc<Self>, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = BusyGuard::new(self);
        tokio::spawn(async move {
            let _guard = guard;
            fut.await;
        });
    }

    /// The single queue worker. Runs until the queue reports empty.
    async fn drain(self: Arc<Self>) {
        loop {
            let next = lock(&self.queue).next();
            let Some(name) = next else {
                debug!("resolution queue drained");
                break;
            };

            let reached_network = self.resolve_one(&name).await;

            let more = lock(&self.queue).has_pending();
            if more && reached_network && !self.config.pacing.is_zero() {
                tokio::time::sleep(self.config.pacing).await;
            }
        }
    }

    /// Resolve one queued name and fan the result out to every pending entry
    /// with that name. Returns whether the resolver (not the cache) was hit.
    async fn resolve_one(self: &Arc<Self>, name: &str) -> bool {
        // A repeat of a name already handled (resolved, failed or removed).
        let waiting = lock(&self.book).set.pending_named(name).len();
        if waiting == 0 {
            debug!(name, "no pending entries left, skipping lookup");
            return false;
        }

        match self.resolver.forward(name).await {
            Ok((city, source)) => {
                let (updated, groups) = {
                    let mut book = lock(&self.book);
                    let ids = book.set.pending_named(name);
                    let updated = ids
                        .into_iter()
                        .filter(|id| book.set.mark_resolved(*id, city.coordinate, &city.display_label))
                        .count();
                    (updated, book.set.grouped())
                };

                if updated == 0 {
                    debug!(name, "pending entries went away during lookup");
                } else {
                    info!(
                        name,
                        lat = city.coordinate.lat,
                        lon = city.coordinate.lon,
                        entries = updated,
                        "city resolved"
                    );
                    self.events.publish(SessionEvent::EntriesChanged(groups));
                    self.schedule_recompute();
                    self.persist();
                }
                source == LookupSource::Resolver
            }
            Err(e) => {
                let message = e.to_string();
                let (dropped, groups) = {
                    let mut book = lock(&self.book);
                    let dropped = book.set.drop_all_pending_named(name, &message);
                    (dropped.len(), book.set.grouped())
                };

                warn!(name, error = %e, transient = e.is_transient(), dropped, "city resolution failed");
                if dropped > 0 {
                    self.events.publish(SessionEvent::EntriesChanged(groups));
                }
                self.events.publish(SessionEvent::ResolutionError {
                    name: name.to_string(),
                    message,
                });
                true
            }
        }
    }

    fn schedule_recompute(self: &Arc<Self>) {
        let generation = {
            let mut book = lock(&self.book);
            book.generation += 1;
            book.generation
        };
        let inner = self.clone();
        self.spawn_tracked(async move { inner.recompute(generation).await });
    }

    async fn recompute(self: Arc<Self>, generation: u64) {
        let (points, revision) = {
            let book = lock(&self.book);
            (book.set.resolved_coordinates(), book.set.resolved_revision())
        };
        let aggregate = self.engine.compute(&points).await;

        let applied = {
            let mut book = lock(&self.book);
            if book.generation == generation && book.set.resolved_revision() == revision {
                book.aggregate = aggregate.clone();
                true
            } else {
                false
            }
        };

        if applied {
            self.events.publish(SessionEvent::AggregateChanged(aggregate));
            self.persist();
        } else {
            debug!(generation, "discarding stale meeting point");
        }
    }

    /// Best-effort save of cities, aggregate and cache. Failures are logged
    /// and never surface.
    fn persist(self: &Arc<Self>) {
        let inner = self.clone();
        self.spawn_tracked(async move {
            let _write = inner.persist_lock.lock().await;
            for (key, value) in inner.encode_snapshot() {
                if let Err(e) = inner.store.write(key, value).await {
                    warn!(%key, error = %e, "snapshot not saved");
                }
            }
        });
    }

    fn encode_snapshot(&self) -> Vec<(StoreKey, String)> {
        let (cities, aggregate) = {
            let book = lock(&self.book);
            (persisted_cities(&book.set), book.aggregate.clone())
        };
        let cache = lock(self.resolver.cache()).snapshot();

        [
            (StoreKey::Cities, encode(StoreKey::Cities, &cities)),
            (StoreKey::Aggregate, encode(StoreKey::Aggregate, &aggregate)),
            (StoreKey::LookupCache, encode(StoreKey::LookupCache, &cache)),
        ]
        .into_iter()
        .filter_map(|(key, encoded)| match encoded {
            Ok(json) => Some((key, json)),
            Err(e) => {
                warn!(%key, error = %e, "snapshot not encoded");
                None
            }
        })
        .collect()
    }
}
