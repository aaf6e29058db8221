//! Place resolver contract and its cache-aware wrapper.
//!
//! Forward flow:  Cache → resolver → cache write (successes only)
//! Reverse flow:  Cache → resolver → cache write (including negative answers)
//! Settlement:    Cache → resolver (never fails) → cache write

use super::cache::{reverse_key, settlement_key, LookupCache};
use super::types::{PlaceInfo, ResolveError, ResolvedCity, ReverseTier, Settlement};
use crate::geo::Coordinate;
use async_trait::async_trait;
use crate::lock;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// A network-bound (or offline) geocoder.
#[async_trait]
pub trait PlaceResolver: Send + Sync {
    /// Name → coordinate. `NotFound` when there is no candidate.
    async fn forward(&self, name: &str) -> Result<ResolvedCity, ResolveError>;

    /// Coordinate → place at the given precision.
    async fn reverse(&self, coordinate: Coordinate, tier: ReverseTier) -> Result<PlaceInfo, ResolveError>;

    /// The nearest known settlement. Must always answer; the worst case is
    /// the query point labelled by its own coordinates.
    async fn nearest_settlement(&self, coordinate: Coordinate) -> Settlement;
}

pub type SharedCache = Arc<Mutex<LookupCache>>;

/// Where a forward answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupSource {
    Cache,
    Resolver,
}

/// A resolver fronted by the session's lookup cache.
#[derive(Clone)]
pub struct CachingResolver {
    resolver: Arc<dyn PlaceResolver>,
    cache: SharedCache,
}

impl CachingResolver {
    pub fn new(resolver: Arc<dyn PlaceResolver>, cache: SharedCache) -> Self {
        Self { resolver, cache }
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    /// Forward lookup. A cache hit short-circuits the network; failures are
    /// never cached so a retry always reaches the resolver.
    pub async fn forward(&self, name: &str) -> Result<(ResolvedCity, LookupSource), ResolveError> {
        let cached = lock(&self.cache).get_forward(name);
        if let Some(hit) = cached {
            debug!(name, "forward cache hit");
            return Ok((hit, LookupSource::Cache));
        }

        debug!(name, "forward lookup");
        let resolved = self.resolver.forward(name).await?;
        lock(&self.cache).put_forward(name, resolved.clone());
        Ok((resolved, LookupSource::Resolver))
    }

    /// Reverse lookup. Answers are cached whatever their quality; transport
    /// errors are passed through uncached.
    pub async fn reverse(&self, coordinate: Coordinate, tier: ReverseTier) -> Result<PlaceInfo, ResolveError> {
        let key = reverse_key(coordinate, tier);
        let cached = lock(&self.cache).get_reverse(&key);
        if let Some(hit) = cached {
            debug!(%key, "reverse cache hit");
            return Ok(hit.place);
        }

        debug!(%coordinate, %tier, "reverse lookup");
        let place = self.resolver.reverse(coordinate, tier).await?;
        lock(&self.cache).put_reverse(key, place.clone().into());
        Ok(place)
    }

    pub async fn nearest_settlement(&self, coordinate: Coordinate) -> Settlement {
        let key = settlement_key(coordinate);
        let cached = lock(&self.cache).get_reverse(&key);
        if let Some(hit) = cached {
            debug!(%key, "settlement cache hit");
            return Settlement {
                coordinate: hit.coordinate.unwrap_or(coordinate),
                place: hit.place,
            };
        }

        debug!(%coordinate, "nearest settlement lookup");
        let settlement = self.resolver.nearest_settlement(coordinate).await;
        lock(&self.cache).put_reverse(key, settlement.clone().into());
        settlement
    }
}
