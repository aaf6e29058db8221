//! Meeting-point computation.
//!
//! centroid → fine reverse lookup → (not a settlement?) nearest settlement.
//! The result is built whole and handed back; callers swap it in atomically.

use super::entries::CityGroup;
use crate::geo::{self, Coordinate};
use crate::location::{CachingResolver, ReverseTier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// How the meeting point label was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// The centroid itself reverse-geocodes to a settlement.
    Centroid,
    /// The centroid is not in a settlement; the nearest one was used.
    NearestSettlement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultLocation {
    pub coordinate: Coordinate,
    pub place_label: String,
    pub country: String,
    pub full_address: String,
    pub source: ResultSource,
}

/// The derived meeting point over all resolved entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub centroid: Coordinate,
    pub result: ResultLocation,
    pub resolved_count: usize,
    pub computed_at: DateTime<Utc>,
}

/// Distance from one city group to the meeting point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leg {
    pub name: String,
    pub count: usize,
    pub coordinate: Coordinate,
    pub distance_km: f64,
}

/// Per-group distances to the meeting point. Pending-only groups are skipped.
pub fn legs(groups: &[CityGroup], aggregate: &Aggregate) -> Vec<Leg> {
    groups
        .iter()
        .filter_map(|g| {
            let coordinate = g.representative.coordinate()?;
            Some(Leg {
                name: g.name.clone(),
                count: g.count,
                coordinate,
                distance_km: geo::haversine_km(coordinate, aggregate.result.coordinate),
            })
        })
        .collect()
}

pub struct AggregateEngine {
    resolver: CachingResolver,
}

impl AggregateEngine {
    pub fn new(resolver: CachingResolver) -> Self {
        Self { resolver }
    }

    /// Compute the aggregate for a set of resolved coordinates. `None` when
    /// there is nothing to aggregate.
    ///
    /// A single city still goes through geocoding; its own coordinate is
    /// the centroid.
    pub async fn compute(&self, points: &[Coordinate]) -> Option<Aggregate> {
        let centroid = geo::centroid(points.iter().copied())?;

        let place = match self.resolver.reverse(centroid, ReverseTier::Fine).await {
            Ok(place) if place.is_genuine_settlement() => Some(place),
            Ok(place) => {
                debug!(%centroid, label = %place.place_label, "centroid is not a settlement");
                None
            }
            Err(e) => {
                debug!(%centroid, error = %e, "centroid reverse lookup failed");
                None
            }
        };

        let result = match place {
            Some(place) => ResultLocation {
                coordinate: centroid,
                place_label: place.place_label,
                country: place.country,
                full_address: place.full_address,
                source: ResultSource::Centroid,
            },
            None => {
                let settlement = self.resolver.nearest_settlement(centroid).await;
                ResultLocation {
                    coordinate: settlement.coordinate,
                    place_label: settlement.place.place_label,
                    country: settlement.place.country,
                    full_address: settlement.place.full_address,
                    source: ResultSource::NearestSettlement,
                }
            }
        };

        info!(
            %centroid,
            meeting_point = %result.place_label,
            cities = points.len(),
            "meeting point computed"
        );

        Some(Aggregate {
            centroid,
            result,
            resolved_count: points.len(),
            computed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::resolver::stub::StubResolver;
    use crate::location::{LookupCache, SharedCache};
    use crate::session::entries::LocationSet;
    use approx::assert_abs_diff_eq;
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};

    fn engine(stub: StubResolver) -> (AggregateEngine, Arc<StubResolver>) {
        let stub = Arc::new(stub);
        let cache: SharedCache = Arc::new(Mutex::new(LookupCache::new()));
        (AggregateEngine::new(CachingResolver::new(stub.clone(), cache)), stub)
    }

    fn square() -> Vec<Coordinate> {
        vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 10.0),
            Coordinate::new(10.0, 0.0),
            Coordinate::new(10.0, 10.0),
        ]
    }

    #[tokio::test]
    async fn test_empty_has_no_aggregate() {
        let (engine, stub) = engine(StubResolver::default());
        assert!(engine.compute(&[]).await.is_none());
        assert_eq!(stub.reverse_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_genuine_centroid_keeps_centroid() {
        let center = Coordinate::new(5.0, 5.0);
        let (engine, stub) = engine(StubResolver::default().with_place(center, "Midtown"));

        let agg = engine.compute(&square()).await.unwrap();

        assert_eq!(agg.centroid, center);
        assert_eq!(agg.result.coordinate, center);
        assert_eq!(agg.result.place_label, "Midtown");
        assert_eq!(agg.result.source, ResultSource::Centroid);
        assert_eq!(agg.resolved_count, 4);
        assert_eq!(stub.settlement_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_centroid_falls_back_to_settlement() {
        let town = Coordinate::new(6.45, 3.39);
        let (engine, stub) = engine(StubResolver::default().with_settlement(town, "Lagos"));

        let agg = engine.compute(&square()).await.unwrap();

        assert_eq!(agg.centroid, Coordinate::new(5.0, 5.0));
        assert_eq!(agg.result.coordinate, town);
        assert_eq!(agg.result.place_label, "Lagos");
        assert_eq!(agg.result.source, ResultSource::NearestSettlement);
        assert_eq!(stub.settlement_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_city_still_geocoded() {
        let oslo = Coordinate::new(59.9139, 10.7522);
        let (engine, stub) = engine(StubResolver::default().with_place(oslo, "Oslo"));

        let agg = engine.compute(&[oslo]).await.unwrap();

        assert_eq!(agg.result.coordinate, oslo);
        assert_eq!(agg.result.place_label, "Oslo");
        assert_eq!(stub.reverse_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeat_compute_hits_reverse_cache() {
        let (engine, stub) = engine(StubResolver::default());
        engine.compute(&square()).await.unwrap();
        engine.compute(&square()).await.unwrap();
        assert_eq!(stub.reverse_calls.load(Ordering::SeqCst), 1);
        assert_eq!(stub.settlement_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_legs_measure_to_result() {
        let center = Coordinate::new(5.0, 5.0);
        let (engine, _) = engine(StubResolver::default().with_place(center, "Midtown"));

        let mut set = LocationSet::new();
        for (name, c) in ["A", "B", "C", "D"].iter().zip(square()) {
            let id = set.add(name);
            set.mark_resolved(id, c, name);
        }
        set.add("Pending");

        let agg = engine.compute(&set.resolved_coordinates()).await.unwrap();
        let legs = legs(&set.grouped(), &agg);

        assert_eq!(legs.len(), 4);
        let a = &legs[0];
        assert_eq!(a.name, "A");
        assert_abs_diff_eq!(a.distance_km, geo::haversine_km(Coordinate::new(0.0, 0.0), center), epsilon = 1e-9);
    }
}
