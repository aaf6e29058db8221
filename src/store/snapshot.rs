//! Serialized shapes written under each store key.
//!
//! Only resolved entries are persisted; pending ones are in flight and are
//! not resurrected on restore.

use crate::geo::Coordinate;
use crate::session::entries::{EntryState, LocationSet};
use serde::{Deserialize, Serialize};

/// One resolved entry under the `cities` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedCity {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub display_name: String,
}

impl PersistedCity {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }
}

/// Resolved entries of a set, in insertion order.
pub fn persisted_cities(set: &LocationSet) -> Vec<PersistedCity> {
    set.resolved()
        .filter_map(|e| match &e.state {
            EntryState::Resolved {
                coordinate,
                display_label,
            } => Some(PersistedCity {
                name: e.name.clone(),
                lat: coordinate.lat,
                lon: coordinate.lon,
                display_name: display_label.clone(),
            }),
            _ => None,
        })
        .collect()
}

/// Rebuild a set from persisted cities. Invalid coordinates are skipped.
pub fn restore_cities(cities: &[PersistedCity]) -> LocationSet {
    let mut set = LocationSet::new();
    for city in cities.iter().filter(|c| c.coordinate().is_valid()) {
        set.add_resolved(&city.name, city.coordinate(), city.display_name.clone());
    }
    set
}

/// The map view last reported by the renderer. Opaque to the core.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapViewport {
    pub center: Coordinate,
    pub zoom: u8,
}

impl Default for MapViewport {
    /// World view centred on Moscow.
    fn default() -> Self {
        Self {
            center: Coordinate::new(55.7558, 37.6173),
            zoom: 2,
        }
    }
}
