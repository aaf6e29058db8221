//! Two-level lookup cache: forward (name → coordinate) and reverse
//! (rounded coordinate → place).
//!
//! Keys are case-insensitive for names and rounded to 4 decimals (~11 m) for
//! coordinates. Entries are immutable once written and never evicted; the
//! whole cache is persisted and restored as one snapshot.
//! Snapshot v1. Missing fields default gracefully.

use super::types::{PlaceInfo, ResolvedCity, ReverseTier, Settlement};
use crate::geo::Coordinate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const SNAPSHOT_VERSION: u32 = 1;

const COARSE_PREFIX: &str = "coarse:";
const NEAREST_PREFIX: &str = "nearest:";

/// Forward cache key: trimmed, lowercased name.
pub fn forward_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Snap to the 4-decimal grid. `+ 0.0` folds negative zero into zero.
fn snap(value: f64) -> f64 {
    (value * 1e4).round() / 1e4 + 0.0
}

fn grid_key(coordinate: Coordinate) -> String {
    format!("{:.4}_{:.4}", snap(coordinate.lat), snap(coordinate.lon))
}

/// Reverse cache key for an address lookup at the given tier.
pub fn reverse_key(coordinate: Coordinate, tier: ReverseTier) -> String {
    match tier {
        ReverseTier::Fine => grid_key(coordinate),
        ReverseTier::Coarse => format!("{}{}", COARSE_PREFIX, grid_key(coordinate)),
    }
}

/// Reverse cache key for a nearest-settlement lookup.
pub fn settlement_key(coordinate: Coordinate) -> String {
    format!("{}{}", NEAREST_PREFIX, grid_key(coordinate))
}

/// A reverse-cache value. Settlement lookups also remember where the
/// settlement itself is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseEntry {
    #[serde(flatten)]
    pub place: PlaceInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinate: Option<Coordinate>,
}

impl From<PlaceInfo> for ReverseEntry {
    fn from(place: PlaceInfo) -> Self {
        Self { place, coordinate: None }
    }
}

impl From<Settlement> for ReverseEntry {
    fn from(s: Settlement) -> Self {
        Self {
            place: s.place,
            coordinate: Some(s.coordinate),
        }
    }
}

/// Serializable form of the whole cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub forward: HashMap<String, ResolvedCity>,
    #[serde(default)]
    pub reverse: HashMap<String, ReverseEntry>,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

/// The in-memory lookup cache for one session.
#[derive(Debug, Default)]
pub struct LookupCache {
    forward: HashMap<String, ResolvedCity>,
    reverse: HashMap<String, ReverseEntry>,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_forward(&self, name: &str) -> Option<ResolvedCity> {
        self.forward.get(&forward_key(name)).cloned()
    }

    /// Store a forward result. Returns false if the key was already present
    /// (the first write wins).
    pub fn put_forward(&mut self, name: &str, value: ResolvedCity) -> bool {
        let key = forward_key(name);
        if self.forward.contains_key(&key) {
            return false;
        }
        self.forward.insert(key, value);
        true
    }

    pub fn get_reverse(&self, key: &str) -> Option<ReverseEntry> {
        self.reverse.get(key).cloned()
    }

    /// Store a reverse result, including negative ones. First write wins.
    pub fn put_reverse(&mut self, key: String, value: ReverseEntry) -> bool {
        if self.reverse.contains_key(&key) {
            return false;
        }
        self.reverse.insert(key, value);
        true
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            version: SNAPSHOT_VERSION,
            forward: self.forward.clone(),
            reverse: self.reverse.clone(),
        }
    }

    /// Replace the contents wholesale with a restored snapshot.
    pub fn restore(&mut self, snapshot: CacheSnapshot) {
        self.forward = snapshot.forward;
        self.reverse = snapshot.reverse;
    }

    pub fn forward_len(&self) -> usize {
        self.forward.len()
    }

    pub fn reverse_len(&self) -> usize {
        self.reverse.len()
    }
}
