//! Core types for the location subsystem.

use crate::geo::Coordinate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder labels resolvers hand back when they could not name a place.
pub const UNKNOWN_PLACE: &str = "Unknown";
pub const NEAREST_CITY_PLACEHOLDER: &str = "Nearest city";

const SENTINEL_LABELS: &[&str] = &[UNKNOWN_PLACE, NEAREST_CITY_PLACEHOLDER];

/// Result of a forward (name → coordinate) lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCity {
    pub coordinate: Coordinate,
    /// Full display name from the provider (e.g. "Paris, Île-de-France, France")
    pub display_label: String,
}

/// Result of a reverse (coordinate → place) lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceInfo {
    pub place_label: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub full_address: String,
}

impl PlaceInfo {
    /// A place with no usable settlement name, labelled by its coordinate.
    pub fn unknown_at(coordinate: Coordinate) -> Self {
        Self {
            place_label: UNKNOWN_PLACE.to_string(),
            country: UNKNOWN_PLACE.to_string(),
            full_address: coordinate.to_string(),
        }
    }

    /// True when the label names a real settlement rather than a placeholder.
    pub fn is_genuine_settlement(&self) -> bool {
        let label = self.place_label.trim();
        !label.is_empty() && !SENTINEL_LABELS.iter().any(|s| s.eq_ignore_ascii_case(label))
    }
}

/// The settlement found nearest to a query point. Its coordinate is the
/// settlement's own position and may differ from the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub coordinate: Coordinate,
    pub place: PlaceInfo,
}

impl Settlement {
    /// Lowest-quality answer: the query point itself, labelled by its coordinates.
    pub fn raw(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            place: PlaceInfo {
                place_label: coordinate.to_string(),
                country: UNKNOWN_PLACE.to_string(),
                full_address: coordinate.to_string(),
            },
        }
    }
}

/// Reverse-lookup precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReverseTier {
    /// City-level lookup of the exact point.
    Fine,
    /// Region-level lookup, used when the fine tier finds no settlement.
    Coarse,
}

impl fmt::Display for ReverseTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fine => write!(f, "fine"),
            Self::Coarse => write!(f, "coarse"),
        }
    }
}

/// Location resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("City not found: '{0}'")]
    NotFound(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
}

impl ResolveError {
    /// Transport or parse failures, as opposed to a definitive "no match".
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::NotFound(_))
    }
}
