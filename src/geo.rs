//! Great-circle helpers: haversine distance and arithmetic-mean centroid.
//!
//! Accuracy: spherical Earth (R = 6371 km), good to ~0.5% for the distances
//! a meeting-point display needs.

use serde::{Deserialize, Serialize};
use std::fmt;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// A point on the globe in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance to `other` in kilometres.
    pub fn distance_km(&self, other: &Coordinate) -> f64 {
        haversine_km(*self, *other)
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.lat, self.lon)
    }
}

/// Haversine distance between two coordinates, in kilometres.
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Arithmetic mean of latitudes and longitudes. `None` for an empty input.
///
/// Each point counts once; repeated cities weigh in by their multiplicity.
/// Longitudes are averaged linearly, so sets straddling the antimeridian
/// land on the "wrong" side of the globe.
pub fn centroid<I>(points: I) -> Option<Coordinate>
where
    I: IntoIterator<Item = Coordinate>,
{
    let mut sum_lat = 0.0;
    let mut sum_lon = 0.0;
    let mut count = 0usize;

    for p in points {
        sum_lat += p.lat;
        sum_lon += p.lon;
        count += 1;
    }

    if count == 0 {
        return None;
    }

    let n = count as f64;
    Some(Coordinate::new(sum_lat / n, sum_lon / n))
}

/// Index and distance of the point closest to `target`.
pub fn nearest<'a, I>(target: Coordinate, points: I) -> Option<(usize, f64)>
where
    I: IntoIterator<Item = &'a Coordinate>,
{
    points
        .into_iter()
        .enumerate()
        .map(|(i, p)| (i, haversine_km(target, *p)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}
