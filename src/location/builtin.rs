//! Built-in offline dataset with fuzzy matching.
//!
//! Serves as a network-free resolver: forward lookups match names and
//! aliases, reverse lookups snap to the closest dataset city within a
//! tier-dependent radius.

use super::resolver::PlaceResolver;
use super::types::{PlaceInfo, ResolveError, ResolvedCity, ReverseTier, Settlement};
use crate::geo::{self, Coordinate};
use async_trait::async_trait;
use serde::Serialize;

/// Snap radius for a fine reverse lookup.
const FINE_RADIUS_KM: f64 = 30.0;
/// Snap radius for a coarse reverse lookup.
const COARSE_RADIUS_KM: f64 = 250.0;

struct BuiltinCity {
    names: &'static [&'static str], // canonical + aliases
    display: &'static str,
    country: &'static str,
    lat: f64,
    lon: f64,
}

impl BuiltinCity {
    fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }

    fn place(&self) -> PlaceInfo {
        PlaceInfo {
            place_label: self.display.to_string(),
            country: self.country.to_string(),
            full_address: format!("{}, {}", self.display, self.country),
        }
    }
}

const BUILTIN_CITIES: &[BuiltinCity] = &[
    BuiltinCity { names: &["moscow", "moskva", "москва"], display: "Moscow", country: "Russia", lat: 55.7558, lon: 37.6173 },
    BuiltinCity { names: &["saint petersburg", "st petersburg", "санкт-петербург"], display: "Saint Petersburg", country: "Russia", lat: 59.9311, lon: 30.3609 },
    BuiltinCity { names: &["novosibirsk", "новосибирск"], display: "Novosibirsk", country: "Russia", lat: 55.0084, lon: 82.9357 },
    BuiltinCity { names: &["yekaterinburg", "ekaterinburg", "екатеринбург"], display: "Yekaterinburg", country: "Russia", lat: 56.8389, lon: 60.6057 },
    BuiltinCity { names: &["kazan", "казань"], display: "Kazan", country: "Russia", lat: 55.7887, lon: 49.1221 },
    BuiltinCity { names: &["stockholm", "stokholm"], display: "Stockholm", country: "Sweden", lat: 59.3293, lon: 18.0686 },
    BuiltinCity { names: &["oslo"], display: "Oslo", country: "Norway", lat: 59.9139, lon: 10.7522 },
    BuiltinCity { names: &["london"], display: "London", country: "United Kingdom", lat: 51.5074, lon: -0.1278 },
    BuiltinCity { names: &["paris"], display: "Paris", country: "France", lat: 48.8566, lon: 2.3522 },
    BuiltinCity { names: &["lyon"], display: "Lyon", country: "France", lat: 45.7640, lon: 4.8357 },
    BuiltinCity { names: &["berlin"], display: "Berlin", country: "Germany", lat: 52.5200, lon: 13.4050 },
    BuiltinCity { names: &["frankfurt", "frankfurt am main"], display: "Frankfurt", country: "Germany", lat: 50.1109, lon: 8.6821 },
    BuiltinCity { names: &["prague", "praha"], display: "Prague", country: "Czechia", lat: 50.0755, lon: 14.4378 },
    BuiltinCity { names: &["vienna", "wien"], display: "Vienna", country: "Austria", lat: 48.2082, lon: 16.3738 },
    BuiltinCity { names: &["rome", "roma"], display: "Rome", country: "Italy", lat: 41.9028, lon: 12.4964 },
    BuiltinCity { names: &["madrid"], display: "Madrid", country: "Spain", lat: 40.4168, lon: -3.7038 },
    BuiltinCity { names: &["istanbul"], display: "Istanbul", country: "Türkiye", lat: 41.0082, lon: 28.9784 },
    BuiltinCity { names: &["cairo", "al-qahirah"], display: "Cairo", country: "Egypt", lat: 30.0444, lon: 31.2357 },
    BuiltinCity { names: &["dubai"], display: "Dubai", country: "United Arab Emirates", lat: 25.2048, lon: 55.2708 },
    BuiltinCity { names: &["new york", "newyork", "nyc"], display: "New York", country: "United States", lat: 40.7128, lon: -74.0060 },
    BuiltinCity { names: &["los angeles"], display: "Los Angeles", country: "United States", lat: 34.0522, lon: -118.2437 },
    BuiltinCity { names: &["tokyo"], display: "Tokyo", country: "Japan", lat: 35.6762, lon: 139.6503 },
    BuiltinCity { names: &["sydney"], display: "Sydney", country: "Australia", lat: -33.8688, lon: 151.2093 },
    BuiltinCity { names: &["nairobi"], display: "Nairobi", country: "Kenya", lat: -1.2921, lon: 36.8219 },
    BuiltinCity { names: &["lagos"], display: "Lagos", country: "Nigeria", lat: 6.5244, lon: 3.3792 },
    BuiltinCity { names: &["mumbai", "bombay"], display: "Mumbai", country: "India", lat: 19.0760, lon: 72.8777 },
];

/// Compute edit distance between two strings (Levenshtein).
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Shortest query that is matched fuzzily at all.
const FUZZY_MIN_CHARS: usize = 4;
const FUZZY_MAX_DISTANCE: usize = 2;

/// A typo is accepted only if it stays within a third of the candidate's length.
fn close_enough(distance: usize, candidate: &str) -> bool {
    distance <= FUZZY_MAX_DISTANCE && distance * 3 < candidate.chars().count()
}

/// Search the dataset: exact name or alias, then fuzzy for longer queries.
fn lookup(query: &str) -> Option<&'static BuiltinCity> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return None;
    }

    let q = q.as_str();

    if let Some(city) = BUILTIN_CITIES.iter().find(|c| c.names.iter().any(|n| *n == q)) {
        return Some(city);
    }

    if q.chars().count() < FUZZY_MIN_CHARS {
        return None;
    }

    BUILTIN_CITIES
        .iter()
        .flat_map(|c| c.names.iter().map(move |n| (c, n, edit_distance(q, n))))
        .filter(|(_, n, d)| close_enough(*d, n))
        .min_by_key(|(_, _, d)| *d)
        .map(|(c, _, _)| c)
}

fn closest(target: Coordinate) -> Option<(&'static BuiltinCity, f64)> {
    let coords: Vec<Coordinate> = BUILTIN_CITIES.iter().map(BuiltinCity::coordinate).collect();
    geo::nearest(target, &coords).map(|(i, d)| (&BUILTIN_CITIES[i], d))
}

/// A city entry for the public city list API.
#[derive(Debug, Clone, Serialize)]
pub struct CityInfo {
    pub name: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
}

/// Return the full built-in city list (for autocomplete / API).
pub fn builtin_city_list() -> Vec<CityInfo> {
    BUILTIN_CITIES
        .iter()
        .map(|c| CityInfo {
            name: c.display.to_string(),
            country: c.country.to_string(),
            lat: c.lat,
            lon: c.lon,
        })
        .collect()
}

/// Offline resolver over the built-in dataset.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinResolver;

#[async_trait]
impl PlaceResolver for BuiltinResolver {
    async fn forward(&self, name: &str) -> Result<ResolvedCity, ResolveError> {
        let city = lookup(name).ok_or_else(|| ResolveError::NotFound(name.to_string()))?;
        Ok(ResolvedCity {
            coordinate: city.coordinate(),
            display_label: city.place().full_address,
        })
    }

    async fn reverse(&self, coordinate: Coordinate, tier: ReverseTier) -> Result<PlaceInfo, ResolveError> {
        let radius = match tier {
            ReverseTier::Fine => FINE_RADIUS_KM,
            ReverseTier::Coarse => COARSE_RADIUS_KM,
        };
        Ok(match closest(coordinate) {
            Some((city, d)) if d <= radius => city.place(),
            _ => PlaceInfo::unknown_at(coordinate),
        })
    }

    async fn nearest_settlement(&self, coordinate: Coordinate) -> Settlement {
        match closest(coordinate) {
            Some((city, _)) => Settlement {
                coordinate: city.coordinate(),
                place: city.place(),
            },
            None => Settlement::raw(coordinate),
        }
    }
}
