//! OpenStreetMap Nominatim provider.
//!
//! ureq is blocking, so every request runs on tokio's blocking pool.

use super::resolver::PlaceResolver;
use super::types::{PlaceInfo, ResolveError, ResolvedCity, ReverseTier, Settlement, UNKNOWN_PLACE};
use crate::config::ResolverConfig;
use crate::geo::Coordinate;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

/// Zoom levels for `/reverse`: 10 is city, 8 county, 5 state.
const ZOOM_FINE: u8 = 10;
const ZOOM_COUNTY: u8 = 8;
const ZOOM_COARSE: u8 = 5;

// ─── Response shapes ────────────────────────────────────────────

#[derive(Deserialize, Debug, Clone)]
pub struct NominatimResult {
    pub lat: String,
    pub lon: String,
    pub display_name: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct NominatimAddress {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub town: Option<String>,
    #[serde(default)]
    pub village: Option<String>,
    #[serde(default)]
    pub municipality: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl NominatimAddress {
    /// First populated settlement field, most specific kind first.
    pub fn settlement_name(&self) -> Option<&str> {
        [&self.city, &self.town, &self.village, &self.municipality]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct NominatimReverse {
    #[serde(default)]
    pub lat: Option<String>,
    #[serde(default)]
    pub lon: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub address: Option<NominatimAddress>,
    #[serde(default)]
    pub error: Option<String>,
}

impl NominatimReverse {
    /// Convert to a place; the label is the sentinel when no settlement is named.
    pub fn to_place(&self, query: Coordinate) -> PlaceInfo {
        let address = self.address.clone().unwrap_or_default();
        PlaceInfo {
            place_label: address
                .settlement_name()
                .unwrap_or(UNKNOWN_PLACE)
                .to_string(),
            country: address.country.clone().unwrap_or_else(|| UNKNOWN_PLACE.to_string()),
            full_address: self
                .display_name
                .clone()
                .unwrap_or_else(|| query.to_string()),
        }
    }

    /// Position of the matched feature, when the response carries one.
    pub fn feature_coordinate(&self) -> Option<Coordinate> {
        let lat = self.lat.as_deref()?.parse().ok()?;
        let lon = self.lon.as_deref()?.parse().ok()?;
        Some(Coordinate::new(lat, lon))
    }
}

fn parse_coordinate(lat: &str, lon: &str) -> Result<Coordinate, ResolveError> {
    let lat: f64 = lat
        .parse()
        .map_err(|_| ResolveError::InvalidResponse(format!("bad latitude '{}'", lat)))?;
    let lon: f64 = lon
        .parse()
        .map_err(|_| ResolveError::InvalidResponse(format!("bad longitude '{}'", lon)))?;
    Ok(Coordinate::new(lat, lon))
}

fn zoom_for(tier: ReverseTier) -> u8 {
    match tier {
        ReverseTier::Fine => ZOOM_FINE,
        ReverseTier::Coarse => ZOOM_COARSE,
    }
}

// ─── Provider ───────────────────────────────────────────────────

/// Geocoder backed by a Nominatim instance.
#[derive(Clone)]
pub struct NominatimResolver {
    agent: ureq::Agent,
    config: ResolverConfig,
}

impl NominatimResolver {
    pub fn new(config: ResolverConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self { agent, config }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Run a GET on the blocking pool and decode its JSON body.
    async fn get_json<T>(&self, path: &str, query: Vec<(&'static str, String)>) -> Result<T, ResolveError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let agent = self.agent.clone();
        let url = self.endpoint(path);
        let user_agent = self.config.user_agent.clone();

        tokio::task::spawn_blocking(move || {
            let mut request = agent.get(&url).set("User-Agent", &user_agent);
            for (k, v) in &query {
                request = request.query(k, v);
            }
            let response = request
                .call()
                .map_err(|e| ResolveError::Network(e.to_string()))?;
            response
                .into_json::<T>()
                .map_err(|e| ResolveError::InvalidResponse(e.to_string()))
        })
        .await
        .map_err(|e| ResolveError::Network(format!("request task failed: {}", e)))?
    }

    async fn reverse_raw(&self, coordinate: Coordinate, zoom: u8) -> Result<NominatimReverse, ResolveError> {
        self.get_json(
            "reverse",
            vec![
                ("format", "json".to_string()),
                ("lat", coordinate.lat.to_string()),
                ("lon", coordinate.lon.to_string()),
                ("zoom", zoom.to_string()),
                ("addressdetails", "1".to_string()),
            ],
        )
        .await
    }
}

#[async_trait]
impl PlaceResolver for NominatimResolver {
    async fn forward(&self, name: &str) -> Result<ResolvedCity, ResolveError> {
        let results: Vec<NominatimResult> = self
            .get_json(
                "search",
                vec![
                    ("format", "json".to_string()),
                    ("limit", "1".to_string()),
                    ("q", name.to_string()),
                ],
            )
            .await?;

        let top = results
            .into_iter()
            .next()
            .ok_or_else(|| ResolveError::NotFound(name.to_string()))?;

        Ok(ResolvedCity {
            coordinate: parse_coordinate(&top.lat, &top.lon)?,
            display_label: top.display_name,
        })
    }

    async fn reverse(&self, coordinate: Coordinate, tier: ReverseTier) -> Result<PlaceInfo, ResolveError> {
        let raw = self.reverse_raw(coordinate, zoom_for(tier)).await?;
        if let Some(ref err) = raw.error {
            debug!(%coordinate, %tier, error = %err, "reverse lookup found nothing");
        }
        Ok(raw.to_place(coordinate))
    }

    /// County-level, then state-level reverse lookup, adopting the matched
    /// feature's own position; degrades to the raw coordinates.
    async fn nearest_settlement(&self, coordinate: Coordinate) -> Settlement {
        for zoom in [ZOOM_COUNTY, ZOOM_COARSE] {
            match self.reverse_raw(coordinate, zoom).await {
                Ok(raw) => {
                    let place = raw.to_place(coordinate);
                    if place.is_genuine_settlement() {
                        return Settlement {
                            coordinate: raw.feature_coordinate().unwrap_or(coordinate),
                            place,
                        };
                    }
                }
                Err(e) => warn!(%coordinate, zoom, error = %e, "settlement lookup failed"),
            }
        }
        Settlement::raw(coordinate)
    }
}
