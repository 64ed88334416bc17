use serde::Deserialize;
use tracing::{debug, instrument};

/// User-Agent sent with every geocoding request. Nominatim rejects requests
/// without one.
const USER_AGENT: &str = "weather-pipeline";

#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Geocoder returned status {0}")]
    UnexpectedStatus(u16),
    #[error("No geocoding results for '{0}'")]
    NoResults(String),
    #[error("Malformed bounding box: {0}")]
    InvalidBoundingBox(String),
    #[error("Unsupported bounding box extent: {0}")]
    UnsupportedExtent(String),
    #[error("Bounding box resolves to {points} grid points (max {max})")]
    GridTooLarge { points: usize, max: usize },
}

/// A location to ingest, either a city/state pair or a free-form place name.
/// The two forms map to different geocoder query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationSpec {
    CityState { city: String, state: String },
    Freeform(String),
}

impl LocationSpec {
    /// Parse a CLI location argument: 'City, State' becomes a pair, anything
    /// else stays a free-form query.
    pub fn parse(raw: &str) -> Self {
        if let Some((city, state)) = raw.split_once(',') {
            let city = city.trim();
            let state = state.trim();
            if !city.is_empty() && !state.is_empty() {
                return LocationSpec::CityState {
                    city: city.to_string(),
                    state: state.to_string(),
                };
            }
        }
        LocationSpec::Freeform(raw.trim().to_string())
    }

    /// Display name carried through the pipeline as the location key.
    pub fn label(&self) -> String {
        match self {
            LocationSpec::CityState { city, state } => format!("{city}, {state}"),
            LocationSpec::Freeform(name) => name.clone(),
        }
    }
}

/// Rectangular lat/lon region covering a named place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub south_lat: f64,
    pub north_lat: f64,
    pub west_lon: f64,
    pub east_lon: f64,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    // Corner order from the geocoder: [south, north, west, east]
    boundingbox: Vec<String>,
}

impl SearchResult {
    fn bounding_box(&self) -> Result<BoundingBox, ResolutionError> {
        if self.boundingbox.len() != 4 {
            return Err(ResolutionError::InvalidBoundingBox(format!(
                "expected 4 corners, got {}",
                self.boundingbox.len()
            )));
        }

        let corner = |idx: usize, name: &str| -> Result<f64, ResolutionError> {
            self.boundingbox[idx].parse::<f64>().map_err(|e| {
                ResolutionError::InvalidBoundingBox(format!(
                    "{name} '{}': {e}",
                    self.boundingbox[idx]
                ))
            })
        };

        Ok(BoundingBox {
            south_lat: corner(0, "south latitude")?,
            north_lat: corner(1, "north latitude")?,
            west_lon: corner(2, "west longitude")?,
            east_lon: corner(3, "east longitude")?,
        })
    }
}

#[derive(Clone)]
pub struct Geocoder {
    client: reqwest::Client,
    base_url: String,
}

impl Geocoder {
    pub fn new() -> Self {
        Self::with_base_url("https://nominatim.openstreetmap.org/search".to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            base_url,
        }
    }

    /// Resolve a location to its bounding box.
    #[instrument(skip(self), fields(location = %location.label()))]
    pub async fn geocode(&self, location: &LocationSpec) -> Result<BoundingBox, ResolutionError> {
        let mut params: Vec<(&str, String)> =
            vec![("format", "json".to_string()), ("limit", "1".to_string())];
        match location {
            LocationSpec::CityState { city, state } => {
                params.push(("city", city.clone()));
                params.push(("state", state.clone()));
            }
            LocationSpec::Freeform(name) => params.push(("q", name.clone())),
        }

        debug!("Sending geocoding request");
        let response = self
            .client
            .get(&self.base_url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        debug!("Received geocoder response with status: {}", status);
        if !status.is_success() {
            return Err(ResolutionError::UnexpectedStatus(status.as_u16()));
        }

        let results: Vec<SearchResult> = response.json().await?;
        let first = results
            .into_iter()
            .next()
            .ok_or_else(|| ResolutionError::NoResults(location.label()))?;

        first.bounding_box()
    }
}

impl Default for Geocoder {
    fn default() -> Self {
        Self::new()
    }
}
