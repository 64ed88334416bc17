use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::weather::WeatherObservation;

/// One weather sample for one grid point at one forecast hour, as staged in
/// raw storage. (`forecast_timestamp`, `latitude`, `longitude`) is the
/// natural key; re-ingestion appends new rows with a fresh `loaded_at`
/// instead of updating in place, and deduplication later keeps the newest.
#[derive(Debug, Clone, FromRow)]
pub struct RawObservation {
    pub forecast_timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub location: String,
    pub is_day: bool,
    pub precipitation: f64,
    pub precipitation_probability: f64,
    pub temperature: f64,
    pub ingested_at: DateTime<Utc>,
    pub loaded_at: DateTime<Utc>,
}

impl RawObservation {
    /// Tag a fetched observation with the instant it is written to raw
    /// storage.
    pub fn from_fetched(observation: WeatherObservation, loaded_at: DateTime<Utc>) -> Self {
        Self {
            forecast_timestamp: observation.forecast_timestamp,
            latitude: observation.latitude,
            longitude: observation.longitude,
            location: observation.location,
            is_day: observation.is_day,
            precipitation: observation.precipitation,
            precipitation_probability: observation.precipitation_probability,
            temperature: observation.temperature,
            ingested_at: observation.ingested_at,
            loaded_at,
        }
    }
}
