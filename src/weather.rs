use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::grid::GridPoint;

/// Hourly variables requested from the provider, in response order.
const HOURLY_VARIABLES: &str = "temperature_2m,is_day,precipitation_probability,precipitation";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Weather provider rate limited the request: {0}")]
    RateLimited(String),
    #[error("Weather provider server error: {0}")]
    ServerError(String),
    #[error("Weather provider returned status {0}")]
    UnexpectedStatus(u16),
    #[error("Malformed weather response: {0}")]
    Shape(String),
}

impl FetchError {
    /// Transient failures worth another attempt.
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::RateLimited(_) | FetchError::ServerError(_) => true,
            FetchError::Request(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Which hourly window a run ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Past 24 hours, for backfill runs.
    History,
    /// Next hour only, for scheduled forecast runs.
    Forecast,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::History => "history",
            Mode::Forecast => "forecast",
        }
    }

    fn past_hours(&self) -> u32 {
        match self {
            Mode::History => 24,
            Mode::Forecast => 0,
        }
    }

    fn forecast_hours(&self) -> u32 {
        match self {
            Mode::History => 0,
            Mode::Forecast => 1,
        }
    }
}

/// One weather sample for one grid point at one forecast hour, as fetched.
/// Becomes a raw storage row once tagged with `loaded_at`.
#[derive(Debug, Clone)]
pub struct WeatherObservation {
    pub forecast_timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub location: String,
    pub is_day: bool,
    pub precipitation: f64,
    pub precipitation_probability: f64,
    pub temperature: f64,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct PointResponse {
    latitude: f64,
    longitude: f64,
    hourly: HourlyBlock,
}

#[derive(Debug, Deserialize)]
struct HourlyBlock {
    time: Vec<String>,
    temperature_2m: Vec<Option<f64>>,
    is_day: Vec<Option<f64>>,
    precipitation_probability: Vec<Option<f64>>,
    precipitation: Vec<Option<f64>>,
}

#[derive(Clone)]
pub struct WeatherFetcher {
    client: reqwest::Client,
    base_url: String,
    max_retries: usize,
}

impl WeatherFetcher {
    pub fn new() -> Self {
        Self::with_base_url("https://api.open-meteo.com/v1/forecast".to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            base_url,
            max_retries: 4,
        }
    }

    /// Fetch the hourly window for a batch of grid points and flatten the
    /// per-point responses into observation rows. Transient provider
    /// failures are retried with exponential backoff before surfacing.
    #[instrument(skip(self, points), fields(location = %location, points = points.len(), mode = %mode.as_str()))]
    pub async fn fetch_hourly(
        &self,
        points: &[GridPoint],
        mode: Mode,
        location: &str,
        ingested_at: DateTime<Utc>,
    ) -> Result<Vec<WeatherObservation>, FetchError> {
        if points.is_empty() {
            return Ok(Vec::new());
        }

        let latitudes = points
            .iter()
            .map(|p| p.latitude.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let longitudes = points
            .iter()
            .map(|p| p.longitude.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_times(self.max_retries)
            .with_jitter();

        let responses = (|| async { self.fetch_once(&latitudes, &longitudes, mode).await })
            .retry(backoff)
            .when(FetchError::is_retryable)
            .notify(|err: &FetchError, dur: Duration| {
                warn!("Retrying weather fetch in {:?}: {}", dur, err);
            })
            .await?;

        parse_responses(&responses, location, ingested_at)
    }

    async fn fetch_once(
        &self,
        latitudes: &str,
        longitudes: &str,
        mode: Mode,
    ) -> Result<Vec<PointResponse>, FetchError> {
        let params: Vec<(&str, String)> = vec![
            ("latitude", latitudes.to_string()),
            ("longitude", longitudes.to_string()),
            ("hourly", HOURLY_VARIABLES.to_string()),
            ("wind_speed_unit", "mph".to_string()),
            ("temperature_unit", "fahrenheit".to_string()),
            ("precipitation_unit", "inch".to_string()),
            ("past_hours", mode.past_hours().to_string()),
            ("forecast_hours", mode.forecast_hours().to_string()),
        ];

        debug!("Sending weather request");
        let response = self.client.get(&self.base_url).query(&params).send().await?;

        let status = response.status();
        debug!("Received weather response with status: {}", status);
        if status.as_u16() == 429 {
            return Err(FetchError::RateLimited(format!("status {status}")));
        }
        if status.is_server_error() {
            return Err(FetchError::ServerError(format!("status {status}")));
        }
        if !status.is_success() {
            return Err(FetchError::UnexpectedStatus(status.as_u16()));
        }

        // One point comes back as a bare object, several as an array.
        let body: serde_json::Value = response.json().await?;
        let responses = if body.is_array() {
            serde_json::from_value::<Vec<PointResponse>>(body)
        } else {
            serde_json::from_value::<PointResponse>(body).map(|single| vec![single])
        }
        .map_err(|e| FetchError::Shape(e.to_string()))?;

        Ok(responses)
    }
}

impl Default for WeatherFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_responses(
    responses: &[PointResponse],
    location: &str,
    ingested_at: DateTime<Utc>,
) -> Result<Vec<WeatherObservation>, FetchError> {
    let mut rows = Vec::new();
    for response in responses {
        rows.extend(parse_point_rows(response, location, ingested_at)?);
    }
    debug!(
        "Parsed {} observation rows from {} grid points",
        rows.len(),
        responses.len()
    );
    Ok(rows)
}

fn parse_point_rows(
    response: &PointResponse,
    location: &str,
    ingested_at: DateTime<Utc>,
) -> Result<Vec<WeatherObservation>, FetchError> {
    let hourly = &response.hourly;
    let hours = hourly.time.len();
    for (name, len) in [
        ("temperature_2m", hourly.temperature_2m.len()),
        ("is_day", hourly.is_day.len()),
        (
            "precipitation_probability",
            hourly.precipitation_probability.len(),
        ),
        ("precipitation", hourly.precipitation.len()),
    ] {
        if len != hours {
            return Err(FetchError::Shape(format!(
                "{name} has {len} values for {hours} hours"
            )));
        }
    }

    let mut rows = Vec::with_capacity(hours);
    for (idx, raw_time) in hourly.time.iter().enumerate() {
        let forecast_timestamp = parse_hour(raw_time)?;
        let is_day = match hourly.is_day[idx] {
            Some(flag) => flag != 0.0,
            None => {
                return Err(FetchError::Shape(format!(
                    "is_day missing at {raw_time}"
                )))
            }
        };

        rows.push(WeatherObservation {
            forecast_timestamp,
            latitude: response.latitude,
            longitude: response.longitude,
            location: location.to_string(),
            is_day,
            // A null numeric becomes NaN so the aggregator rejects the row
            // instead of treating the value as zero.
            precipitation: hourly.precipitation[idx].unwrap_or(f64::NAN),
            precipitation_probability: hourly.precipitation_probability[idx].unwrap_or(f64::NAN),
            temperature: hourly.temperature_2m[idx].unwrap_or(f64::NAN),
            ingested_at,
        });
    }
    Ok(rows)
}

fn parse_hour(raw: &str) -> Result<DateTime<Utc>, FetchError> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .map_err(|e| FetchError::Shape(format!("bad hour timestamp '{raw}': {e}")))?;
    Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn point_response() -> PointResponse {
        PointResponse {
            latitude: 39.75,
            longitude: -104.875,
            hourly: HourlyBlock {
                time: vec![
                    "2025-10-14T06:00".to_string(),
                    "2025-10-14T07:00".to_string(),
                ],
                temperature_2m: vec![Some(61.3), Some(63.9)],
                is_day: vec![Some(0.0), Some(1.0)],
                precipitation_probability: vec![Some(5.0), Some(10.0)],
                precipitation: vec![Some(0.0), Some(0.02)],
            },
        }
    }

    #[test]
    fn test_parse_hour() {
        let parsed = parse_hour("2025-10-14T06:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 10, 14, 6, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_hour_invalid() {
        let err = parse_hour("10/14/2025 06:00").unwrap_err();
        assert!(matches!(err, FetchError::Shape(_)));
    }

    #[test]
    fn test_parse_point_rows() {
        let ingested_at = Utc.with_ymd_and_hms(2025, 10, 14, 8, 0, 0).unwrap();
        let rows = parse_point_rows(&point_response(), "Denver, Colorado", ingested_at).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].location, "Denver, Colorado");
        assert_eq!(rows[0].latitude, 39.75);
        assert_eq!(rows[0].longitude, -104.875);
        assert_eq!(rows[0].temperature, 61.3);
        assert!(!rows[0].is_day);
        assert!(rows[1].is_day);
        assert_eq!(rows[1].precipitation, 0.02);
        assert_eq!(rows[1].ingested_at, ingested_at);
    }

    #[test]
    fn test_parse_point_rows_length_mismatch() {
        let mut response = point_response();
        response.hourly.temperature_2m.pop();

        let ingested_at = Utc.with_ymd_and_hms(2025, 10, 14, 8, 0, 0).unwrap();
        let err = parse_point_rows(&response, "Denver, Colorado", ingested_at).unwrap_err();
        assert!(matches!(err, FetchError::Shape(_)));
    }

    #[test]
    fn test_parse_point_rows_null_numeric_becomes_nan() {
        let mut response = point_response();
        response.hourly.precipitation_probability[0] = None;

        let ingested_at = Utc.with_ymd_and_hms(2025, 10, 14, 8, 0, 0).unwrap();
        let rows = parse_point_rows(&response, "Denver, Colorado", ingested_at).unwrap();
        assert!(rows[0].precipitation_probability.is_nan());
    }

    #[test]
    fn test_parse_point_rows_null_is_day_rejected() {
        let mut response = point_response();
        response.hourly.is_day[1] = None;

        let ingested_at = Utc.with_ymd_and_hms(2025, 10, 14, 8, 0, 0).unwrap();
        let err = parse_point_rows(&response, "Denver, Colorado", ingested_at).unwrap_err();
        assert!(matches!(err, FetchError::Shape(_)));
    }

    #[test]
    fn test_mode_windows() {
        assert_eq!(Mode::History.past_hours(), 24);
        assert_eq!(Mode::History.forecast_hours(), 0);
        assert_eq!(Mode::Forecast.past_hours(), 0);
        assert_eq!(Mode::Forecast.forecast_hours(), 1);
    }
}
