use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::dedup::CanonicalObservation;

#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    #[error("Non-finite {field} for {location} at {forecast_timestamp}")]
    NonFiniteField {
        field: &'static str,
        location: String,
        forecast_timestamp: DateTime<Utc>,
    },
}

/// One analytics row per (location, forecast hour). `summary` is attached by
/// the enrichment step after aggregation; `created_at`/`updated_at` belong
/// to the store and are set at merge time.
#[derive(Debug, Clone)]
pub struct HourlyAggregate {
    pub location: String,
    pub forecast_timestamp: DateTime<Utc>,
    pub avg_temperature: f64,
    pub avg_precipitation_probability: f64,
    pub total_precipitation: f64,
    pub is_day: bool,
    pub grid_point_count: i32,
    pub source_updated_at: DateTime<Utc>,
    pub summary: Option<String>,
}

/// Group canonical observations by (location, forecast hour) and reduce each
/// group to one aggregate: mean temperature and precipitation probability,
/// summed precipitation, majority-vote day flag (an even split counts as
/// day), contributing row count, and the greatest contributing watermark.
///
/// A non-finite numeric anywhere in a group fails the whole aggregation;
/// a silently zero-filled statistic is worse than no statistic.
pub fn aggregate_hourly(
    rows: &[CanonicalObservation],
) -> Result<Vec<HourlyAggregate>, AggregationError> {
    let mut groups: BTreeMap<(String, DateTime<Utc>), Vec<&CanonicalObservation>> =
        BTreeMap::new();
    for canonical in rows {
        groups
            .entry((
                canonical.observation.location.clone(),
                canonical.observation.forecast_timestamp,
            ))
            .or_default()
            .push(canonical);
    }

    let mut aggregates = Vec::with_capacity(groups.len());
    for ((location, forecast_timestamp), members) in groups {
        aggregates.push(aggregate_group(location, forecast_timestamp, &members)?);
    }
    debug!(
        "Aggregated {} canonical rows into {} hourly aggregates",
        rows.len(),
        aggregates.len()
    );
    Ok(aggregates)
}

fn aggregate_group(
    location: String,
    forecast_timestamp: DateTime<Utc>,
    members: &[&CanonicalObservation],
) -> Result<HourlyAggregate, AggregationError> {
    // Groups exist only because rows do, so members is never empty
    let count = members.len();
    let mut temperature_sum = 0.0;
    let mut probability_sum = 0.0;
    let mut total_precipitation = 0.0;
    let mut day_votes = 0usize;
    let mut source_updated_at = members[0].source_updated_at;

    for canonical in members {
        let row = &canonical.observation;
        require_finite(row.temperature, "temperature", &location, forecast_timestamp)?;
        require_finite(
            row.precipitation_probability,
            "precipitation_probability",
            &location,
            forecast_timestamp,
        )?;
        require_finite(
            row.precipitation,
            "precipitation",
            &location,
            forecast_timestamp,
        )?;

        temperature_sum += row.temperature;
        probability_sum += row.precipitation_probability;
        total_precipitation += row.precipitation;
        if row.is_day {
            day_votes += 1;
        }
        if canonical.source_updated_at > source_updated_at {
            source_updated_at = canonical.source_updated_at;
        }
    }

    Ok(HourlyAggregate {
        location,
        forecast_timestamp,
        avg_temperature: temperature_sum / count as f64,
        avg_precipitation_probability: probability_sum / count as f64,
        total_precipitation,
        // Majority vote; an even split resolves to day
        is_day: day_votes * 2 >= count,
        grid_point_count: count as i32,
        source_updated_at,
        summary: None,
    })
}

fn require_finite(
    value: f64,
    field: &'static str,
    location: &str,
    forecast_timestamp: DateTime<Utc>,
) -> Result<(), AggregationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(AggregationError::NonFiniteField {
            field,
            location: location.to_string(),
            forecast_timestamp,
        })
    }
}
