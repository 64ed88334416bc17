use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::db::RawObservation;

/// Natural key of a raw observation: forecast hour plus the exact grid
/// coordinate. Coordinates are keyed by bit pattern; the provider echoes
/// grid coordinates back verbatim, so equal points are bit-equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ObservationKey {
    forecast_timestamp: DateTime<Utc>,
    lat_bits: u64,
    lon_bits: u64,
}

impl ObservationKey {
    fn of(row: &RawObservation) -> Self {
        Self {
            forecast_timestamp: row.forecast_timestamp,
            lat_bits: row.latitude.to_bits(),
            lon_bits: row.longitude.to_bits(),
        }
    }
}

/// The single surviving observation per natural key, carrying the watermark
/// value used for incremental selection.
#[derive(Debug, Clone)]
pub struct CanonicalObservation {
    pub observation: RawObservation,
    pub source_updated_at: DateTime<Utc>,
}

/// Collapse raw rows to one per natural key, keeping the row with the
/// greatest `loaded_at`. Ties are broken by input position: the later row
/// wins, matching reload semantics where a rerun's rows arrive last.
///
/// Single pass with a per-key best-so-far table; no wall-clock dependency.
/// Output is ordered by natural key so repeated runs over the same input
/// produce identical batches.
pub fn dedupe(rows: Vec<RawObservation>) -> Vec<CanonicalObservation> {
    let total = rows.len();
    let mut best: HashMap<ObservationKey, RawObservation> = HashMap::with_capacity(total);
    for row in rows {
        let key = ObservationKey::of(&row);
        match best.get(&key) {
            Some(current) if current.loaded_at > row.loaded_at => {}
            _ => {
                best.insert(key, row);
            }
        }
    }

    let mut canonical: Vec<CanonicalObservation> = best
        .into_values()
        .map(|observation| CanonicalObservation {
            source_updated_at: observation.loaded_at,
            observation,
        })
        .collect();
    canonical.sort_by(|a, b| {
        a.observation
            .forecast_timestamp
            .cmp(&b.observation.forecast_timestamp)
            .then(a.observation.latitude.total_cmp(&b.observation.latitude))
            .then(a.observation.longitude.total_cmp(&b.observation.longitude))
    });

    debug!("Deduplicated {} raw rows to {} canonical rows", total, canonical.len());
    canonical
}
