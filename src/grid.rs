use std::collections::HashSet;

use tracing::debug;

use crate::geocoder::{BoundingBox, ResolutionError};

/// Native resolution of the ICON global model (~13 km), the grid the weather
/// provider samples on.
pub const GRID_STEP_DEG: f64 = 0.125;

/// Upper bound on sample points per location. A box that needs more than
/// this is almost certainly a country-scale geocoding result, not a place
/// we want to fan out weather calls for.
pub const MAX_GRID_POINTS: usize = 1024;

/// Points closer than this on both axes count as the same sample.
const COORD_TOLERANCE_DEG: f64 = 1e-6;

/// One sampled coordinate used to approximate weather across an area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Sample a bounding box on a uniform grid at the model's native step.
///
/// Deterministic: the same box always yields the same point set, ordered
/// south-to-north then west-to-east. A degenerate (point-like) box yields
/// exactly one point. Boxes that cross the antimeridian or touch a pole are
/// rejected rather than wrapped.
pub fn sample_grid(bbox: &BoundingBox) -> Result<Vec<GridPoint>, ResolutionError> {
    validate_extent(bbox)?;

    let lat_steps = steps_across(bbox.south_lat, bbox.north_lat);
    let lon_steps = steps_across(bbox.west_lon, bbox.east_lon);
    let expected = lat_steps * lon_steps;
    if expected > MAX_GRID_POINTS {
        return Err(ResolutionError::GridTooLarge {
            points: expected,
            max: MAX_GRID_POINTS,
        });
    }

    let mut points = Vec::with_capacity(expected);
    let mut seen: HashSet<(i64, i64)> = HashSet::with_capacity(expected);
    for lat_idx in 0..lat_steps {
        let latitude = bbox.south_lat + lat_idx as f64 * GRID_STEP_DEG;
        for lon_idx in 0..lon_steps {
            let longitude = bbox.west_lon + lon_idx as f64 * GRID_STEP_DEG;
            if seen.insert((quantize(latitude), quantize(longitude))) {
                points.push(GridPoint {
                    latitude,
                    longitude,
                });
            }
        }
    }

    debug!(
        "Sampled {} grid points ({} x {}) at {} degree step",
        points.len(),
        lat_steps,
        lon_steps,
        GRID_STEP_DEG
    );
    Ok(points)
}

fn validate_extent(bbox: &BoundingBox) -> Result<(), ResolutionError> {
    let corners = [
        bbox.south_lat,
        bbox.north_lat,
        bbox.west_lon,
        bbox.east_lon,
    ];
    if corners.iter().any(|c| !c.is_finite()) {
        return Err(ResolutionError::InvalidBoundingBox(
            "non-finite corner".to_string(),
        ));
    }
    if bbox.south_lat > bbox.north_lat {
        return Err(ResolutionError::InvalidBoundingBox(format!(
            "south latitude {} above north latitude {}",
            bbox.south_lat, bbox.north_lat
        )));
    }
    if bbox.west_lon > bbox.east_lon {
        return Err(ResolutionError::UnsupportedExtent(
            "box crosses the antimeridian".to_string(),
        ));
    }
    if bbox.north_lat >= 90.0 || bbox.south_lat <= -90.0 {
        return Err(ResolutionError::UnsupportedExtent(
            "box touches a pole".to_string(),
        ));
    }
    if bbox.west_lon < -180.0 || bbox.east_lon > 180.0 {
        return Err(ResolutionError::UnsupportedExtent(
            "longitude out of range".to_string(),
        ));
    }
    Ok(())
}

/// Number of samples covering [lo, hi] inclusive; 1 for a degenerate span.
fn steps_across(lo: f64, hi: f64) -> usize {
    ((hi - lo) / GRID_STEP_DEG).floor() as usize + 1
}

fn quantize(value: f64) -> i64 {
    (value / COORD_TOLERANCE_DEG).round() as i64
}
