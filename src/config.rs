use std::env;

use crate::geocoder::LocationSpec;
use crate::summary;

#[derive(Debug, Clone)]
pub struct Config {
    /// Optional so that dry runs work without a reachable database.
    pub database_url: Option<String>,
    pub geocoder_url: String,
    pub weather_url: String,
    pub anthropic_api_key: Option<String>,
    pub summary_model: String,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            database_url: env::var("DATABASE_URL").ok(),
            geocoder_url: env::var("GEOCODER_URL")
                .unwrap_or_else(|_| "https://nominatim.openstreetmap.org/search".to_string()),
            weather_url: env::var("WEATHER_URL")
                .unwrap_or_else(|_| "https://api.open-meteo.com/v1/forecast".to_string()),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok(),
            summary_model: env::var("SUMMARY_MODEL")
                .unwrap_or_else(|_| summary::DEFAULT_MODEL.to_string()),
        }
    }
}

/// Locations ingested when no `--location` arguments are given.
pub fn default_locations() -> Vec<LocationSpec> {
    vec![
        LocationSpec::CityState {
            city: "Atlanta".to_string(),
            state: "Georgia".to_string(),
        },
        LocationSpec::CityState {
            city: "New York".to_string(),
            state: "New York".to_string(),
        },
        LocationSpec::CityState {
            city: "Washington".to_string(),
            state: "DC".to_string(),
        },
        LocationSpec::CityState {
            city: "San Francisco".to_string(),
            state: "CA".to_string(),
        },
        LocationSpec::Freeform("Daniel Boone National Forest, USA".to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_locations() {
        let locations = default_locations();
        assert_eq!(locations.len(), 5);
        assert_eq!(locations[0].label(), "Atlanta, Georgia");
        assert_eq!(locations[4].label(), "Daniel Boone National Forest, USA");
    }
}
