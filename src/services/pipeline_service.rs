use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info, instrument, warn};

use crate::aggregate::{self, AggregationError, HourlyAggregate};
use crate::db::{
    DbError, HourlyAggregateRepository, RawObservation, RawObservationRepository,
};
use crate::dedup;
use crate::geocoder::{Geocoder, LocationSpec, ResolutionError};
use crate::grid;
use crate::incremental;
use crate::summary::SummaryClient;
use crate::weather::{FetchError, Mode, WeatherFetcher};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Resolution failed: {0}")]
    Resolution(#[from] ResolutionError),
    #[error("Weather fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Aggregation failed: {0}")]
    Aggregation(#[from] AggregationError),
    #[error("Raw storage access failed: {0}")]
    Storage(DbError),
    #[error("Analytics merge failed: {0}")]
    Merge(DbError),
}

/// Outcome of one location's ingest leg.
#[derive(Debug)]
pub struct LocationReport {
    pub label: String,
    pub grid_points: usize,
    pub observations: usize,
}

#[derive(Debug)]
pub struct LocationFailure {
    pub label: String,
    pub error: String,
}

/// What a run did: which locations ingested or failed, what the transform
/// produced, and whether the merge was applied (always false on dry runs).
#[derive(Debug, Default)]
pub struct RunReport {
    pub succeeded: Vec<LocationReport>,
    pub failed: Vec<LocationFailure>,
    pub aggregates: Vec<HourlyAggregate>,
    pub merged: bool,
}

/// End-to-end pipeline: geocode each location to a grid, fetch the hourly
/// window per grid point, stage the rows, then dedup, select past the
/// watermark, aggregate per hour, enrich with summaries, and merge.
#[derive(Clone)]
pub struct PipelineService {
    geocoder: Geocoder,
    weather: WeatherFetcher,
    raw_repo: RawObservationRepository,
    aggregate_repo: HourlyAggregateRepository,
    summarizer: Option<SummaryClient>,
}

impl PipelineService {
    pub fn new(
        pool: PgPool,
        geocoder: Geocoder,
        weather: WeatherFetcher,
        summarizer: Option<SummaryClient>,
    ) -> Self {
        Self {
            geocoder,
            weather,
            raw_repo: RawObservationRepository::new(pool.clone()),
            aggregate_repo: HourlyAggregateRepository::new(pool),
            summarizer,
        }
    }

    /// Run ingest for every location, then transform and merge.
    ///
    /// A location that fails to resolve or fetch is recorded in the report
    /// and the remaining locations continue; aggregation and merge failures
    /// abort the run before anything is written to the analytics store.
    ///
    /// With `dry_run` the full pipeline executes against the in-memory
    /// fetched batch and neither persistent write happens.
    #[instrument(skip(self, locations), fields(mode = %mode.as_str(), locations = locations.len(), dry_run = dry_run))]
    pub async fn run(
        &self,
        mode: Mode,
        locations: &[LocationSpec],
        dry_run: bool,
    ) -> Result<RunReport, PipelineError> {
        let run_started = Utc::now();
        let mut report = RunReport::default();
        let mut batch: Vec<RawObservation> = Vec::new();

        for location in locations {
            let label = location.label();
            match self.ingest_location(location, mode, run_started).await {
                Ok((grid_points, rows)) => {
                    info!(
                        "Ingested {} observations across {} grid points for {}",
                        rows.len(),
                        grid_points,
                        label
                    );
                    report.succeeded.push(LocationReport {
                        label,
                        grid_points,
                        observations: rows.len(),
                    });
                    batch.extend(rows);
                }
                Err(error @ (PipelineError::Resolution(_) | PipelineError::Fetch(_))) => {
                    warn!("Skipping location {}: {}", label, error);
                    report.failed.push(LocationFailure {
                        label,
                        error: error.to_string(),
                    });
                }
                Err(error) => return Err(error),
            }
        }

        let aggregates = if dry_run {
            // Dry runs never touch the store: no raw insert, no watermark,
            // no merge.
            self.transform(batch, None).await?
        } else {
            if !batch.is_empty() {
                self.raw_repo
                    .insert_observations(&batch)
                    .await
                    .map_err(PipelineError::Storage)?;
            }
            let watermark = self
                .aggregate_repo
                .max_source_updated_at()
                .await
                .map_err(PipelineError::Storage)?;
            let raw = self
                .raw_repo
                .find_all()
                .await
                .map_err(PipelineError::Storage)?;
            self.transform(raw, watermark).await?
        };

        if !dry_run && !aggregates.is_empty() {
            let merged = self
                .aggregate_repo
                .upsert_aggregates(&aggregates)
                .await
                .map_err(PipelineError::Merge)?;
            info!("Merged {} hourly aggregates", merged);
            report.merged = true;
        }

        report.aggregates = aggregates;
        Ok(report)
    }

    /// Resolve one location to its grid and fetch the hourly window.
    #[instrument(skip(self, location), fields(location = %location.label()))]
    async fn ingest_location(
        &self,
        location: &LocationSpec,
        mode: Mode,
        run_started: DateTime<Utc>,
    ) -> Result<(usize, Vec<RawObservation>), PipelineError> {
        let bbox = self.geocoder.geocode(location).await?;
        debug!("Bounding box: {:?}", bbox);

        let points = grid::sample_grid(&bbox)?;
        info!("Resolved {} to {} grid points", location.label(), points.len());

        let observations = self
            .weather
            .fetch_hourly(&points, mode, &location.label(), run_started)
            .await?;
        let rows = observations
            .into_iter()
            .map(|observation| RawObservation::from_fetched(observation, run_started))
            .collect();
        Ok((points.len(), rows))
    }

    /// Dedup, select past the watermark, aggregate, enrich.
    async fn transform(
        &self,
        raw: Vec<RawObservation>,
        watermark: Option<DateTime<Utc>>,
    ) -> Result<Vec<HourlyAggregate>, PipelineError> {
        let canonical = dedup::dedupe(raw);
        let selected = incremental::newer_than(canonical, watermark, |c| c.source_updated_at);
        let mut aggregates = aggregate::aggregate_hourly(&selected)?;
        info!(
            "Aggregated {} canonical rows into {} hourly aggregates",
            selected.len(),
            aggregates.len()
        );
        self.enrich(&mut aggregates).await;
        Ok(aggregates)
    }

    /// Attach generated summaries where possible. Enrichment is off the
    /// correctness path: a failure leaves `summary` empty and the merge
    /// proceeds.
    async fn enrich(&self, aggregates: &mut [HourlyAggregate]) {
        let summarizer = match &self.summarizer {
            Some(client) => client,
            None => {
                debug!("Summary client not configured, skipping enrichment");
                return;
            }
        };

        for aggregate in aggregates.iter_mut() {
            match summarizer.summarize(aggregate).await {
                Ok(text) => aggregate.summary = Some(text),
                Err(error) => warn!(
                    "Summary generation failed for {} at {}: {}",
                    aggregate.location, aggregate.forecast_timestamp, error
                ),
            }
        }
    }
}
