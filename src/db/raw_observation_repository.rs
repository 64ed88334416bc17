use sqlx::PgPool;
use tracing::{debug, info, instrument};

use crate::db::{DbError, RawObservation};

#[derive(Clone)]
pub struct RawObservationRepository {
    pool: PgPool,
}

impl RawObservationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append a batch of observations in one transaction. Rows are never
    /// updated in place; duplicates by natural key are collapsed later by
    /// the deduplication stage.
    #[instrument(skip(self, rows), fields(count = rows.len()))]
    pub async fn insert_observations(&self, rows: &[RawObservation]) -> Result<usize, DbError> {
        debug!(
            "Beginning transaction to insert {} raw observations",
            rows.len()
        );
        let mut tx = self.pool.begin().await?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO raw_observations
                    (forecast_timestamp, latitude, longitude, location, is_day,
                     precipitation, precipitation_probability, temperature,
                     ingested_at, loaded_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(row.forecast_timestamp)
            .bind(row.latitude)
            .bind(row.longitude)
            .bind(&row.location)
            .bind(row.is_day)
            .bind(row.precipitation)
            .bind(row.precipitation_probability)
            .bind(row.temperature)
            .bind(row.ingested_at)
            .bind(row.loaded_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!("Inserted {} raw observations", rows.len());
        Ok(rows.len())
    }

    /// Full raw history in load order. Watermark selection happens in memory
    /// (see `incremental::newer_than`) so the selection policy lives in one
    /// place instead of being split between SQL and code.
    #[instrument(skip(self))]
    pub async fn find_all(&self) -> Result<Vec<RawObservation>, DbError> {
        let rows = sqlx::query_as::<_, RawObservation>(
            r#"
            SELECT forecast_timestamp, latitude, longitude, location, is_day,
                   precipitation, precipitation_probability, temperature,
                   ingested_at, loaded_at
            FROM raw_observations
            ORDER BY loaded_at, forecast_timestamp
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        debug!("Found {} raw observations", rows.len());
        Ok(rows)
    }
}
