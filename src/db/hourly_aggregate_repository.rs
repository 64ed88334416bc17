use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info, instrument};

use crate::aggregate::HourlyAggregate;
use crate::db::DbError;

#[derive(Clone)]
pub struct HourlyAggregateRepository {
    pool: PgPool,
}

impl HourlyAggregateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Highest watermark already merged; `None` before the first merge.
    #[instrument(skip(self))]
    pub async fn max_source_updated_at(&self) -> Result<Option<DateTime<Utc>>, DbError> {
        let watermark: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MAX(source_updated_at) FROM hourly_aggregates")
                .fetch_one(&self.pool)
                .await?;

        debug!("Current aggregate watermark: {:?}", watermark);
        Ok(watermark)
    }

    /// Merge the whole batch in one transaction: insert new keys, update
    /// every column except `created_at` on existing keys. A failure rolls
    /// the entire batch back, so the store never holds a partially-applied
    /// run.
    #[instrument(skip(self, aggregates), fields(count = aggregates.len()))]
    pub async fn upsert_aggregates(&self, aggregates: &[HourlyAggregate]) -> Result<usize, DbError> {
        debug!(
            "Beginning transaction to merge {} hourly aggregates",
            aggregates.len()
        );
        let mut tx = self.pool.begin().await?;

        for aggregate in aggregates {
            sqlx::query(
                r#"
                INSERT INTO hourly_aggregates
                    (location, forecast_timestamp, avg_temperature,
                     avg_precipitation_probability, total_precipitation, is_day,
                     grid_point_count, source_updated_at, summary,
                     created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
                ON CONFLICT (location, forecast_timestamp) DO UPDATE SET
                    avg_temperature = EXCLUDED.avg_temperature,
                    avg_precipitation_probability = EXCLUDED.avg_precipitation_probability,
                    total_precipitation = EXCLUDED.total_precipitation,
                    is_day = EXCLUDED.is_day,
                    grid_point_count = EXCLUDED.grid_point_count,
                    source_updated_at = EXCLUDED.source_updated_at,
                    summary = EXCLUDED.summary,
                    updated_at = NOW()
                "#,
            )
            .bind(&aggregate.location)
            .bind(aggregate.forecast_timestamp)
            .bind(aggregate.avg_temperature)
            .bind(aggregate.avg_precipitation_probability)
            .bind(aggregate.total_precipitation)
            .bind(aggregate.is_day)
            .bind(aggregate.grid_point_count)
            .bind(aggregate.source_updated_at)
            .bind(&aggregate.summary)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!("Merged {} hourly aggregates", aggregates.len());
        Ok(aggregates.len())
    }
}
