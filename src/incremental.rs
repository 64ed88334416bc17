use chrono::{DateTime, Utc};
use tracing::debug;

/// Keep only rows strictly newer than the watermark. With no watermark
/// (first run) everything is selected: a full backfill.
///
/// The accessor makes this serve both raw-level (`loaded_at`) and
/// aggregate-level (`source_updated_at`) selection.
pub fn newer_than<T>(
    rows: Vec<T>,
    watermark: Option<DateTime<Utc>>,
    updated_at: impl Fn(&T) -> DateTime<Utc>,
) -> Vec<T> {
    let mark = match watermark {
        Some(mark) => mark,
        None => {
            debug!("No watermark, selecting all {} rows", rows.len());
            return rows;
        }
    };

    let total = rows.len();
    let selected: Vec<T> = rows
        .into_iter()
        .filter(|row| updated_at(row) > mark)
        .collect();
    debug!(
        "Selected {} of {} rows past watermark {}",
        selected.len(),
        total,
        mark
    );
    selected
}
