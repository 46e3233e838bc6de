//! Shared expiring counters backing rate limits and AI budgets.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// Add `delta` to the counter at `key` and return the new value.
///
/// A counter whose expiry is at or before `now` restarts from zero and takes
/// the new `expires_at`; a live counter keeps its original expiry, so a fixed
/// window never slides.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn incr_counter(
    pool: &PgPool,
    key: &str,
    delta: i64,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<i64, DbError> {
    let count: i64 = sqlx::query_scalar(
        "INSERT INTO rate_counters (key, count, expires_at) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (key) DO UPDATE SET \
             count = CASE WHEN rate_counters.expires_at <= $4 \
                          THEN EXCLUDED.count \
                          ELSE rate_counters.count + EXCLUDED.count END, \
             expires_at = CASE WHEN rate_counters.expires_at <= $4 \
                               THEN EXCLUDED.expires_at \
                               ELSE rate_counters.expires_at END \
         RETURNING count",
    )
    .bind(key)
    .bind(delta)
    .bind(expires_at)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(count)
}
