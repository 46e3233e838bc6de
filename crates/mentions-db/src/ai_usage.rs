//! Database operations for the `ai_usage` cost ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// One AI call's cost record.
#[derive(Debug, Clone)]
pub struct NewAiUsage {
    pub user_id: String,
    pub monitor_id: Option<Uuid>,
    pub result_id: Option<i64>,
    pub operation: String,
    pub tokens: i64,
    pub cost_usd: Decimal,
}

/// Append a usage record.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_ai_usage(pool: &PgPool, usage: &NewAiUsage) -> Result<i64, DbError> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO ai_usage (user_id, monitor_id, result_id, operation, tokens, cost_usd) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING id",
    )
    .bind(&usage.user_id)
    .bind(usage.monitor_id)
    .bind(usage.result_id)
    .bind(&usage.operation)
    .bind(usage.tokens)
    .bind(usage.cost_usd)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Sum AI cost in `[start, end)`.
///
/// With `org_id` set the sum covers every user in that organisation;
/// otherwise only `user_id`'s own usage.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn sum_ai_cost(
    pool: &PgPool,
    user_id: &str,
    org_id: Option<&str>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Decimal, DbError> {
    let total: Decimal = sqlx::query_scalar(
        "SELECT COALESCE(SUM(u.cost_usd), 0) \
         FROM ai_usage u \
         WHERE u.created_at >= $2 AND u.created_at < $3 \
           AND CASE \
                 WHEN $4::text IS NULL THEN u.user_id = $1 \
                 ELSE u.user_id IN (SELECT id FROM users WHERE org_id = $4) \
               END",
    )
    .bind(user_id)
    .bind(start)
    .bind(end)
    .bind(org_id)
    .fetch_one(pool)
    .await?;
    Ok(total)
}
