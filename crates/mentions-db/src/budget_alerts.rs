//! Database operations for `budget_alerts` and `budget_alert_history`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `budget_alerts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BudgetAlertRow {
    pub id: Uuid,
    pub user_id: String,
    pub org_id: Option<String>,
    /// `daily`, `weekly` or `monthly`.
    pub period: String,
    pub threshold_usd: Decimal,
    pub warning_percent: i16,
    pub current_period_spend: Decimal,
    /// JSON array of notification channel objects.
    pub channels: Value,
    pub is_active: bool,
    pub last_triggered_at: Option<DateTime<Utc>>,
}

/// A row from the `budget_alert_history` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BudgetAlertHistoryRow {
    pub id: i64,
    pub alert_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub spend_usd: Decimal,
    pub percent: Decimal,
    pub classification: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBudgetAlertHistory {
    pub alert_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub spend_usd: Decimal,
    pub percent: Decimal,
    pub classification: String,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// List all active budget alerts.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_budget_alerts(pool: &PgPool) -> Result<Vec<BudgetAlertRow>, DbError> {
    let rows = sqlx::query_as::<_, BudgetAlertRow>(
        "SELECT id, user_id, org_id, period, threshold_usd, warning_percent, \
                current_period_spend, channels, is_active, last_triggered_at \
         FROM budget_alerts \
         WHERE is_active \
         ORDER BY created_at, id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Store the spend computed by the latest evaluation.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn update_budget_alert_spend(
    pool: &PgPool,
    id: Uuid,
    spend: Decimal,
) -> Result<(), DbError> {
    sqlx::query("UPDATE budget_alerts SET current_period_spend = $2 WHERE id = $1")
        .bind(id)
        .bind(spend)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record that a notification was sent for this alert at `at`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_budget_alert_triggered(
    pool: &PgPool,
    id: Uuid,
    at: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query("UPDATE budget_alerts SET last_triggered_at = $2 WHERE id = $1")
        .bind(id)
        .bind(at)
        .execute(pool)
        .await?;
    Ok(())
}

/// Append an immutable history row and return its id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_budget_alert_history(
    pool: &PgPool,
    entry: &NewBudgetAlertHistory,
) -> Result<i64, DbError> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO budget_alert_history \
             (alert_id, period_start, period_end, spend_usd, percent, classification) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING id",
    )
    .bind(entry.alert_id)
    .bind(entry.period_start)
    .bind(entry.period_end)
    .bind(entry.spend_usd)
    .bind(entry.percent)
    .bind(&entry.classification)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// List an alert's history, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_budget_alert_history(
    pool: &PgPool,
    alert_id: Uuid,
    limit: i64,
) -> Result<Vec<BudgetAlertHistoryRow>, DbError> {
    let rows = sqlx::query_as::<_, BudgetAlertHistoryRow>(
        "SELECT id, alert_id, period_start, period_end, spend_usd, percent, classification, \
                created_at \
         FROM budget_alert_history \
         WHERE alert_id = $1 \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2",
    )
    .bind(alert_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
