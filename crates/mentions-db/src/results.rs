//! Database operations for the `results` table.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `results` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ResultRow {
    pub id: i64,
    pub monitor_id: Uuid,
    pub source_url: String,
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    pub platform: String,
    pub posted_at: Option<DateTime<Utc>>,
    pub engagement_score: i32,
    pub lead_score: i32,
    pub lead_factors: Value,
    pub matched_terms: Vec<String>,
    pub sentiment: Option<String>,
    pub conversation_category: String,
    pub ai_summary: Option<String>,
    pub is_viewed: bool,
    pub is_hidden: bool,
    pub is_clicked: bool,
    pub created_at: DateTime<Utc>,
}

/// Values for a new result row.
#[derive(Debug, Clone)]
pub struct NewResult {
    pub monitor_id: Uuid,
    pub source_url: String,
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    pub platform: String,
    pub posted_at: Option<DateTime<Utc>>,
    pub engagement_score: i32,
    pub lead_score: i32,
    /// JSON object of per-factor lead-score contributions.
    pub lead_factors: Value,
    pub matched_terms: Vec<String>,
    pub sentiment: Option<String>,
    pub conversation_category: String,
}

/// Insert a result unless `(monitor_id, source_url)` already exists.
///
/// Returns the new id, or `None` when the URL was already stored for this
/// monitor.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_result(pool: &PgPool, result: &NewResult) -> Result<Option<i64>, DbError> {
    let id: Option<i64> = sqlx::query_scalar(
        "INSERT INTO results \
             (monitor_id, source_url, title, content, author, platform, posted_at, \
              engagement_score, lead_score, lead_factors, matched_terms, sentiment, \
              conversation_category) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         ON CONFLICT (monitor_id, source_url) DO NOTHING \
         RETURNING id",
    )
    .bind(result.monitor_id)
    .bind(&result.source_url)
    .bind(&result.title)
    .bind(&result.content)
    .bind(result.author.as_deref())
    .bind(&result.platform)
    .bind(result.posted_at)
    .bind(result.engagement_score)
    .bind(result.lead_score)
    .bind(&result.lead_factors)
    .bind(&result.matched_terms)
    .bind(result.sentiment.as_deref())
    .bind(&result.conversation_category)
    .fetch_optional(pool)
    .await?;

    Ok(id)
}

/// Write AI enrichment onto a result exactly once.
///
/// Returns `false` if the result was already enriched (or no longer exists).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn apply_result_enrichment(
    pool: &PgPool,
    id: i64,
    sentiment: &str,
    conversation_category: &str,
    summary: Option<&str>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE results \
         SET sentiment = $2, conversation_category = $3, ai_summary = $4, ai_analyzed_at = NOW() \
         WHERE id = $1 AND ai_analyzed_at IS NULL",
    )
    .bind(id)
    .bind(sentiment)
    .bind(conversation_category)
    .bind(summary)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// List a monitor's results, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_results_for_monitor(
    pool: &PgPool,
    monitor_id: Uuid,
    limit: i64,
) -> Result<Vec<ResultRow>, DbError> {
    let rows = sqlx::query_as::<_, ResultRow>(
        "SELECT id, monitor_id, source_url, title, content, author, platform, posted_at, \
                engagement_score, lead_score, lead_factors, matched_terms, sentiment, \
                conversation_category, ai_summary, is_viewed, is_hidden, is_clicked, created_at \
         FROM results \
         WHERE monitor_id = $1 \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2",
    )
    .bind(monitor_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
