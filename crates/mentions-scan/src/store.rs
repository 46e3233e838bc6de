//! Persistence seams for the scheduler and the alert evaluator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mentions_core::{Monitor, Platform, PlanTier};
use mentions_db::{
    BudgetAlertRow, DbError, MonitorRow, NewAiUsage, NewBudgetAlertHistory, NewResult,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

#[async_trait]
pub trait ScanStore: Send + Sync {
    async fn get_monitor(&self, id: Uuid) -> Result<Option<Monitor>, DbError>;

    async fn get_user_plan(&self, user_id: &str) -> Result<Option<PlanTier>, DbError>;

    /// Active monitors configured for at least one of `platforms`.
    async fn list_monitors_for_platforms(
        &self,
        platforms: &[Platform],
    ) -> Result<Vec<Monitor>, DbError>;

    /// Atomically set `is_scanning` if it is clear and the monitor is active.
    async fn try_claim_scan(&self, id: Uuid) -> Result<bool, DbError>;

    /// Clear `is_scanning` for a claim that never ran.
    async fn release_scan(&self, id: Uuid) -> Result<(), DbError>;

    /// Clear `is_scanning` and record the scan's statistics.
    async fn finish_scan(
        &self,
        id: Uuid,
        checked_at: DateTime<Utc>,
        manual_at: Option<DateTime<Utc>>,
        new_matches: i32,
    ) -> Result<(), DbError>;

    /// Insert unless `(monitor_id, source_url)` exists; `None` on duplicate.
    async fn insert_result(&self, result: &NewResult) -> Result<Option<i64>, DbError>;

    async fn record_ai_usage(&self, usage: &NewAiUsage) -> Result<(), DbError>;

    /// Write AI enrichment once; `false` if the result was already enriched.
    async fn apply_enrichment(
        &self,
        result_id: i64,
        sentiment: &str,
        category: &str,
        summary: Option<&str>,
    ) -> Result<bool, DbError>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn list_active_alerts(&self) -> Result<Vec<BudgetAlertRow>, DbError>;

    /// Total AI cost in `[start, end)` for the user, or for the whole org when set.
    async fn sum_ai_cost(
        &self,
        user_id: &str,
        org_id: Option<&str>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Decimal, DbError>;

    async fn update_alert_spend(&self, id: Uuid, spend: Decimal) -> Result<(), DbError>;

    async fn mark_alert_triggered(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DbError>;

    async fn insert_alert_history(&self, entry: &NewBudgetAlertHistory) -> Result<i64, DbError>;
}

/// Postgres implementation of both seams.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn rows_into_monitors(rows: Vec<MonitorRow>) -> Vec<Monitor> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            match row.into_monitor() {
                Ok(monitor) => Some(monitor),
                Err(e) => {
                    tracing::warn!(monitor_id = %id, error = %e, "skipping unreadable monitor");
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl ScanStore for PgStore {
    async fn get_monitor(&self, id: Uuid) -> Result<Option<Monitor>, DbError> {
        mentions_db::get_monitor(&self.pool, id)
            .await?
            .map(MonitorRow::into_monitor)
            .transpose()
    }

    async fn get_user_plan(&self, user_id: &str) -> Result<Option<PlanTier>, DbError> {
        mentions_db::get_user_plan(&self.pool, user_id).await
    }

    async fn list_monitors_for_platforms(
        &self,
        platforms: &[Platform],
    ) -> Result<Vec<Monitor>, DbError> {
        let names: Vec<String> = platforms.iter().map(|p| p.as_str().to_owned()).collect();
        let rows = mentions_db::list_active_monitors_for_platforms(&self.pool, &names).await?;
        Ok(rows_into_monitors(rows))
    }

    async fn try_claim_scan(&self, id: Uuid) -> Result<bool, DbError> {
        mentions_db::try_claim_scan(&self.pool, id).await
    }

    async fn release_scan(&self, id: Uuid) -> Result<(), DbError> {
        mentions_db::release_scan(&self.pool, id).await
    }

    async fn finish_scan(
        &self,
        id: Uuid,
        checked_at: DateTime<Utc>,
        manual_at: Option<DateTime<Utc>>,
        new_matches: i32,
    ) -> Result<(), DbError> {
        mentions_db::finish_scan(&self.pool, id, checked_at, manual_at, new_matches).await
    }

    async fn insert_result(&self, result: &NewResult) -> Result<Option<i64>, DbError> {
        mentions_db::insert_result(&self.pool, result).await
    }

    async fn record_ai_usage(&self, usage: &NewAiUsage) -> Result<(), DbError> {
        mentions_db::insert_ai_usage(&self.pool, usage).await?;
        Ok(())
    }

    async fn apply_enrichment(
        &self,
        result_id: i64,
        sentiment: &str,
        category: &str,
        summary: Option<&str>,
    ) -> Result<bool, DbError> {
        mentions_db::apply_result_enrichment(&self.pool, result_id, sentiment, category, summary)
            .await
    }
}

#[async_trait]
impl AlertStore for PgStore {
    async fn list_active_alerts(&self) -> Result<Vec<BudgetAlertRow>, DbError> {
        mentions_db::list_active_budget_alerts(&self.pool).await
    }

    async fn sum_ai_cost(
        &self,
        user_id: &str,
        org_id: Option<&str>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Decimal, DbError> {
        mentions_db::sum_ai_cost(&self.pool, user_id, org_id, start, end).await
    }

    async fn update_alert_spend(&self, id: Uuid, spend: Decimal) -> Result<(), DbError> {
        mentions_db::update_budget_alert_spend(&self.pool, id, spend).await
    }

    async fn mark_alert_triggered(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DbError> {
        mentions_db::mark_budget_alert_triggered(&self.pool, id, at).await
    }

    async fn insert_alert_history(&self, entry: &NewBudgetAlertHistory) -> Result<i64, DbError> {
        mentions_db::insert_budget_alert_history(&self.pool, entry).await
    }
}
