//! In-memory [`ScanStore`] and [`AlertStore`] for tests and local runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mentions_core::{Monitor, Platform, PlanTier};
use mentions_db::{BudgetAlertRow, DbError, NewAiUsage, NewBudgetAlertHistory, NewResult};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::store::{AlertStore, ScanStore};

/// A stored result plus its enrichment columns.
#[derive(Debug, Clone)]
pub struct StoredResult {
    pub id: i64,
    pub row: NewResult,
    pub ai_summary: Option<String>,
    pub ai_analyzed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct StoredUsage {
    pub usage: NewAiUsage,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    monitors: HashMap<Uuid, Monitor>,
    plans: HashMap<String, PlanTier>,
    orgs: HashMap<String, String>,
    results: Vec<StoredResult>,
    usage: Vec<StoredUsage>,
    alerts: Vec<BudgetAlertRow>,
    history: Vec<NewBudgetAlertHistory>,
}

/// Mutex-guarded store. Every operation is atomic with respect to the others,
/// so `try_claim_scan` behaves like the conditional `UPDATE` it stands in for.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_monitor(&self, monitor: Monitor) {
        self.state.lock().await.monitors.insert(monitor.id, monitor);
    }

    pub async fn set_plan(&self, user_id: &str, tier: PlanTier) {
        self.state
            .lock()
            .await
            .plans
            .insert(user_id.to_owned(), tier);
    }

    pub async fn set_org(&self, user_id: &str, org_id: &str) {
        self.state
            .lock()
            .await
            .orgs
            .insert(user_id.to_owned(), org_id.to_owned());
    }

    pub async fn insert_alert(&self, alert: BudgetAlertRow) {
        self.state.lock().await.alerts.push(alert);
    }

    /// Record AI spend at an explicit timestamp.
    pub async fn add_usage_at(&self, user_id: &str, cost_usd: Decimal, at: DateTime<Utc>) {
        self.state.lock().await.usage.push(StoredUsage {
            usage: NewAiUsage {
                user_id: user_id.to_owned(),
                monitor_id: None,
                result_id: None,
                operation: "test".to_owned(),
                tokens: 0,
                cost_usd,
            },
            created_at: at,
        });
    }

    /// Make result inserts fail, to exercise persistence-failure handling.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn monitor(&self, id: Uuid) -> Option<Monitor> {
        self.state.lock().await.monitors.get(&id).cloned()
    }

    pub async fn results(&self) -> Vec<StoredResult> {
        self.state.lock().await.results.clone()
    }

    pub async fn usage(&self) -> Vec<StoredUsage> {
        self.state.lock().await.usage.clone()
    }

    pub async fn alert(&self, id: Uuid) -> Option<BudgetAlertRow> {
        self.state
            .lock()
            .await
            .alerts
            .iter()
            .find(|a| a.id == id)
            .cloned()
    }

    pub async fn history(&self) -> Vec<NewBudgetAlertHistory> {
        self.state.lock().await.history.clone()
    }
}

fn write_failure() -> DbError {
    DbError::Sqlx(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl ScanStore for InMemoryStore {
    async fn get_monitor(&self, id: Uuid) -> Result<Option<Monitor>, DbError> {
        Ok(self.monitor(id).await)
    }

    async fn get_user_plan(&self, user_id: &str) -> Result<Option<PlanTier>, DbError> {
        Ok(self.state.lock().await.plans.get(user_id).copied())
    }

    async fn list_monitors_for_platforms(
        &self,
        platforms: &[Platform],
    ) -> Result<Vec<Monitor>, DbError> {
        let state = self.state.lock().await;
        let mut monitors: Vec<Monitor> = state
            .monitors
            .values()
            .filter(|m| m.is_active && m.platforms.iter().any(|p| platforms.contains(p)))
            .cloned()
            .collect();
        monitors.sort_by_key(|m| (m.last_checked_at, m.id));
        Ok(monitors)
    }

    async fn try_claim_scan(&self, id: Uuid) -> Result<bool, DbError> {
        let mut state = self.state.lock().await;
        match state.monitors.get_mut(&id) {
            Some(m) if m.is_active && !m.is_scanning => {
                m.is_scanning = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_scan(&self, id: Uuid) -> Result<(), DbError> {
        if let Some(m) = self.state.lock().await.monitors.get_mut(&id) {
            m.is_scanning = false;
        }
        Ok(())
    }

    async fn finish_scan(
        &self,
        id: Uuid,
        checked_at: DateTime<Utc>,
        manual_at: Option<DateTime<Utc>>,
        new_matches: i32,
    ) -> Result<(), DbError> {
        if let Some(m) = self.state.lock().await.monitors.get_mut(&id) {
            m.is_scanning = false;
            m.last_checked_at = Some(checked_at);
            if manual_at.is_some() {
                m.last_manual_scan_at = manual_at;
            }
            m.new_match_count += new_matches;
        }
        Ok(())
    }

    async fn insert_result(&self, result: &NewResult) -> Result<Option<i64>, DbError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(write_failure());
        }
        let mut state = self.state.lock().await;
        let duplicate = state
            .results
            .iter()
            .any(|r| r.row.monitor_id == result.monitor_id && r.row.source_url == result.source_url);
        if duplicate {
            return Ok(None);
        }
        let id = i64::try_from(state.results.len()).unwrap_or(i64::MAX) + 1;
        state.results.push(StoredResult {
            id,
            row: result.clone(),
            ai_summary: None,
            ai_analyzed_at: None,
        });
        Ok(Some(id))
    }

    async fn record_ai_usage(&self, usage: &NewAiUsage) -> Result<(), DbError> {
        self.state.lock().await.usage.push(StoredUsage {
            usage: usage.clone(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn apply_enrichment(
        &self,
        result_id: i64,
        sentiment: &str,
        category: &str,
        summary: Option<&str>,
    ) -> Result<bool, DbError> {
        let mut state = self.state.lock().await;
        let Some(stored) = state.results.iter_mut().find(|r| r.id == result_id) else {
            return Ok(false);
        };
        if stored.ai_analyzed_at.is_some() {
            return Ok(false);
        }
        stored.row.sentiment = Some(sentiment.to_owned());
        stored.row.conversation_category = category.to_owned();
        stored.ai_summary = summary.map(str::to_owned);
        stored.ai_analyzed_at = Some(Utc::now());
        Ok(true)
    }
}

#[async_trait]
impl AlertStore for InMemoryStore {
    async fn list_active_alerts(&self) -> Result<Vec<BudgetAlertRow>, DbError> {
        Ok(self
            .state
            .lock()
            .await
            .alerts
            .iter()
            .filter(|a| a.is_active)
            .cloned()
            .collect())
    }

    async fn sum_ai_cost(
        &self,
        user_id: &str,
        org_id: Option<&str>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Decimal, DbError> {
        let state = self.state.lock().await;
        let in_scope = |uid: &str| match org_id {
            Some(org) => state.orgs.get(uid).is_some_and(|o| o == org),
            None => uid == user_id,
        };
        Ok(state
            .usage
            .iter()
            .filter(|u| u.created_at >= start && u.created_at < end)
            .filter(|u| in_scope(&u.usage.user_id))
            .map(|u| u.usage.cost_usd)
            .sum())
    }

    async fn update_alert_spend(&self, id: Uuid, spend: Decimal) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        let alert = state
            .alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(DbError::NotFound)?;
        alert.current_period_spend = spend;
        Ok(())
    }

    async fn mark_alert_triggered(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        let alert = state
            .alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(DbError::NotFound)?;
        alert.last_triggered_at = Some(at);
        Ok(())
    }

    async fn insert_alert_history(&self, entry: &NewBudgetAlertHistory) -> Result<i64, DbError> {
        let mut state = self.state.lock().await;
        state.history.push(entry.clone());
        Ok(i64::try_from(state.history.len()).unwrap_or(i64::MAX))
    }
}
