//! Expiring counter stores backing the rate gate and AI budget.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::GateError;

/// Atomic add-and-read on an expiring counter.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Add `delta` to `key` and return the new value.
    ///
    /// A counter whose expiry is at or before `now` restarts from zero and
    /// adopts `expires_at`; a live counter keeps its original expiry.
    async fn incr_by(
        &self,
        key: &str,
        delta: i64,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<i64, GateError>;
}

#[derive(Debug, Clone, Copy)]
struct LocalCounter {
    count: i64,
    expires_at: DateTime<Utc>,
}

/// Per-process counters. Used directly in single-instance setups and as the
/// fallback when the shared store is unreachable.
#[derive(Debug, Default)]
pub struct InProcessCounters {
    counters: Mutex<HashMap<String, LocalCounter>>,
}

impl InProcessCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of counters held, live or expired.
    pub async fn tracked_keys(&self) -> usize {
        self.counters.lock().await.len()
    }

    /// Drop counters that expired at or before `now`.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut counters = self.counters.lock().await;
        let before = counters.len();
        counters.retain(|_, c| c.expires_at > now);
        before - counters.len()
    }
}

#[async_trait]
impl CounterStore for InProcessCounters {
    async fn incr_by(
        &self,
        key: &str,
        delta: i64,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<i64, GateError> {
        let mut counters = self.counters.lock().await;
        let counter = counters
            .entry(key.to_owned())
            .or_insert(LocalCounter { count: 0, expires_at });
        if counter.expires_at <= now {
            *counter = LocalCounter { count: 0, expires_at };
        }
        counter.count = counter.count.saturating_add(delta);
        Ok(counter.count)
    }
}

/// Counters shared across instances through the `rate_counters` table.
#[derive(Debug, Clone)]
pub struct PgCounterStore {
    pool: PgPool,
}

impl PgCounterStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CounterStore for PgCounterStore {
    async fn incr_by(
        &self,
        key: &str,
        delta: i64,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<i64, GateError> {
        Ok(mentions_db::incr_counter(&self.pool, key, delta, now, expires_at).await?)
    }
}

/// Shared store with an in-process fallback.
///
/// Any error from the shared store is logged and the operation is retried
/// against local counters, trading cross-instance accuracy for availability.
pub(crate) struct FallbackCounters {
    shared: Option<std::sync::Arc<dyn CounterStore>>,
    local: InProcessCounters,
}

impl FallbackCounters {
    pub(crate) fn new(shared: Option<std::sync::Arc<dyn CounterStore>>) -> Self {
        Self {
            shared,
            local: InProcessCounters::new(),
        }
    }

    pub(crate) async fn incr_by(
        &self,
        key: &str,
        delta: i64,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> i64 {
        if let Some(shared) = &self.shared {
            match shared.incr_by(key, delta, now, expires_at).await {
                Ok(count) => return count,
                Err(e) => {
                    tracing::warn!(key, error = %e, "shared counter store unavailable; using local counters");
                }
            }
        }
        // Local counters never fail.
        self.local
            .incr_by(key, delta, now, expires_at)
            .await
            .unwrap_or(delta)
    }
}
