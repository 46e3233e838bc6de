//! Fixed-window request limiting per `(user, operation class)`.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::store::{CounterStore, FallbackCounters};
use crate::GateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    Read,
    Write,
    Export,
}

impl OperationClass {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            OperationClass::Read => "read",
            OperationClass::Write => "write",
            OperationClass::Export => "export",
        }
    }
}

impl std::fmt::Display for OperationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requests allowed per window for each class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub read: u32,
    pub write: u32,
    pub export: u32,
    pub window_secs: i64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            read: 60,
            write: 20,
            export: 5,
            window_secs: 60,
        }
    }
}

impl RateLimits {
    #[must_use]
    pub const fn limit_for(&self, class: OperationClass) -> u32 {
        match class {
            OperationClass::Read => self.read,
            OperationClass::Write => self.write,
            OperationClass::Export => self.export,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the window resets; `0` when allowed.
    pub retry_after_secs: u64,
    pub reset_at: DateTime<Utc>,
}

/// Request-rate gate. Windows are aligned to the Unix epoch, so every
/// counter resets to zero exactly on a window boundary. Each
/// `(user, class)` pair owns one counter that is reused across windows.
pub struct RateGate {
    counters: FallbackCounters,
    limits: RateLimits,
}

impl RateGate {
    /// Gate backed by `shared` with an in-process fallback; pass `None` for
    /// in-process counters only.
    #[must_use]
    pub fn new(shared: Option<Arc<dyn CounterStore>>, limits: RateLimits) -> Self {
        Self {
            counters: FallbackCounters::new(shared),
            limits,
        }
    }

    #[must_use]
    pub fn limits(&self) -> RateLimits {
        self.limits
    }

    fn window_end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let width = self.limits.window_secs.max(1);
        let start = now.timestamp().div_euclid(width) * width;
        Utc.timestamp_opt(start + width, 0)
            .single()
            .unwrap_or(now)
    }

    /// Count one request and decide whether it is allowed.
    pub async fn check(&self, user_id: &str, class: OperationClass) -> RateDecision {
        self.check_at(user_id, class, Utc::now()).await
    }

    pub async fn check_at(
        &self,
        user_id: &str,
        class: OperationClass,
        now: DateTime<Utc>,
    ) -> RateDecision {
        let reset_at = self.window_end(now);
        let key = format!("rate:{user_id}:{class}");
        let count = self.counters.incr_by(&key, 1, now, reset_at).await;
        let limit = self.limits.limit_for(class);
        let used = u32::try_from(count.max(0)).unwrap_or(u32::MAX);

        if used > limit {
            let millis = (reset_at - now).num_milliseconds().max(1);
            let retry_after_secs = u64::try_from(millis).unwrap_or(1).div_ceil(1000);
            tracing::debug!(user_id, class = %class, used, limit, retry_after_secs, "rate limited");
            RateDecision {
                allowed: false,
                limit,
                remaining: 0,
                retry_after_secs,
                reset_at,
            }
        } else {
            RateDecision {
                allowed: true,
                limit,
                remaining: limit - used,
                retry_after_secs: 0,
                reset_at,
            }
        }
    }

    /// Like [`RateGate::check_at`], but a denial becomes [`GateError::RateLimited`].
    ///
    /// # Errors
    ///
    /// Returns [`GateError::RateLimited`] when the window's limit is exhausted.
    pub async fn enforce_at(
        &self,
        user_id: &str,
        class: OperationClass,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, GateError> {
        let decision = self.check_at(user_id, class, now).await;
        if decision.allowed {
            Ok(decision)
        } else {
            Err(GateError::RateLimited {
                class,
                retry_after_secs: decision.retry_after_secs,
            })
        }
    }
}
