//! Daily AI token budget per user.
//!
//! Tokens are reserved before an AI call and fail closed: a reservation that
//! would push the day's usage over the plan allowance is refused and rolled
//! back, so no call is ever made on credit. The day resets at midnight in
//! the reference timezone; each user has one counter whose expiry is the
//! next reset.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use mentions_core::PlanTier;

use crate::calendar::local_day_bounds;
use crate::store::{CounterStore, FallbackCounters};
use crate::GateError;

/// Tokens held for one AI call. Settle with [`AiBudget::settle`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct BudgetReservation {
    pub user_id: String,
    pub tokens: u64,
    pub used_after: u64,
    pub limit: u64,
    key: String,
    resets_at: DateTime<Utc>,
}

pub struct AiBudget {
    counters: FallbackCounters,
    timezone: Tz,
}

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn to_u64(v: i64) -> u64 {
    u64::try_from(v.max(0)).unwrap_or(0)
}

impl AiBudget {
    #[must_use]
    pub fn new(shared: Option<Arc<dyn CounterStore>>, timezone: Tz) -> Self {
        Self {
            counters: FallbackCounters::new(shared),
            timezone,
        }
    }

    fn day_key(&self, user_id: &str, now: DateTime<Utc>) -> (String, DateTime<Utc>) {
        let (_, resets_at) = local_day_bounds(self.timezone, now);
        (format!("ai_tokens:{user_id}"), resets_at)
    }

    /// Reserve `tokens` against `tier`'s daily allowance.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::BudgetExceeded`] when the plan has no AI
    /// allowance or the reservation would exceed it.
    pub async fn reserve(
        &self,
        user_id: &str,
        tier: PlanTier,
        tokens: u64,
        now: DateTime<Utc>,
    ) -> Result<BudgetReservation, GateError> {
        let limit = tier.limits().daily_ai_tokens;
        let (key, resets_at) = self.day_key(user_id, now);

        if !tier.limits().ai_features || limit == 0 {
            return Err(GateError::BudgetExceeded {
                used: 0,
                limit,
                resets_at,
            });
        }

        let used_after = to_u64(
            self.counters
                .incr_by(&key, to_i64(tokens), now, resets_at)
                .await,
        );
        if used_after > limit {
            let used = to_u64(
                self.counters
                    .incr_by(&key, -to_i64(tokens), now, resets_at)
                    .await,
            );
            tracing::info!(user_id, tokens, used, limit, "AI budget exceeded");
            return Err(GateError::BudgetExceeded {
                used,
                limit,
                resets_at,
            });
        }

        Ok(BudgetReservation {
            user_id: user_id.to_owned(),
            tokens,
            used_after,
            limit,
            key,
            resets_at,
        })
    }

    /// Replace the reserved amount with the tokens actually consumed.
    /// Pass `0` to release a reservation whose call failed.
    pub async fn settle(&self, reservation: BudgetReservation, actual_tokens: u64) -> u64 {
        self.settle_at(reservation, actual_tokens, Utc::now()).await
    }

    /// Settle as of `now`. A reservation made before the last reset is
    /// dropped: its day's counter is gone and the new day starts clean.
    pub async fn settle_at(
        &self,
        reservation: BudgetReservation,
        actual_tokens: u64,
        now: DateTime<Utc>,
    ) -> u64 {
        if now >= reservation.resets_at {
            return self.used_today(&reservation.user_id, now).await;
        }
        let delta = to_i64(actual_tokens) - to_i64(reservation.tokens);
        if delta == 0 {
            return reservation.used_after;
        }
        to_u64(
            self.counters
                .incr_by(&reservation.key, delta, now, reservation.resets_at)
                .await,
        )
    }

    /// Tokens used today by `user_id`.
    pub async fn used_today(&self, user_id: &str, now: DateTime<Utc>) -> u64 {
        let (key, resets_at) = self.day_key(user_id, now);
        to_u64(self.counters.incr_by(&key, 0, now, resets_at).await)
    }
}
