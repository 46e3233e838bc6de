//! Periodic evaluation of AI spend against user-configured budget alerts.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use chrono_tz::Tz;
use mentions_db::{BudgetAlertRow, DbError, NewBudgetAlertHistory};
use mentions_gate::local_midnight;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::notify::{dispatch_best_effort, parse_channels, AlertNotification, Notifier};

/// Repeat notifications for one alert are suppressed for this long after
/// `last_triggered_at`.
pub const SUPPRESSION_WINDOW: Duration = Duration::hours(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl AlertPeriod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AlertPeriod::Daily => "daily",
            AlertPeriod::Weekly => "weekly",
            AlertPeriod::Monthly => "monthly",
        }
    }
}

impl FromStr for AlertPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" => Ok(AlertPeriod::Daily),
            "weekly" | "week" => Ok(AlertPeriod::Weekly),
            "monthly" | "month" => Ok(AlertPeriod::Monthly),
            other => Err(format!("unknown alert period: {other}")),
        }
    }
}

/// `[start, end)` of the period containing `now`, in `tz`.
///
/// Weeks start on Sunday; months on the 1st.
#[must_use]
pub fn period_bounds(period: AlertPeriod, tz: Tz, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = now.with_timezone(&tz).date_naive();
    let (start, end): (NaiveDate, NaiveDate) = match period {
        AlertPeriod::Daily => (today, today.succ_opt().unwrap_or(today)),
        AlertPeriod::Weekly => {
            let back = i64::from(today.weekday().num_days_from_sunday());
            let start = today - Duration::days(back);
            (start, start + Duration::days(7))
        }
        AlertPeriod::Monthly => {
            let start = today.with_day(1).unwrap_or(today);
            (start, start.checked_add_months(Months::new(1)).unwrap_or(start))
        }
    };
    (local_midnight(tz, start), local_midnight(tz, end))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertClassification {
    Warning,
    Exceeded,
}

impl AlertClassification {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AlertClassification::Warning => "warning",
            AlertClassification::Exceeded => "exceeded",
        }
    }
}

/// Percent of `threshold` spent (two decimal places) and its classification.
///
/// Returns `None` for a non-positive threshold.
#[must_use]
pub fn classify_spend(
    spend: Decimal,
    threshold: Decimal,
    warning_percent: i16,
) -> Option<(Decimal, Option<AlertClassification>)> {
    if threshold <= Decimal::ZERO {
        return None;
    }
    let percent = (spend / threshold * Decimal::ONE_HUNDRED).round_dp(2);
    let class = if percent >= Decimal::ONE_HUNDRED {
        Some(AlertClassification::Exceeded)
    } else if percent >= Decimal::from(warning_percent) {
        Some(AlertClassification::Warning)
    } else {
        None
    };
    Some((percent, class))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    NoAction,
    Suppressed(AlertClassification),
    Notified(AlertClassification),
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationSummary {
    pub evaluated: usize,
    pub notified: usize,
    pub suppressed: usize,
    pub failed: usize,
    pub deliveries: usize,
}

pub struct BudgetAlertEvaluator {
    store: Arc<dyn crate::store::AlertStore>,
    notifier: Arc<dyn Notifier>,
    timezone: Tz,
}

impl BudgetAlertEvaluator {
    #[must_use]
    pub fn new(
        store: Arc<dyn crate::store::AlertStore>,
        notifier: Arc<dyn Notifier>,
        timezone: Tz,
    ) -> Self {
        Self {
            store,
            notifier,
            timezone,
        }
    }

    /// Evaluate every active alert. A failure on one alert is logged and
    /// counted; the rest are still evaluated.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] only if the active alerts cannot be listed.
    pub async fn evaluate_all(&self, now: DateTime<Utc>) -> Result<EvaluationSummary, DbError> {
        let alerts = self.store.list_active_alerts().await?;
        let mut summary = EvaluationSummary::default();
        for alert in alerts {
            summary.evaluated += 1;
            match self.evaluate_one(&alert, now).await {
                Ok((AlertOutcome::Notified(_), deliveries)) => {
                    summary.notified += 1;
                    summary.deliveries += deliveries;
                }
                Ok((AlertOutcome::Suppressed(_), _)) => summary.suppressed += 1,
                Ok(_) => {}
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(alert_id = %alert.id, error = %e, "budget alert evaluation failed");
                }
            }
        }
        Ok(summary)
    }

    /// Evaluate one alert, returning its outcome and the number of
    /// notification deliveries started.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if spend cannot be summed or the alert updated.
    pub async fn evaluate_one(
        &self,
        alert: &BudgetAlertRow,
        now: DateTime<Utc>,
    ) -> Result<(AlertOutcome, usize), DbError> {
        let period = match alert.period.parse::<AlertPeriod>() {
            Ok(period) => period,
            Err(reason) => {
                tracing::warn!(alert_id = %alert.id, %reason, "skipping budget alert");
                return Ok((AlertOutcome::Skipped, 0));
            }
        };
        let (start, end) = period_bounds(period, self.timezone, now);
        let spend = self
            .store
            .sum_ai_cost(&alert.user_id, alert.org_id.as_deref(), start, end)
            .await?;
        self.store.update_alert_spend(alert.id, spend).await?;

        let Some((percent, class)) =
            classify_spend(spend, alert.threshold_usd, alert.warning_percent)
        else {
            tracing::warn!(alert_id = %alert.id, threshold = %alert.threshold_usd, "non-positive budget threshold");
            return Ok((AlertOutcome::Skipped, 0));
        };
        let Some(class) = class else {
            return Ok((AlertOutcome::NoAction, 0));
        };

        if alert
            .last_triggered_at
            .is_some_and(|last| now - last < SUPPRESSION_WINDOW)
        {
            tracing::debug!(alert_id = %alert.id, classification = class.as_str(), "budget alert suppressed");
            return Ok((AlertOutcome::Suppressed(class), 0));
        }

        self.store
            .insert_alert_history(&NewBudgetAlertHistory {
                alert_id: alert.id,
                period_start: start,
                period_end: end,
                spend_usd: spend,
                percent,
                classification: class.as_str().to_owned(),
            })
            .await?;
        self.store.mark_alert_triggered(alert.id, now).await?;

        tracing::info!(
            alert_id = %alert.id,
            user_id = %alert.user_id,
            classification = class.as_str(),
            %spend,
            %percent,
            "budget alert triggered"
        );

        let notification = AlertNotification {
            alert_id: alert.id,
            user_id: alert.user_id.clone(),
            org_id: alert.org_id.clone(),
            classification: class.as_str().to_owned(),
            period: period.as_str().to_owned(),
            spend_usd: spend,
            threshold_usd: alert.threshold_usd,
            percent,
            period_start: start,
            period_end: end,
        };
        let deliveries =
            dispatch_best_effort(&self.notifier, parse_channels(&alert.channels), notification);
        Ok((AlertOutcome::Notified(class), deliveries))
    }
}
