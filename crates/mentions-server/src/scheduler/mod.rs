//! Background job scheduler.
//!
//! Registers one recurring scan job per source category plus the budget
//! alert sweep. Scan jobs only enqueue work; the worker pool runs it.

mod budget_alerts;

use std::sync::Arc;

use mentions_core::SourceCategory;
use mentions_scan::{BudgetAlertEvaluator, ScanQueue};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the background job scheduler.
///
/// The returned [`JobScheduler`] must be kept alive for the lifetime of the
/// process; call `shutdown` on it before stopping the worker pool.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(
    queue: ScanQueue,
    evaluator: Arc<BudgetAlertEvaluator>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    for category in SourceCategory::ALL {
        register_category_job(&scheduler, queue.clone(), category).await?;
    }
    budget_alerts::register_budget_alert_job(&scheduler, evaluator).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Cron expression from `var` when set and non-blank, else `default`.
pub(crate) fn cron_expression(
    lookup: impl Fn(&str) -> Option<String>,
    var: &str,
    default: &str,
) -> String {
    lookup(var)
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_owned())
}

fn env_lookup(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

/// Register the recurring scan job for one source category.
///
/// The schedule comes from the category's env override, falling back to its
/// built-in default.
async fn register_category_job(
    scheduler: &JobScheduler,
    queue: ScanQueue,
    category: SourceCategory,
) -> Result<(), JobSchedulerError> {
    let cron = cron_expression(env_lookup, category.cron_env_var(), category.default_cron());

    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let queue = queue.clone();

        Box::pin(async move {
            tracing::info!(category = category.as_str(), "scheduler: starting scan run");
            match mentions_scan::enqueue_category(&queue, category).await {
                Ok(summary) => tracing::info!(
                    category = category.as_str(),
                    considered = summary.considered,
                    enqueued = summary.enqueued,
                    deferred = summary.deferred,
                    skipped = summary.skipped,
                    failed = summary.failed,
                    "scheduler: scan run enqueued"
                ),
                Err(e) => tracing::error!(
                    category = category.as_str(),
                    error = %e,
                    "scheduler: failed to list monitors"
                ),
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(category = category.as_str(), cron = %cron, "scheduler: registered scan job");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cron_expression_prefers_override() {
        let got = cron_expression(
            |_| Some(" 0 */5 * * * * ".to_owned()),
            "MENTIONS_CRON_STANDARD",
            "0 0 * * * *",
        );
        assert_eq!(got, "0 */5 * * * *");
    }

    #[test]
    fn cron_expression_falls_back_when_unset_or_blank() {
        assert_eq!(cron_expression(|_| None, "X", "0 0 * * * *"), "0 0 * * * *");
        assert_eq!(
            cron_expression(|_| Some("  ".to_owned()), "X", "0 0 * * * *"),
            "0 0 * * * *"
        );
    }

    #[test]
    fn every_category_default_parses_as_a_job() {
        for category in SourceCategory::ALL {
            let job = Job::new_async(category.default_cron(), |_uuid, _lock| Box::pin(async {}));
            assert!(job.is_ok(), "{} cron rejected", category.as_str());
        }
        let job = Job::new_async(
            budget_alerts::DEFAULT_BUDGET_ALERT_CRON,
            |_uuid, _lock| Box::pin(async {}),
        );
        assert!(job.is_ok());
    }
}
