//! Scheduled budget alert evaluation.

use std::sync::Arc;

use chrono::Utc;
use mentions_scan::BudgetAlertEvaluator;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use super::{cron_expression, env_lookup};

/// Every 15 minutes.
pub(super) const DEFAULT_BUDGET_ALERT_CRON: &str = "0 */15 * * * *";

/// Register the budget alert sweep.
///
/// Override the schedule with `MENTIONS_CRON_BUDGET_ALERTS`.
pub(super) async fn register_budget_alert_job(
    scheduler: &JobScheduler,
    evaluator: Arc<BudgetAlertEvaluator>,
) -> Result<(), JobSchedulerError> {
    let cron = cron_expression(
        env_lookup,
        "MENTIONS_CRON_BUDGET_ALERTS",
        DEFAULT_BUDGET_ALERT_CRON,
    );

    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let evaluator = Arc::clone(&evaluator);

        Box::pin(async move {
            tracing::info!("scheduler: starting budget alert run");
            match evaluator.evaluate_all(Utc::now()).await {
                Ok(summary) => tracing::info!(
                    evaluated = summary.evaluated,
                    notified = summary.notified,
                    suppressed = summary.suppressed,
                    failed = summary.failed,
                    "scheduler: budget alert run complete"
                ),
                Err(e) => {
                    tracing::error!(error = %e, "scheduler: failed to load budget alerts");
                }
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron = %cron, "scheduler: registered budget_alerts job");
    Ok(())
}
