use mentions_core::SourceCategory;
use mentions_db::DbError;
use serde::Serialize;

use crate::error::ScanRejection;
use crate::scheduler::ScanRequest;
use crate::worker::{ScanQueue, Submission};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CronSummary {
    pub considered: usize,
    pub enqueued: usize,
    /// Busy monitors whose category platforms run after their current scan.
    pub deferred: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Enqueue a cron scan, restricted to `category`'s platforms, for every
/// active monitor watching at least one of them.
///
/// A monitor still scanning from another tick gets this category's platforms
/// deferred, not dropped. Monitors whose plan leaves none of the category's
/// platforms are skipped without being claimed.
///
/// # Errors
///
/// Returns [`DbError`] if the monitors cannot be listed. Per-monitor
/// rejections are counted, not returned.
pub async fn enqueue_category(
    queue: &ScanQueue,
    category: SourceCategory,
) -> Result<CronSummary, DbError> {
    let monitors = queue.scheduler().monitors_for_category(category).await?;
    let mut summary = CronSummary {
        considered: monitors.len(),
        ..CronSummary::default()
    };

    for monitor in monitors {
        match queue
            .submit_or_defer(ScanRequest::cron(monitor.id, category))
            .await
        {
            Ok(Submission::Enqueued(_)) => summary.enqueued += 1,
            Ok(Submission::Deferred(_)) => summary.deferred += 1,
            Err(rejection) if rejection.is_benign() => {
                tracing::debug!(monitor_id = %monitor.id, reason = rejection.code(), "cron scan skipped");
                summary.skipped += 1;
            }
            Err(ScanRejection::InactiveMonitor) => summary.skipped += 1,
            Err(rejection) => {
                tracing::warn!(monitor_id = %monitor.id, error = %rejection, "cron scan not enqueued");
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        category = %category,
        considered = summary.considered,
        enqueued = summary.enqueued,
        deferred = summary.deferred,
        skipped = summary.skipped,
        failed = summary.failed,
        "cron fan-out complete"
    );
    Ok(summary)
}
