use chrono::{DateTime, Duration, Utc};
use mentions_core::Platform;
use thiserror::Error;

/// Why a scan request was not accepted.
///
/// Every variant carries enough detail for the caller to render a
/// countdown, an "already scanning" state, or an upgrade prompt.
#[derive(Debug, Error)]
pub enum ScanRejection {
    #[error("monitor not found")]
    MonitorNotFound,

    #[error("monitor is inactive")]
    InactiveMonitor,

    #[error("a scan is already in progress")]
    ScanInProgress,

    #[error("outside the monitor's schedule window")]
    OutsideScheduleWindow,

    #[error("none of the monitor's platforms are covered by this scan")]
    NothingToScan,

    #[error("manual scan cooldown active; next scan at {next_scan_at}")]
    CooldownActive {
        remaining: Duration,
        next_scan_at: DateTime<Utc>,
    },

    #[error("rate limited; retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("scan queue unavailable")]
    QueueUnavailable,

    #[error("store error: {0}")]
    Store(String),
}

impl ScanRejection {
    /// Rejections that are an expected no-op rather than a failure.
    #[must_use]
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            ScanRejection::ScanInProgress
                | ScanRejection::OutsideScheduleWindow
                | ScanRejection::NothingToScan
        )
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            ScanRejection::MonitorNotFound => "monitor_not_found",
            ScanRejection::InactiveMonitor => "inactive_monitor",
            ScanRejection::ScanInProgress => "scan_in_progress",
            ScanRejection::OutsideScheduleWindow => "outside_schedule_window",
            ScanRejection::NothingToScan => "nothing_to_scan",
            ScanRejection::CooldownActive { .. } => "cooldown_active",
            ScanRejection::RateLimited { .. } => "rate_limited",
            ScanRejection::QueueUnavailable => "queue_unavailable",
            ScanRejection::Store(_) => "store_error",
        }
    }
}

impl From<mentions_db::DbError> for ScanRejection {
    fn from(e: mentions_db::DbError) -> Self {
        ScanRejection::Store(e.to_string())
    }
}

/// Failures inside a running scan. Logged and summarized in the
/// [`crate::ScanReport`]; never returned to the requester.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("fetch from {platform} failed: {reason}")]
    UpstreamFetchFailed { platform: Platform, reason: String },

    #[error("persistence failed: {0}")]
    PersistenceFailed(#[from] mentions_db::DbError),
}
