//! Scan scheduling for mention monitors: admission, the fetch/match/score
//! pipeline, AI dispatch, the worker pool, cron fan-out, and budget alerts.

pub mod budget_alerts;
pub mod cron;
pub mod eligibility;
pub mod error;
pub mod memory;
pub mod notify;
pub mod scheduler;
pub mod store;
pub mod worker;

pub use budget_alerts::{
    classify_spend, period_bounds, AlertClassification, AlertOutcome, AlertPeriod,
    BudgetAlertEvaluator, EvaluationSummary, SUPPRESSION_WINDOW,
};
pub use cron::{enqueue_category, CronSummary};
pub use eligibility::{ceil_secs, check_eligibility, cooldown_remaining};
pub use error::{ScanError, ScanRejection};
pub use memory::InMemoryStore;
pub use notify::{
    dispatch_best_effort, parse_channels, AlertNotification, EmailApi, HttpNotifier,
    NotificationChannel, Notifier, NotifyError,
};
pub use scheduler::{
    PlatformFailure, ScanJob, ScanReport, ScanRequest, ScanScheduler, ScanSettings, ScanStatus,
};
pub use store::{AlertStore, PgStore, ScanStore};
pub use worker::{ScanQueue, ScanWorkerPool, Submission};
