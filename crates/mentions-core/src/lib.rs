//! Shared domain types and configuration for the mention-scanning pipeline.

pub mod app_config;
pub mod config;
pub mod fetcher;
pub mod monitor;
pub mod plan;
pub mod platform;
pub mod post;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use fetcher::{FetchError, PlatformFetcher, PlatformQuery};
pub use monitor::{weekday_from_index, weekday_index, Monitor, ScanTrigger, ScheduleWindow};
pub use plan::{get_plan_limits, PlanLimits, PlanTier};
pub use platform::{Platform, SourceCategory};
pub use post::{AuthorSignals, Engagement, RawPost};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid platform: {0}")]
    InvalidPlatform(String),

    #[error("invalid plan tier: {0}")]
    InvalidPlanTier(String),

    #[error("invalid source category: {0}")]
    InvalidSourceCategory(String),

    #[error("invalid weekday index: {0}")]
    InvalidWeekday(i16),

    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("invalid schedule hour: {0}")]
    InvalidScheduleHour(i16),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
