use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Subscription tier of a user, as recorded by the billing system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Pro,
    Team,
    Enterprise,
}

/// Static limits attached to a [`PlanTier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    /// Minimum time between two manual scans of the same monitor.
    pub manual_scan_cooldown_hours: i64,
    pub monitors_allowed: u32,
    /// Number of configured platforms a scan will cover.
    pub platforms_allowed: usize,
    pub keywords_per_monitor: usize,
    pub ai_features: bool,
    /// Daily AI token allowance; resets at midnight in the budget timezone.
    pub daily_ai_tokens: u64,
}

impl PlanTier {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Team => "team",
            PlanTier::Enterprise => "enterprise",
        }
    }

    #[must_use]
    pub const fn limits(self) -> PlanLimits {
        match self {
            PlanTier::Free => PlanLimits {
                manual_scan_cooldown_hours: 24,
                monitors_allowed: 1,
                platforms_allowed: 3,
                keywords_per_monitor: 5,
                ai_features: false,
                daily_ai_tokens: 0,
            },
            PlanTier::Pro => PlanLimits {
                manual_scan_cooldown_hours: 4,
                monitors_allowed: 10,
                platforms_allowed: 8,
                keywords_per_monitor: 20,
                ai_features: true,
                daily_ai_tokens: 200_000,
            },
            PlanTier::Team => PlanLimits {
                manual_scan_cooldown_hours: 1,
                monitors_allowed: 25,
                platforms_allowed: usize::MAX,
                keywords_per_monitor: 50,
                ai_features: true,
                daily_ai_tokens: 500_000,
            },
            PlanTier::Enterprise => PlanLimits {
                manual_scan_cooldown_hours: 1,
                monitors_allowed: 100,
                platforms_allowed: usize::MAX,
                keywords_per_monitor: 100,
                ai_features: true,
                daily_ai_tokens: 2_000_000,
            },
        }
    }

    #[must_use]
    pub fn manual_scan_cooldown(self) -> chrono::Duration {
        chrono::Duration::hours(self.limits().manual_scan_cooldown_hours)
    }
}

/// Plan catalog lookup.
#[must_use]
pub const fn get_plan_limits(tier: PlanTier) -> PlanLimits {
    tier.limits()
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(PlanTier::Free),
            "pro" => Ok(PlanTier::Pro),
            "team" => Ok(PlanTier::Team),
            "enterprise" => Ok(PlanTier::Enterprise),
            _ => Err(CoreError::InvalidPlanTier(s.to_string())),
        }
    }
}
