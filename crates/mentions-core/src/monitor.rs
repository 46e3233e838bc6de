use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CoreError, Platform};

/// What caused a scan request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanTrigger {
    Cron,
    Manual,
}

impl ScanTrigger {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ScanTrigger::Cron => "cron",
            ScanTrigger::Manual => "manual",
        }
    }
}

impl std::fmt::Display for ScanTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local-time window in which a monitor may be scanned.
///
/// `start_hour`/`end_hour` are in `0..24`; `end_hour` is exclusive. When
/// `start_hour > end_hour` the window wraps past midnight (e.g. 22 → 6). An
/// empty `days` list means every day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleWindow {
    pub start_hour: Option<u8>,
    pub end_hour: Option<u8>,
    pub days: Vec<Weekday>,
    pub timezone: Tz,
}

impl ScheduleWindow {
    /// Returns `true` if `now`, converted to the window's timezone, falls inside it.
    ///
    /// The weekday is evaluated against the local date of `now`, so the
    /// after-midnight half of an overnight window belongs to the next day.
    #[must_use]
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.timezone);
        if !self.days.is_empty() && !self.days.contains(&local.weekday()) {
            return false;
        }

        let hour = local.hour();
        match (self.start_hour.map(u32::from), self.end_hour.map(u32::from)) {
            (Some(start), Some(end)) if start == end => true,
            (Some(start), Some(end)) if start < end => hour >= start && hour < end,
            (Some(start), Some(end)) => hour >= start || hour < end,
            (Some(start), None) => hour >= start,
            (None, Some(end)) => hour < end,
            (None, None) => true,
        }
    }
}

/// A user's configured watch.
#[derive(Debug, Clone)]
pub struct Monitor {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    /// Empty when the monitor tracks keywords only.
    pub company_name: String,
    pub keywords: Vec<String>,
    pub platforms: Vec<Platform>,
    pub is_active: bool,
    /// `None` when scheduling is disabled (scan at any time).
    pub schedule: Option<ScheduleWindow>,
    pub is_scanning: bool,
    pub last_manual_scan_at: Option<DateTime<Utc>>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub new_match_count: i32,
}

/// Convert a stored weekday index (`0` = Sunday … `6` = Saturday) to a [`Weekday`].
///
/// # Errors
///
/// Returns [`CoreError::InvalidWeekday`] for values outside `0..=6`.
pub fn weekday_from_index(index: i16) -> Result<Weekday, CoreError> {
    match index {
        0 => Ok(Weekday::Sun),
        1 => Ok(Weekday::Mon),
        2 => Ok(Weekday::Tue),
        3 => Ok(Weekday::Wed),
        4 => Ok(Weekday::Thu),
        5 => Ok(Weekday::Fri),
        6 => Ok(Weekday::Sat),
        other => Err(CoreError::InvalidWeekday(other)),
    }
}

/// Inverse of [`weekday_from_index`].
#[must_use]
pub fn weekday_index(day: Weekday) -> i16 {
    // num_days_from_sunday is always in 0..=6.
    i16::try_from(day.num_days_from_sunday()).unwrap_or_default()
}
