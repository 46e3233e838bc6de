//! Database operations for the `monitors` table.

use chrono::{DateTime, Utc};
use mentions_core::{weekday_from_index, Monitor, Platform, ScheduleWindow};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const MONITOR_COLUMNS: &str = "id, user_id, name, company_name, keywords, platforms, is_active, \
     schedule_enabled, schedule_start_hour, schedule_end_hour, schedule_days, timezone, \
     is_scanning, scan_started_at, last_manual_scan_at, last_checked_at, new_match_count";

/// A row from the `monitors` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MonitorRow {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub company_name: String,
    pub keywords: Vec<String>,
    pub platforms: Vec<String>,
    pub is_active: bool,
    pub schedule_enabled: bool,
    pub schedule_start_hour: Option<i16>,
    pub schedule_end_hour: Option<i16>,
    pub schedule_days: Vec<i16>,
    pub timezone: String,
    pub is_scanning: bool,
    pub scan_started_at: Option<DateTime<Utc>>,
    pub last_manual_scan_at: Option<DateTime<Utc>>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub new_match_count: i32,
}

impl MonitorRow {
    /// Convert the stored row into the domain [`Monitor`].
    ///
    /// Unknown platform names are dropped with no error so a platform retired
    /// from the catalog does not make the whole monitor unreadable.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidColumn`] for an unknown timezone, weekday
    /// index, or out-of-range schedule hour.
    pub fn into_monitor(self) -> Result<Monitor, DbError> {
        let platforms = self
            .platforms
            .iter()
            .filter_map(|p| p.parse::<Platform>().ok())
            .collect();

        let schedule = if self.schedule_enabled {
            let timezone = self
                .timezone
                .parse::<chrono_tz::Tz>()
                .map_err(|e| DbError::InvalidColumn {
                    column: "timezone",
                    reason: e.to_string(),
                })?;
            let days = self
                .schedule_days
                .iter()
                .map(|d| weekday_from_index(*d))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| DbError::InvalidColumn {
                    column: "schedule_days",
                    reason: e.to_string(),
                })?;
            Some(ScheduleWindow {
                start_hour: hour_column("schedule_start_hour", self.schedule_start_hour)?,
                end_hour: hour_column("schedule_end_hour", self.schedule_end_hour)?,
                days,
                timezone,
            })
        } else {
            None
        };

        Ok(Monitor {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            company_name: self.company_name,
            keywords: self.keywords,
            platforms,
            is_active: self.is_active,
            schedule,
            is_scanning: self.is_scanning,
            last_manual_scan_at: self.last_manual_scan_at,
            last_checked_at: self.last_checked_at,
            new_match_count: self.new_match_count,
        })
    }
}

fn hour_column(column: &'static str, value: Option<i16>) -> Result<Option<u8>, DbError> {
    value
        .map(|h| {
            u8::try_from(h)
                .ok()
                .filter(|h| *h < 24)
                .ok_or_else(|| DbError::InvalidColumn {
                    column,
                    reason: format!("hour {h} out of range"),
                })
        })
        .transpose()
}

/// Fetch a single monitor by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_monitor(pool: &PgPool, id: Uuid) -> Result<Option<MonitorRow>, DbError> {
    let row = sqlx::query_as::<_, MonitorRow>(&format!(
        "SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// List every active monitor, oldest-checked first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_monitors(pool: &PgPool) -> Result<Vec<MonitorRow>, DbError> {
    let rows = sqlx::query_as::<_, MonitorRow>(&format!(
        "SELECT {MONITOR_COLUMNS} FROM monitors \
         WHERE is_active \
         ORDER BY last_checked_at ASC NULLS FIRST, id"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// List active monitors watching at least one of `platforms`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_monitors_for_platforms(
    pool: &PgPool,
    platforms: &[String],
) -> Result<Vec<MonitorRow>, DbError> {
    let rows = sqlx::query_as::<_, MonitorRow>(&format!(
        "SELECT {MONITOR_COLUMNS} FROM monitors \
         WHERE is_active AND platforms && $1::text[] \
         ORDER BY last_checked_at ASC NULLS FIRST, id"
    ))
    .bind(platforms)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Atomically mark a monitor as scanning.
///
/// Returns `true` only for the caller that flipped `is_scanning` from `false`
/// to `true`; concurrent callers observe `false`. Inactive monitors are never
/// claimed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn try_claim_scan(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE monitors \
         SET is_scanning = true, scan_started_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND is_scanning = false AND is_active",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Clear the scanning flag and record scan statistics.
///
/// Runs unconditionally at the end of every claimed scan. `new_matches` is
/// added to the unseen-match counter; `manual_at` is written only for manual
/// scans.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn finish_scan(
    pool: &PgPool,
    id: Uuid,
    checked_at: DateTime<Utc>,
    manual_at: Option<DateTime<Utc>>,
    new_matches: i32,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE monitors \
         SET is_scanning = false, \
             scan_started_at = NULL, \
             last_checked_at = $2, \
             last_manual_scan_at = COALESCE($3, last_manual_scan_at), \
             new_match_count = new_match_count + $4, \
             updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(checked_at)
    .bind(manual_at)
    .bind(new_matches)
    .execute(pool)
    .await?;
    Ok(())
}

/// Clear the in-flight flag without touching scan statistics.
///
/// Used when a claimed scan never starts (for example, the job queue is full).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn release_scan(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE monitors SET is_scanning = false, scan_started_at = NULL, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Clear `is_scanning` on monitors whose scan started before `started_before`.
///
/// Called at startup so a crashed process cannot leave monitors wedged.
/// Returns the number of monitors released.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn release_stale_scans(
    pool: &PgPool,
    started_before: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE monitors \
         SET is_scanning = false, scan_started_at = NULL, updated_at = NOW() \
         WHERE is_scanning AND (scan_started_at IS NULL OR scan_started_at < $1)",
    )
    .bind(started_before)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
