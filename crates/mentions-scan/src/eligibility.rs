//! Pure scan-eligibility rules, checked in order and short-circuiting:
//! active flag, in-flight flag, schedule window, then (manual only) the
//! plan cooldown.

use chrono::{DateTime, Duration, Utc};
use mentions_core::{Monitor, PlanTier, ScanTrigger};

use crate::error::ScanRejection;

/// Time left before `monitor` may be scanned manually again, or `None` if
/// it may be scanned now.
///
/// The cooldown is inclusive at its end: once exactly the plan's cooldown
/// has elapsed since the last manual scan, a new one is allowed.
#[must_use]
pub fn cooldown_remaining(
    monitor: &Monitor,
    tier: PlanTier,
    now: DateTime<Utc>,
) -> Option<(Duration, DateTime<Utc>)> {
    let last = monitor.last_manual_scan_at?;
    let next_scan_at = last + tier.manual_scan_cooldown();
    if now >= next_scan_at {
        None
    } else {
        Some((next_scan_at - now, next_scan_at))
    }
}

/// Whole seconds covering `remaining`, rounded up so a caller that waits
/// this long is never turned away again.
#[must_use]
pub fn ceil_secs(remaining: Duration) -> i64 {
    (remaining.num_milliseconds() + 999).div_euclid(1000)
}

/// Apply the eligibility rules that need no shared state.
///
/// # Errors
///
/// Returns the first failing rule as a [`ScanRejection`].
pub fn check_eligibility(
    monitor: &Monitor,
    trigger: ScanTrigger,
    tier: PlanTier,
    now: DateTime<Utc>,
) -> Result<(), ScanRejection> {
    if !monitor.is_active {
        return Err(ScanRejection::InactiveMonitor);
    }
    if monitor.is_scanning {
        return Err(ScanRejection::ScanInProgress);
    }
    if let Some(window) = &monitor.schedule {
        if !window.contains(now) {
            return Err(ScanRejection::OutsideScheduleWindow);
        }
    }
    if trigger == ScanTrigger::Manual {
        if let Some((remaining, next_scan_at)) = cooldown_remaining(monitor, tier, now) {
            return Err(ScanRejection::CooldownActive {
                remaining,
                next_scan_at,
            });
        }
    }
    Ok(())
}
