//! Calendar boundaries in a fixed reference timezone.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

/// The UTC instant of 00:00 on `date` in `tz`.
///
/// When midnight does not exist (a DST gap), the first valid instant after
/// the gap is used.
#[must_use]
pub fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    let mut naive = date.and_time(chrono::NaiveTime::MIN);
    for _ in 0..4 {
        match tz.from_local_datetime(&naive) {
            LocalResult::Single(t) => return t.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            LocalResult::None => naive += Duration::minutes(30),
        }
    }
    naive.and_utc()
}

/// Start of the local day containing `now`, and the start of the next one.
#[must_use]
pub fn local_day_bounds(tz: Tz, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = now.with_timezone(&tz).date_naive();
    let tomorrow = today.succ_opt().unwrap_or(today);
    (local_midnight(tz, today), local_midnight(tz, tomorrow))
}
