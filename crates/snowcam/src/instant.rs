//! Resolves resort-local wall-clock times into absolute instants.

use chrono::{
    DateTime, Datelike, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeDelta, TimeZone, Utc,
};
use chrono_tz::Tz;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InstantError {
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid time: {hour:02}:{minute:02}")]
    InvalidTime { hour: u32, minute: u32 },
}

pub type Result<T> = std::result::Result<T, InstantError>;

/// Interprets the given wall-clock moment in `tz` and returns it in UTC.
///
/// The offset is the one `tz` observes at the target moment itself, so a
/// summer date resolved in winter still gets the summer offset.
///
/// * An ambiguous time (clocks going back) resolves to the earlier instant.
/// * A time skipped by clocks going forward keeps the offset in force
///   before the gap (02:30 on a CET→CEST day becomes 01:30 UTC).
pub fn resolve_instant(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    tz: Tz,
) -> Result<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| InstantError::InvalidDate(format!("{year:04}-{month:02}-{day:02}")))?;
    let naive = date
        .and_hms_opt(hour, minute, 0)
        .ok_or(InstantError::InvalidTime { hour, minute })?;
    Ok(localize(naive, tz))
}

/// Resolves a `YYYY-MM-DD` string literally, even if the result lies in the
/// future.
pub fn resolve_date(date: &str, hour: u32, minute: u32, tz: Tz) -> Result<DateTime<Utc>> {
    let invalid = || InstantError::InvalidDate(date.to_string());

    let mut parts = date.splitn(3, '-');
    let year: i32 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
    let month: u32 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
    let day: u32 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;

    resolve_instant(year, month, day, hour, minute, tz)
}

/// Resolves today's occurrence of `hour:minute` in `tz`, or yesterday's if
/// today's is still ahead of `now`. The result is never after `now`.
pub fn resolve_recent(
    hour: u32,
    minute: u32,
    tz: Tz,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let today = today_in(tz, now);
    let mut target =
        resolve_instant(today.year(), today.month(), today.day(), hour, minute, tz)?;

    // A 25-hour day can leave a single step short.
    while target > now {
        target -= TimeDelta::hours(24);
    }
    Ok(target)
}

/// The calendar date in `tz` at `now`.
pub fn today_in(tz: Tz, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

fn localize(naive: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(a, b) => a.min(b).with_timezone(&Utc),
        LocalResult::None => {
            // Gaps never follow each other within a day.
            let before = tz
                .offset_from_utc_datetime(&(naive - TimeDelta::days(1)))
                .fix()
                .local_minus_utc();
            Utc.from_utc_datetime(&(naive - TimeDelta::seconds(i64::from(before))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Zurich;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn winter_offset() {
        let instant = resolve_instant(2025, 1, 15, 12, 0, Zurich).unwrap();
        assert_eq!(instant, utc("2025-01-15T11:00:00Z"));
    }

    #[test]
    fn summer_offset() {
        let instant = resolve_instant(2025, 7, 1, 12, 0, Zurich).unwrap();
        assert_eq!(instant, utc("2025-07-01T10:00:00Z"));
    }

    #[test]
    fn offset_follows_target_not_caller() {
        // Day before and day of the spring change straddle two offsets.
        let before = resolve_instant(2025, 3, 29, 8, 0, Zurich).unwrap();
        let after = resolve_instant(2025, 3, 31, 8, 0, Zurich).unwrap();
        assert_eq!(before, utc("2025-03-29T07:00:00Z"));
        assert_eq!(after, utc("2025-03-31T06:00:00Z"));
    }

    #[test]
    fn spring_forward_gap_keeps_previous_offset() {
        let instant = resolve_instant(2025, 3, 30, 2, 30, Zurich).unwrap();
        assert_eq!(instant, utc("2025-03-30T01:30:00Z"));

        let after_gap = resolve_instant(2025, 3, 30, 3, 0, Zurich).unwrap();
        assert_eq!(after_gap, utc("2025-03-30T01:00:00Z"));
    }

    #[test]
    fn autumn_overlap_picks_earlier_instant() {
        let instant = resolve_instant(2025, 10, 26, 2, 30, Zurich).unwrap();
        assert_eq!(instant, utc("2025-10-26T00:30:00Z"));

        let after = resolve_instant(2025, 10, 26, 3, 0, Zurich).unwrap();
        assert_eq!(after, utc("2025-10-26T02:00:00Z"));
    }

    #[test]
    fn other_zone() {
        let instant = resolve_instant(2025, 7, 1, 9, 15, chrono_tz::America::Denver).unwrap();
        assert_eq!(instant, utc("2025-07-01T15:15:00Z"));
    }

    #[test]
    fn invalid_calendar_values() {
        assert!(matches!(
            resolve_instant(2025, 99, 99, 12, 0, Zurich),
            Err(InstantError::InvalidDate(_))
        ));
        assert!(matches!(
            resolve_instant(2025, 2, 30, 12, 0, Zurich),
            Err(InstantError::InvalidDate(_))
        ));
        assert!(matches!(
            resolve_instant(2025, 2, 1, 24, 0, Zurich),
            Err(InstantError::InvalidTime { .. })
        ));
    }

    #[test]
    fn resolve_date_string() {
        let instant = resolve_date("2025-11-27", 8, 0, Zurich).unwrap();
        assert_eq!(instant, utc("2025-11-27T07:00:00Z"));

        assert!(resolve_date("2025-99-99", 8, 0, Zurich).is_err());
        assert!(resolve_date("garbage", 8, 0, Zurich).is_err());
    }

    #[test]
    fn resolve_date_keeps_future_dates() {
        let future = resolve_date("2999-01-01", 12, 0, Zurich).unwrap();
        assert!(future > Utc::now());
    }

    #[test]
    fn recent_time_already_passed_is_today() {
        // 11:00 in Zurich.
        let now = utc("2025-01-15T10:00:00Z");
        let instant = resolve_recent(8, 0, Zurich, now).unwrap();
        assert_eq!(instant, utc("2025-01-15T07:00:00Z"));
    }

    #[test]
    fn recent_time_still_ahead_rewinds_a_day() {
        let now = utc("2025-01-15T10:00:00Z");
        let instant = resolve_recent(15, 0, Zurich, now).unwrap();
        assert_eq!(instant, utc("2025-01-14T14:00:00Z"));
    }

    #[test]
    fn recent_time_exactly_now_is_kept() {
        let now = utc("2025-01-15T11:00:00Z");
        let instant = resolve_recent(12, 0, Zurich, now).unwrap();
        assert_eq!(instant, now);
    }

    #[test]
    fn recent_uses_resort_date_not_utc_date() {
        // 23:30 UTC on the 14th is already the 15th in Zurich.
        let now = utc("2025-01-14T23:30:00Z");
        let instant = resolve_recent(0, 15, Zurich, now).unwrap();
        assert_eq!(instant, utc("2025-01-14T23:15:00Z"));
    }

    #[test]
    fn recent_is_never_in_the_future() {
        let nows = [
            utc("2025-01-15T10:00:00Z"),
            utc("2025-03-30T00:30:00Z"),
            utc("2025-10-26T01:15:00Z"),
            utc("2025-12-31T23:59:00Z"),
        ];
        for now in nows {
            for hour in 0..24 {
                for minute in [0, 30, 59] {
                    let instant = resolve_recent(hour, minute, Zurich, now).unwrap();
                    assert!(instant <= now, "{hour}:{minute} at {now} gave {instant}");
                }
            }
        }
    }
}
