//! Minimal equity-session calendar: NYSE regular hours, no holiday table.

use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use chrono_tz::America::New_York;

/// Whether `ts` falls inside the regular NYSE session
/// (Mon–Fri, 09:30–16:00 America/New_York). Holidays are not modeled;
/// adapters with a full venue calendar live outside this crate.
pub fn is_regular_session(ts: DateTime<Utc>) -> bool {
    let local = ts.with_timezone(&New_York);
    match local.weekday() {
        Weekday::Sat | Weekday::Sun => return false,
        _ => {}
    }
    let open = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
    let close = NaiveTime::from_hms_opt(16, 0, 0).unwrap();
    let t = local.time();
    t >= open && t < close
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn weekday_mid_session_is_open() {
        // 15:00 UTC == 10:00 New York on 2024-01-02 (EST).
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap();
        assert!(is_regular_session(ts));
    }

    #[test]
    fn weekend_is_closed() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 6, 15, 0, 0).unwrap();
        assert!(!is_regular_session(ts));
    }

    #[test]
    fn pre_open_and_post_close_are_closed() {
        // 13:00 UTC == 08:00 New York (pre-open).
        assert!(!is_regular_session(
            Utc.with_ymd_and_hms(2024, 1, 2, 13, 0, 0).unwrap()
        ));
        // 21:30 UTC == 16:30 New York (post-close).
        assert!(!is_regular_session(
            Utc.with_ymd_and_hms(2024, 1, 2, 21, 30, 0).unwrap()
        ));
    }
}
