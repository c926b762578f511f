//! Manually advanced clock for deterministic tests.

use std::sync::Mutex;

use chrono::{DateTime, Duration, TimeZone, Utc};

use vbl_ports::Clock;

/// A clock that only moves when told to.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// 2024-01-02 15:00:00 UTC, a Tuesday inside NYSE regular hours.
    pub fn default_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap()
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().expect("clock lock") = to;
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock().expect("clock lock");
        *now += Duration::seconds(secs);
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        Self::new(Self::default_start())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}
