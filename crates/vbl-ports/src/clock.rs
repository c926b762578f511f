//! Time as a port, so tests and simulations inject their own.

use chrono::{DateTime, Utc};

/// Source of "now". Implementations must be monotonic within a process
/// (successive calls never go backwards).
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used by the live engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
