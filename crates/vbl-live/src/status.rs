//! Per-worker operational counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub running: bool,
    pub paused: bool,
    pub total_checks: u64,
    pub total_trades: u64,
    pub total_errors: u64,
    pub last_error: Option<String>,
    pub last_check: Option<DateTime<Utc>>,
}

impl WorkerStatus {
    pub fn record_check(&mut self, at: DateTime<Utc>) {
        self.total_checks += 1;
        self.last_check = Some(at);
    }

    pub fn record_trade(&mut self) {
        self.total_trades += 1;
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.total_errors += 1;
        self.last_error = Some(error.into());
    }
}
