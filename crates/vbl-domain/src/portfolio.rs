//! Portfolio: the ownership scope for positions and the live-trading gate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether live evaluation is allowed to run for this portfolio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradingState {
    NotConfigured,
    Running,
    Paused,
}

/// Which market sessions the portfolio's positions may trade in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradingHoursPolicy {
    /// Regular session only.
    OpenOnly,
    /// Regular plus extended hours.
    Extended,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub trading_state: TradingState,
    pub trading_hours_policy: TradingHoursPolicy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Portfolio {
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            name: name.into(),
            trading_state: TradingState::NotConfigured,
            trading_hours_policy: TradingHoursPolicy::OpenOnly,
            created_at: now,
            updated_at: now,
        }
    }

    /// Live evaluation only fires while the portfolio is RUNNING.
    pub fn is_trading_enabled(&self) -> bool {
        self.trading_state == TradingState::Running
    }
}
