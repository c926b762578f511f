//! Market-data port: reference prices, historical bars, market status.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use vbl_domain::DomainError;

/// Where a reference price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceSource {
    MidQuote,
    LastTrade,
    Close,
    Simulated,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MidQuote => "MID_QUOTE",
            Self::LastTrade => "LAST_TRADE",
            Self::Close => "CLOSE",
            Self::Simulated => "SIMULATED",
        }
    }
}

/// A point-in-time reference price for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePrice {
    pub symbol: String,
    pub price: Decimal,
    pub source: PriceSource,
    pub timestamp: DateTime<Utc>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub is_market_hours: bool,
    /// `(now - timestamp) <= freshness_threshold` as judged by the adapter.
    pub is_fresh: bool,
}

/// One OHLCV bar. `dividend` carries the per-share cash dividend paid on
/// this bar's ex-date, when the series reports one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalBar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dividend: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStatus {
    pub is_open: bool,
    pub next_open: Option<DateTime<Utc>>,
    pub next_close: Option<DateTime<Utc>>,
    /// IANA timezone of the venue (e.g. `America/New_York`).
    pub timezone: String,
}

/// Market-data lookups. Adapters report transport failures as
/// `DomainError::PriceUnavailable` and freshness violations via the
/// `is_fresh` flag (consumers decide skip-vs-use policy).
pub trait MarketData: Send + Sync {
    fn get_reference_price(&self, symbol: &str) -> Result<ReferencePrice, DomainError>;

    fn get_historical_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval_minutes: u32,
        include_after_hours: bool,
    ) -> Result<Vec<HistoricalBar>, DomainError>;

    fn get_market_status(&self) -> Result<MarketStatus, DomainError>;

    /// Convenience gate used by the tick scheduler.
    fn is_market_hours(&self) -> bool {
        self.get_market_status().map(|s| s.is_open).unwrap_or(false)
    }
}
