//! Deterministic market-data adapter: scripted prices and fixture bars.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use vbl_domain::DomainError;
use vbl_ports::{
    Clock, HistoricalBar, MarketData, MarketStatus, PriceSource, ReferencePrice,
};

use crate::calendar::is_regular_session;

/// Scripted [`MarketData`] implementation.
///
/// Reference prices come from a per-symbol script; historical bars from a
/// per-symbol fixture series; market hours from the regular-session
/// calendar evaluated at the injected clock's now (overridable).
pub struct ScriptedMarketData {
    clock: Arc<dyn Clock>,
    prices: Mutex<HashMap<String, Decimal>>,
    bars: Mutex<HashMap<String, Vec<HistoricalBar>>>,
    fresh: Mutex<bool>,
    available: Mutex<bool>,
    force_open: Mutex<Option<bool>>,
}

impl ScriptedMarketData {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            prices: Mutex::new(HashMap::new()),
            bars: Mutex::new(HashMap::new()),
            fresh: Mutex::new(true),
            available: Mutex::new(true),
            force_open: Mutex::new(None),
        }
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices
            .lock()
            .expect("prices lock")
            .insert(symbol.to_string(), price);
    }

    pub fn set_bars(&self, symbol: &str, bars: Vec<HistoricalBar>) {
        self.bars
            .lock()
            .expect("bars lock")
            .insert(symbol.to_string(), bars);
    }

    /// Script staleness: subsequent reference prices carry `is_fresh = false`.
    pub fn set_fresh(&self, fresh: bool) {
        *self.fresh.lock().expect("fresh lock") = fresh;
    }

    /// Script a transport failure: lookups return `price_unavailable`.
    pub fn set_available(&self, available: bool) {
        *self.available.lock().expect("available lock") = available;
    }

    /// Override the calendar (e.g. force-closed during a weekday test).
    pub fn force_market_open(&self, open: Option<bool>) {
        *self.force_open.lock().expect("force-open lock") = open;
    }

    fn is_open_now(&self) -> bool {
        if let Some(forced) = *self.force_open.lock().expect("force-open lock") {
            return forced;
        }
        is_regular_session(self.clock.now())
    }
}

impl MarketData for ScriptedMarketData {
    fn get_reference_price(&self, symbol: &str) -> Result<ReferencePrice, DomainError> {
        if !*self.available.lock().expect("available lock") {
            return Err(DomainError::PriceUnavailable {
                symbol: symbol.to_string(),
            });
        }
        let price = self
            .prices
            .lock()
            .expect("prices lock")
            .get(symbol)
            .copied()
            .ok_or_else(|| DomainError::PriceUnavailable {
                symbol: symbol.to_string(),
            })?;
        Ok(ReferencePrice {
            symbol: symbol.to_string(),
            price,
            source: PriceSource::LastTrade,
            timestamp: self.clock.now(),
            bid: None,
            ask: None,
            volume: None,
            is_market_hours: self.is_open_now(),
            is_fresh: *self.fresh.lock().expect("fresh lock"),
        })
    }

    fn get_historical_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _interval_minutes: u32,
        include_after_hours: bool,
    ) -> Result<Vec<HistoricalBar>, DomainError> {
        let bars = self.bars.lock().expect("bars lock");
        let series = bars.get(symbol).ok_or_else(|| DomainError::PriceUnavailable {
            symbol: symbol.to_string(),
        })?;
        Ok(series
            .iter()
            .filter(|b| b.timestamp >= start && b.timestamp <= end)
            .filter(|b| include_after_hours || is_regular_session(b.timestamp))
            .cloned()
            .collect())
    }

    fn get_market_status(&self) -> Result<MarketStatus, DomainError> {
        Ok(MarketStatus {
            is_open: self.is_open_now(),
            next_open: None,
            next_close: None,
            timezone: "America/New_York".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bars::bars_from_closes;
    use crate::clock::FixedClock;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn market() -> (Arc<FixedClock>, ScriptedMarketData) {
        let clock = Arc::new(FixedClock::default());
        let market = ScriptedMarketData::new(clock.clone());
        (clock, market)
    }

    #[test]
    fn reference_price_reflects_script() {
        let (_clock, m) = market();
        m.set_price("AAPL", dec!(101.5));
        let p = m.get_reference_price("AAPL").unwrap();
        assert_eq!(p.price, dec!(101.5));
        assert!(p.is_fresh);
        assert!(p.is_market_hours);

        m.set_fresh(false);
        assert!(!m.get_reference_price("AAPL").unwrap().is_fresh);
    }

    #[test]
    fn unknown_symbol_is_unavailable() {
        let (_clock, m) = market();
        assert!(matches!(
            m.get_reference_price("MSFT"),
            Err(DomainError::PriceUnavailable { .. })
        ));
    }

    #[test]
    fn bars_filter_by_range_and_session() {
        let (_clock, m) = market();
        // 14:30 UTC == 09:30 New York: bars land inside the session
        // except the last which crosses the close.
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        let closes: Vec<Decimal> = (0..8).map(|i| Decimal::from(100 + i)).collect();
        m.set_bars("AAPL", bars_from_closes(start, 60, &closes));

        let all = m
            .get_historical_bars(
                "AAPL",
                start,
                start + chrono::Duration::hours(8),
                60,
                true,
            )
            .unwrap();
        assert_eq!(all.len(), 8);

        let regular = m
            .get_historical_bars(
                "AAPL",
                start,
                start + chrono::Duration::hours(8),
                60,
                false,
            )
            .unwrap();
        assert!(regular.len() < all.len());
    }

    #[test]
    fn market_status_follows_forced_override() {
        let (_clock, m) = market();
        assert!(m.get_market_status().unwrap().is_open);
        m.force_market_open(Some(false));
        assert!(!m.get_market_status().unwrap().is_open);
    }
}
