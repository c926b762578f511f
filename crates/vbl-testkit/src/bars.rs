//! Fixture bar builders.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use vbl_ports::HistoricalBar;

/// Flat bar: open = high = low = close, zero volume.
pub fn bar(timestamp: DateTime<Utc>, close: Decimal) -> HistoricalBar {
    HistoricalBar {
        timestamp,
        open: close,
        high: close,
        low: close,
        close,
        volume: Decimal::ZERO,
        dividend: None,
    }
}

/// Flat bar carrying a per-share cash dividend on its ex-date.
pub fn bar_with_dividend(
    timestamp: DateTime<Utc>,
    close: Decimal,
    dividend: Decimal,
) -> HistoricalBar {
    HistoricalBar {
        dividend: Some(dividend),
        ..bar(timestamp, close)
    }
}

/// One flat bar per close, spaced `interval_minutes` apart from `start`.
pub fn bars_from_closes(
    start: DateTime<Utc>,
    interval_minutes: u32,
    closes: &[Decimal],
) -> Vec<HistoricalBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| {
            bar(
                start + Duration::minutes(interval_minutes as i64 * i as i64),
                *close,
            )
        })
        .collect()
}
