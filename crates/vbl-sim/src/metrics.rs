//! Performance metrics against a buy-&-hold baseline.
//!
//! Ratio metrics (volatility, Sharpe, drawdown) are computed in f64 at
//! this edge only; the equity curve itself stays decimal. f64 arithmetic
//! over identical inputs is deterministic, so serialized results remain
//! bit-identical across runs.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trading minutes per year for annualization: 252 sessions × 390
/// regular-session minutes.
const TRADING_MINUTES_PER_YEAR: f64 = 252.0 * 390.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationMetrics {
    /// (final − initial) / initial.
    pub total_return: f64,
    /// Baseline: invest everything at the first bar's price and hold.
    pub buy_hold_return: f64,
    pub excess_return: f64,
    /// Annualized standard deviation of per-bar returns.
    pub annualized_volatility: f64,
    /// Mean per-bar return over its standard deviation, annualized.
    /// Zero when volatility is zero.
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough equity decline, as a positive fraction.
    pub max_drawdown: f64,
    pub trade_count: usize,
    pub total_commission: Decimal,
    pub total_dividends: Decimal,
}

/// Compute metrics from the per-bar equity curve.
///
/// `equity_curve` holds one total-value point per bar (post-execution);
/// `first_price`/`last_price` anchor the buy-&-hold baseline.
#[allow(clippy::too_many_arguments)]
pub fn compute_metrics(
    initial_cash: Decimal,
    equity_curve: &[Decimal],
    first_price: Decimal,
    last_price: Decimal,
    interval_minutes: u32,
    trade_count: usize,
    total_commission: Decimal,
    total_dividends: Decimal,
) -> SimulationMetrics {
    let initial = initial_cash.to_f64().unwrap_or(0.0);
    let final_value = equity_curve
        .last()
        .and_then(|v| v.to_f64())
        .unwrap_or(initial);

    let total_return = if initial > 0.0 {
        (final_value - initial) / initial
    } else {
        0.0
    };

    let first = first_price.to_f64().unwrap_or(0.0);
    let last = last_price.to_f64().unwrap_or(0.0);
    let buy_hold_return = if first > 0.0 { last / first - 1.0 } else { 0.0 };

    // Per-bar simple returns.
    let values: Vec<f64> = equity_curve.iter().filter_map(|v| v.to_f64()).collect();
    let mut returns = Vec::with_capacity(values.len().saturating_sub(1));
    for pair in values.windows(2) {
        if pair[0] > 0.0 {
            returns.push(pair[1] / pair[0] - 1.0);
        }
    }

    let bars_per_year = if interval_minutes > 0 {
        (TRADING_MINUTES_PER_YEAR / interval_minutes as f64).max(1.0)
    } else {
        1.0
    };

    let (annualized_volatility, sharpe_ratio) = if returns.len() > 1 {
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let std = variance.sqrt();
        let vol = std * bars_per_year.sqrt();
        let sharpe = if std > 0.0 {
            mean / std * bars_per_year.sqrt()
        } else {
            0.0
        };
        (vol, sharpe)
    } else {
        (0.0, 0.0)
    };

    let mut peak = f64::MIN;
    let mut max_drawdown = 0.0_f64;
    for v in &values {
        if *v > peak {
            peak = *v;
        }
        if peak > 0.0 {
            let dd = (peak - v) / peak;
            if dd > max_drawdown {
                max_drawdown = dd;
            }
        }
    }

    SimulationMetrics {
        total_return,
        buy_hold_return,
        excess_return: total_return - buy_hold_return,
        annualized_volatility,
        sharpe_ratio,
        max_drawdown,
        trade_count,
        total_commission,
        total_dividends,
    }
}
