//! Allocation guardrails: proposal trimming and after-fill validation.
//!
//! Both functions are pure. Trimming runs commission-free (commission is
//! unknown until fill time), so the post-trade total value is invariant
//! and the allocation percentage is strictly monotone in the traded
//! quantity. That monotonicity is what makes bisection converge.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::GuardrailConfig;
use crate::errors::BreachReason;
use crate::num::{stock_pct, PCT_TOLERANCE};
use crate::order::OrderSide;

/// Bisection iteration cap. The search interval halves each round, so 50
/// rounds pin the quantity far below any representable step size.
const MAX_TRIM_ITERATIONS: u32 = 50;

/// The qty/cash pair guardrails operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationState {
    pub qty: Decimal,
    pub cash: Decimal,
}

/// Result of [`trim_to_bounds`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimOutcome {
    /// Signed quantity after trimming (same sign as the input).
    pub qty: Decimal,
    pub trimmed: bool,
    /// Which bound forced the trim, when one did.
    pub reason: Option<BreachReason>,
}

fn post_trade_pct(state: AllocationState, signed_qty: Decimal, price: Decimal) -> Option<Decimal> {
    // Commission-free projection: cash and stock legs exchange value 1:1.
    let qty = state.qty + signed_qty;
    let cash = state.cash - signed_qty * price;
    stock_pct(qty, cash, price)
}

/// Trim a raw signed quantity so the post-trade allocation lands inside
/// `[min_stock_pct, max_stock_pct]` (within tolerance).
///
/// BUY quantities monotonically raise the allocation, SELL quantities
/// lower it, so when the raw proposal overshoots a bound the quantity is
/// bisected (at most [`MAX_TRIM_ITERATIONS`] rounds) toward the nearest
/// bound. `|trimmed qty| ≤ |raw qty|` always holds.
pub fn trim_to_bounds(
    raw_qty: Decimal,
    state: AllocationState,
    guardrail: &GuardrailConfig,
    price: Decimal,
) -> TrimOutcome {
    if raw_qty == Decimal::ZERO {
        return TrimOutcome {
            qty: Decimal::ZERO,
            trimmed: false,
            reason: None,
        };
    }

    let pct = match post_trade_pct(state, raw_qty, price) {
        Some(p) => p,
        // Degenerate total value: nothing sensible can trade.
        None => {
            return TrimOutcome {
                qty: Decimal::ZERO,
                trimmed: true,
                reason: None,
            }
        }
    };

    let lower = guardrail.min_stock_pct - PCT_TOLERANCE;
    let upper = guardrail.max_stock_pct + PCT_TOLERANCE;
    if pct >= lower && pct <= upper {
        return TrimOutcome {
            qty: raw_qty,
            trimmed: false,
            reason: None,
        };
    }

    let buying = raw_qty > Decimal::ZERO;
    // BUY overshoots upward, SELL overshoots downward; trim toward the
    // violated (nearest) bound.
    let (target, reason) = if buying && pct > upper {
        (guardrail.max_stock_pct, BreachReason::AllocAboveMax)
    } else if !buying && pct < lower {
        (guardrail.min_stock_pct, BreachReason::AllocBelowMin)
    } else {
        // The raw direction *moves away* from the violated bound (e.g. a
        // SELL while already above max); trading the full size only helps,
        // so leave it untouched.
        return TrimOutcome {
            qty: raw_qty,
            trimmed: false,
            reason: None,
        };
    };

    let sign = if buying { Decimal::ONE } else { -Decimal::ONE };
    let mut lo = Decimal::ZERO;
    let mut hi = raw_qty.abs();
    for _ in 0..MAX_TRIM_ITERATIONS {
        let mid = (lo + hi) / dec!(2);
        let mid_pct = post_trade_pct(state, sign * mid, price).unwrap_or(Decimal::ZERO);
        let overshoots = if buying { mid_pct > target } else { mid_pct < target };
        if overshoots {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    TrimOutcome {
        qty: sign * lo,
        trimmed: true,
        reason: Some(reason),
    }
}

/// Validate a concrete fill (with commission) against the position state.
///
/// Checks, in order: cash sufficiency (BUY), quantity sufficiency (SELL),
/// then the post-trade allocation bounds. The allocation comparison uses
/// the same tolerance as the trimmer, so a proposal trimmed exactly onto a
/// bound does not self-reject at fill time.
pub fn validate_after_fill(
    state: AllocationState,
    side: OrderSide,
    fill_qty: Decimal,
    price: Decimal,
    commission: Decimal,
    guardrail: &GuardrailConfig,
) -> Result<(), BreachReason> {
    let (qty_after, cash_after) = match side {
        OrderSide::Buy => {
            if state.cash < fill_qty * price + commission {
                return Err(BreachReason::InsufficientCash);
            }
            (
                state.qty + fill_qty,
                state.cash - fill_qty * price - commission,
            )
        }
        OrderSide::Sell => {
            if state.qty < fill_qty {
                return Err(BreachReason::InsufficientQty);
            }
            (
                state.qty - fill_qty,
                state.cash + fill_qty * price - commission,
            )
        }
    };

    let pct = stock_pct(qty_after, cash_after, price).unwrap_or(Decimal::ZERO);
    if pct < guardrail.min_stock_pct - PCT_TOLERANCE {
        return Err(BreachReason::AllocBelowMin);
    }
    if pct > guardrail.max_stock_pct + PCT_TOLERANCE {
        return Err(BreachReason::AllocAboveMax);
    }
    Ok(())
}
