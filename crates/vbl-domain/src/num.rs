//! Decimal helpers shared by entities and decision services.
//!
//! All prices, quantities and money amounts are `rust_decimal::Decimal`.
//! Final quantization truncates toward zero; intermediate arithmetic is
//! kept at full precision.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Fractional digits carried by persisted money and quantity values.
pub const SCALE: u32 = 8;

/// Tolerance used when comparing allocation percentages against guardrail
/// bounds. A trimmed order sits numerically *on* a bound, so bound checks
/// downstream must accept values within this band.
pub const PCT_TOLERANCE: Decimal = dec!(0.0001);

/// Quantize a value to [`SCALE`] fractional digits, truncating toward zero.
pub fn quantize(v: Decimal) -> Decimal {
    v.round_dp_with_strategy(SCALE, RoundingStrategy::ToZero)
}

/// Round `qty` down (toward zero) to an integer multiple of `step`.
///
/// A non-positive `step` leaves the value untouched apart from the final
/// [`quantize`] pass.
pub fn quantize_to_step(qty: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return quantize(qty);
    }
    let steps = (qty / step).trunc();
    quantize(steps * step)
}

/// Post-trade stock allocation `stock_value / (stock_value + cash)`.
///
/// Returns `None` when the total value is zero or negative (an allocation
/// percentage is meaningless there; callers decide policy).
pub fn stock_pct(qty: Decimal, cash: Decimal, price: Decimal) -> Option<Decimal> {
    let stock_value = qty * price;
    let total = stock_value + cash;
    if total <= Decimal::ZERO {
        return None;
    }
    stock_value.checked_div(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_truncates_toward_zero() {
        assert_eq!(quantize(dec!(1.234567899)), dec!(1.23456789));
        assert_eq!(quantize(dec!(-1.234567899)), dec!(-1.23456789));
    }

    #[test]
    fn quantize_to_step_rounds_down() {
        assert_eq!(quantize_to_step(dec!(10.7), dec!(0.5)), dec!(10.5));
        assert_eq!(quantize_to_step(dec!(-10.7), dec!(0.5)), dec!(-10.5));
        assert_eq!(quantize_to_step(dec!(3.14), Decimal::ONE), dec!(3));
    }

    #[test]
    fn quantize_to_step_zero_step_is_identity_scale() {
        assert_eq!(quantize_to_step(dec!(1.999999999), Decimal::ZERO), dec!(1.99999999));
    }

    #[test]
    fn stock_pct_basic() {
        // 10 shares @ 100 with 1000 cash => 1000 / 2000 = 0.5
        assert_eq!(stock_pct(dec!(10), dec!(1000), dec!(100)), Some(dec!(0.5)));
    }

    #[test]
    fn stock_pct_zero_total_is_none() {
        assert_eq!(stock_pct(Decimal::ZERO, Decimal::ZERO, dec!(100)), None);
    }
}
