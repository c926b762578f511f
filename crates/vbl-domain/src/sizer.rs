//! Closed-form trade sizing.

use rust_decimal::Decimal;

/// Raw signed rebalancing quantity.
///
/// With `A = price·qty` and `V = A + cash`:
///
/// ```text
/// |ΔQ| = (anchor / price) · r · (V / price)
/// ```
///
/// Positive on the BUY side (`price ≤ anchor`), negative on the SELL side.
/// The result is deliberately un-quantized; order-policy rounding happens
/// later, truncating toward zero.
///
/// Returns `None` when `price` or `anchor` is non-positive (no meaningful
/// size exists).
pub fn raw_size(
    anchor: Decimal,
    price: Decimal,
    qty: Decimal,
    cash: Decimal,
    rebalance_ratio: Decimal,
) -> Option<Decimal> {
    if price <= Decimal::ZERO || anchor <= Decimal::ZERO {
        return None;
    }
    let total_value = price * qty + cash;
    let magnitude = anchor.checked_div(price)?
        * rebalance_ratio
        * total_value.checked_div(price)?;
    let magnitude = magnitude.abs();
    if price <= anchor {
        Some(magnitude)
    } else {
        Some(-magnitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const R: Decimal = dec!(1.6667);

    #[test]
    fn sell_side_magnitude_matches_closed_form() {
        // qty 10 @ anchor 100, price 110, cash 1000:
        // |ΔQ| = (100/110) * 1.6667 * (2100/110) ≈ 28.926
        let q = raw_size(dec!(100), dec!(110), dec!(10), dec!(1000), R).unwrap();
        assert!(q < Decimal::ZERO, "price above anchor must size a SELL");
        let magnitude = q.abs();
        assert!(magnitude > dec!(28.9) && magnitude < dec!(28.95), "got {magnitude}");
    }

    #[test]
    fn buy_side_is_positive() {
        let q = raw_size(dec!(100), dec!(90), dec!(10), dec!(1000), R).unwrap();
        assert!(q > Decimal::ZERO);
    }

    #[test]
    fn price_equal_anchor_counts_as_buy_side() {
        let q = raw_size(dec!(100), dec!(100), dec!(10), dec!(1000), R).unwrap();
        assert!(q > Decimal::ZERO);
    }

    #[test]
    fn larger_ratio_sizes_more_aggressively() {
        let small = raw_size(dec!(100), dec!(90), dec!(10), dec!(1000), dec!(1)).unwrap();
        let large = raw_size(dec!(100), dec!(90), dec!(10), dec!(1000), dec!(2)).unwrap();
        assert!(large > small);
    }

    #[test]
    fn non_positive_inputs_yield_none() {
        assert_eq!(raw_size(Decimal::ZERO, dec!(90), dec!(1), dec!(1), R), None);
        assert_eq!(raw_size(dec!(100), Decimal::ZERO, dec!(1), dec!(1), R), None);
    }
}
