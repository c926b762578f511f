//! Property suite for the pure decision services.

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use vbl_domain::{
    evaluate_trigger, raw_size, trim_to_bounds, AllocationState, GuardrailConfig,
    TriggerDirection,
};

fn decimal_in(lo: i64, hi: i64, scale: u32) -> impl Strategy<Value = Decimal> {
    (lo..hi).prop_map(move |v| Decimal::new(v, scale))
}

proptest! {
    /// Value conservation: with zero commission, the commission-free
    /// projection used by the trimmer keeps total value invariant for any
    /// traded quantity.
    #[test]
    fn trade_projection_conserves_value(
        qty in decimal_in(0, 1_000_000, 2),       // 0 .. 10_000.00 shares
        cash in decimal_in(0, 10_000_000, 2),     // 0 .. 100_000.00
        price in decimal_in(1, 1_000_000, 2),     // 0.01 .. 10_000.00
        signed in decimal_in(-100_000, 100_000, 2),
    ) {
        let v_before = qty * price + cash;
        let qty_after = qty + signed;
        let cash_after = cash - signed * price;
        let v_after = qty_after * price + cash_after;
        prop_assert_eq!(v_before, v_after);
    }

    /// Monotone trim: |trimmed| <= |raw| and, when a trim happened, the
    /// post-trade allocation lands within tolerance of the bounds.
    #[test]
    fn trim_is_monotone_and_lands_in_bounds(
        qty in decimal_in(0, 100_000, 2),
        cash in decimal_in(1, 10_000_000, 2),
        price in decimal_in(100, 100_000, 2),     // 1.00 .. 1_000.00
        raw in decimal_in(-50_000, 50_000, 2),
    ) {
        let state = AllocationState { qty, cash };
        let guardrail = GuardrailConfig::default();
        let out = trim_to_bounds(raw, state, &guardrail, price);

        prop_assert!(out.qty.abs() <= raw.abs());

        if out.trimmed && out.qty != Decimal::ZERO {
            let qty_after = state.qty + out.qty;
            let cash_after = state.cash - out.qty * price;
            let total = qty_after * price + cash_after;
            prop_assert!(total > Decimal::ZERO);
            let pct = qty_after * price / total;
            let tol = dec!(0.0005);
            prop_assert!(
                pct >= guardrail.min_stock_pct - tol && pct <= guardrail.max_stock_pct + tol,
                "pct {} escaped [{}, {}]",
                pct, guardrail.min_stock_pct, guardrail.max_stock_pct
            );
        }
    }

    /// The trigger fires on exactly one side, and only outside the band.
    #[test]
    fn trigger_direction_matches_delta(
        anchor in decimal_in(1, 1_000_000, 2),
        price in decimal_in(1, 1_000_000, 2),
    ) {
        let tau = dec!(0.03);
        let d = evaluate_trigger(Some(anchor), price, tau, tau);
        let delta = (price - anchor) / anchor;
        match d.direction {
            TriggerDirection::Up => prop_assert!(delta >= tau),
            TriggerDirection::Down => prop_assert!(delta <= -tau),
            TriggerDirection::None => prop_assert!(delta.abs() < tau),
        }
        prop_assert_eq!(d.fired, d.direction != TriggerDirection::None);
    }

    /// Sizing sign follows the price/anchor relation.
    #[test]
    fn sizer_sign_follows_side(
        anchor in decimal_in(1, 100_000, 2),
        price in decimal_in(1, 100_000, 2),
        qty in decimal_in(0, 10_000, 2),
        cash in decimal_in(0, 1_000_000, 2),
    ) {
        let r = dec!(1.6667);
        let signed = raw_size(anchor, price, qty, cash, r).unwrap();
        if price <= anchor {
            prop_assert!(signed >= Decimal::ZERO);
        } else {
            prop_assert!(signed <= Decimal::ZERO);
        }
    }
}
