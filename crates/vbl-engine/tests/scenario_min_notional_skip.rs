//! A triggered BUY whose trimmed notional falls under the minimum is
//! skipped with the `min_notional` reason, and still writes its row.

mod common;

use common::*;
use rust_decimal_macros::dec;
use vbl_domain::{EvalAction, EvalMode};
use vbl_store::{OrdersRepo, TimelineRepo};

#[test]
fn tiny_buy_skips_with_min_notional() {
    let h = Harness::new();
    h.seed_position(dec!(0), dec!(100), Some(dec!(100)));
    h.market.set_price(SYMBOL, dec!(97));

    let mut trace = h.trace();
    let outcome = h
        .engine
        .evaluate
        .evaluate(TENANT, PORTFOLIO, POSITION, EvalMode::Live, None, &mut trace)
        .unwrap();

    assert_eq!(outcome.action, EvalAction::Skip);
    assert_eq!(outcome.reason.as_deref(), Some("min_notional"));
    assert!(outcome.proposal.is_none());
    assert!(outcome.appended);

    let record = &outcome.record;
    assert!(record.trigger_fired, "the trigger itself did fire");
    assert!(!record.allowed);
    assert_eq!(record.block_reason.as_deref(), Some("min_notional"));

    assert_eq!(h.timeline.len(), 1);
    assert!(h.orders.list_for_position(POSITION).is_empty());
}

#[test]
fn insufficient_cash_skips_with_reason() {
    let h = Harness::new();
    // A wide-open allocation band lets the trimmer spend the whole cash
    // leg on the notional; the commission estimate then tips the total
    // over what the position holds.
    h.seed_position(dec!(0), dec!(150), Some(dec!(100)));
    let mut guardrail = vbl_domain::GuardrailConfig::default();
    guardrail.min_stock_pct = dec!(0);
    guardrail.max_stock_pct = dec!(1);
    let mut policy = vbl_domain::OrderPolicyConfig::default();
    policy.min_notional = dec!(1);
    policy.commission_rate = dec!(0.001);
    h.set_configs(vbl_domain::TriggerConfig::default(), guardrail, policy);
    h.market.set_price(SYMBOL, dec!(97));

    let mut trace = h.trace();
    let outcome = h
        .engine
        .evaluate
        .evaluate(TENANT, PORTFOLIO, POSITION, EvalMode::Live, None, &mut trace)
        .unwrap();

    assert_eq!(outcome.action, EvalAction::Skip);
    assert_eq!(outcome.reason.as_deref(), Some("insufficient_cash"));
}
