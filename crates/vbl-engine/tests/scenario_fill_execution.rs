//! Fill application: position mutation, trade record, anchor reset,
//! idempotent replay and guardrail refusal.

mod common;

use common::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use vbl_domain::{
    BreachReason, DomainError, EventType, GuardrailConfig, OrderPolicyConfig, OrderSide,
    OrderStatus, TriggerConfig,
};
use vbl_engine::{EngineError, FillRequest, SubmitRequestBody};
use vbl_store::{EventsRepo, OrdersRepo, TradesRepo};

fn submit(h: &Harness, side: OrderSide, qty: Decimal, key: &str) -> String {
    let mut trace = h.trace();
    h.engine
        .submit
        .submit(
            TENANT, PORTFOLIO, POSITION,
            &SubmitRequestBody { side, qty },
            key,
            &mut trace,
        )
        .unwrap()
        .order_id
}

fn open_configs(h: &Harness) {
    h.set_configs(
        TriggerConfig::default(),
        GuardrailConfig {
            min_stock_pct: Decimal::ZERO,
            max_stock_pct: Decimal::ONE,
            ..GuardrailConfig::default()
        },
        OrderPolicyConfig {
            min_notional: Decimal::ZERO,
            ..OrderPolicyConfig::default()
        },
    );
}

#[test]
fn buy_fill_updates_position_and_resets_anchor() {
    let h = Harness::new();
    h.seed_position(dec!(0), dec!(1000), Some(dec!(48)));
    open_configs(&h);
    let order_id = submit(&h, OrderSide::Buy, dec!(2), "K");

    let mut trace = h.trace();
    let outcome = h
        .engine
        .execute
        .fill(&order_id, &FillRequest { qty: dec!(2), price: dec!(50), commission: dec!(1) }, &mut trace)
        .unwrap();

    assert_eq!(outcome.status, OrderStatus::Filled);
    assert_eq!(outcome.filled_qty, dec!(2));
    let trade_id = outcome.trade_id.expect("trade written");

    let pos = h.position();
    assert_eq!(pos.qty, dec!(2));
    assert_eq!(pos.cash, dec!(899)); // 1000 - 100 - 1
    assert_eq!(pos.anchor_price, Some(dec!(50)));
    assert_eq!(pos.total_commission_paid, dec!(1));

    let trades = h.trades.list_for_order(&order_id);
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].id, trade_id);
    assert_eq!(trades[0].commission_rate_effective, Some(dec!(0.01)));

    // Events: execution recorded + anchor reset with old/new values.
    let events = h.events.list_for_position(POSITION);
    let anchor_reset = events
        .iter()
        .find(|e| e.event_type == EventType::AnchorReset)
        .expect("anchor reset event");
    assert_eq!(anchor_reset.payload["old"], serde_json::json!("48"));
    assert_eq!(anchor_reset.payload["new"], serde_json::json!("50"));
    assert!(events.iter().any(|e| e.event_type == EventType::ExecutionRecorded));
    assert!(events.iter().any(|e| e.event_type == EventType::PositionUpdated));
}

#[test]
fn second_fill_on_filled_order_is_a_noop() {
    let h = Harness::new();
    h.seed_position(dec!(0), dec!(1000), Some(dec!(48)));
    open_configs(&h);
    let order_id = submit(&h, OrderSide::Buy, dec!(2), "K");

    let req = FillRequest { qty: dec!(2), price: dec!(50), commission: Decimal::ZERO };
    let mut trace = h.trace();
    h.engine.execute.fill(&order_id, &req, &mut trace).unwrap();
    let pos_after_first = h.position();

    let replay = h.engine.execute.fill(&order_id, &req, &mut trace).unwrap();
    assert_eq!(replay.status, OrderStatus::Filled);
    assert_eq!(replay.filled_qty, Decimal::ZERO);
    assert_eq!(replay.trade_id, None);
    assert_eq!(h.position(), pos_after_first, "replay must not double-apply");
    assert_eq!(h.trades.list_for_order(&order_id).len(), 1);
}

#[test]
fn partial_fills_accumulate_to_filled() {
    let h = Harness::new();
    h.seed_position(dec!(0), dec!(10000), Some(dec!(100)));
    open_configs(&h);
    let order_id = submit(&h, OrderSide::Buy, dec!(10), "K");

    let mut trace = h.trace();
    let first = h
        .engine
        .execute
        .fill(&order_id, &FillRequest { qty: dec!(4), price: dec!(100), commission: Decimal::ZERO }, &mut trace)
        .unwrap();
    assert_eq!(first.status, OrderStatus::Partial);

    let second = h
        .engine
        .execute
        .fill(&order_id, &FillRequest { qty: dec!(6), price: dec!(110), commission: Decimal::ZERO }, &mut trace)
        .unwrap();
    assert_eq!(second.status, OrderStatus::Filled);

    let order = h.orders.get(&order_id).unwrap();
    assert_eq!(order.filled_qty, dec!(10));
    assert_eq!(order.avg_fill_price, Some(dec!(106)));
    // Two trades aggregate to the order totals.
    let trades = h.trades.list_for_order(&order_id);
    assert_eq!(trades.iter().map(|t| t.qty).sum::<Decimal>(), order.filled_qty);
    // Anchor follows the latest fill price.
    assert_eq!(h.position().anchor_price, Some(dec!(110)));
}

#[test]
fn sell_exceeding_held_qty_is_refused() {
    let h = Harness::new();
    h.seed_position(dec!(1), dec!(1000), Some(dec!(100)));
    open_configs(&h);
    let order_id = submit(&h, OrderSide::Sell, dec!(5), "K");

    let mut trace = h.trace();
    let err = h
        .engine
        .execute
        .fill(&order_id, &FillRequest { qty: dec!(5), price: dec!(100), commission: Decimal::ZERO }, &mut trace)
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::Domain(DomainError::Guardrail(BreachReason::InsufficientQty))
    );
    // Refusal left an audit event and no position change.
    assert!(h
        .events
        .list_for_position(POSITION)
        .iter()
        .any(|e| e.event_type == EventType::FillRejectedInsufficientQty));
    assert_eq!(h.position().qty, dec!(1));
}

#[test]
fn below_min_fill_honors_reject_policy() {
    let h = Harness::new();
    h.seed_position(dec!(0), dec!(1000), Some(dec!(100)));
    h.set_configs(
        TriggerConfig::default(),
        GuardrailConfig {
            min_stock_pct: Decimal::ZERO,
            max_stock_pct: Decimal::ONE,
            ..GuardrailConfig::default()
        },
        OrderPolicyConfig {
            min_notional: dec!(500),
            action_below_min: vbl_domain::ActionBelowMin::Reject,
            ..OrderPolicyConfig::default()
        },
    );
    let order_id = submit(&h, OrderSide::Buy, dec!(1), "K");

    let mut trace = h.trace();
    let outcome = h
        .engine
        .execute
        .fill(&order_id, &FillRequest { qty: dec!(1), price: dec!(100), commission: Decimal::ZERO }, &mut trace)
        .unwrap();
    assert_eq!(outcome.status, OrderStatus::Rejected);
    assert_eq!(h.orders.get(&order_id).unwrap().status, OrderStatus::Rejected);
    assert!(h
        .events
        .list_for_position(POSITION)
        .iter()
        .any(|e| e.event_type == EventType::FillRejectedBelowMin));
    // No position mutation.
    assert_eq!(h.position().qty, Decimal::ZERO);
}

#[test]
fn below_min_fill_honors_hold_policy() {
    let h = Harness::new();
    h.seed_position(dec!(0), dec!(1000), Some(dec!(100)));
    h.set_configs(
        TriggerConfig::default(),
        GuardrailConfig {
            min_stock_pct: Decimal::ZERO,
            max_stock_pct: Decimal::ONE,
            ..GuardrailConfig::default()
        },
        OrderPolicyConfig {
            min_notional: dec!(500),
            action_below_min: vbl_domain::ActionBelowMin::Hold,
            ..OrderPolicyConfig::default()
        },
    );
    let order_id = submit(&h, OrderSide::Buy, dec!(1), "K");

    let mut trace = h.trace();
    let outcome = h
        .engine
        .execute
        .fill(&order_id, &FillRequest { qty: dec!(1), price: dec!(100), commission: Decimal::ZERO }, &mut trace)
        .unwrap();
    // Order stays live for a later, larger fill.
    assert_eq!(outcome.status, OrderStatus::Submitted);
    assert!(h
        .events
        .list_for_position(POSITION)
        .iter()
        .any(|e| e.event_type == EventType::FillSkippedBelowMin));
}

#[test]
fn cancelled_order_refuses_fills() {
    let h = Harness::new();
    h.seed_position(dec!(0), dec!(1000), Some(dec!(100)));
    open_configs(&h);
    let order_id = submit(&h, OrderSide::Buy, dec!(1), "K");

    let mut order = h.orders.get(&order_id).unwrap();
    order.transition(OrderStatus::Cancelled, t0()).unwrap();
    h.orders.save(order);

    let mut trace = h.trace();
    let err = h
        .engine
        .execute
        .fill(&order_id, &FillRequest { qty: dec!(1), price: dec!(100), commission: Decimal::ZERO }, &mut trace)
        .unwrap_err();
    assert!(matches!(err, EngineError::Domain(DomainError::Transition(_))));
}
