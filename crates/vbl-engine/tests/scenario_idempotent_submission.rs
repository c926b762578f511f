//! Submission idempotency: same key + same body replays the original
//! order id; same key + different body is a signature mismatch.

mod common;

use common::*;
use rust_decimal_macros::dec;
use vbl_domain::{BreachReason, DomainError, GuardrailConfig, OrderSide};
use vbl_engine::{EngineError, SubmitRequestBody};
use vbl_store::OrdersRepo;

#[test]
fn same_key_same_body_replays_same_order() {
    let h = Harness::new();
    h.seed_position(dec!(10), dec!(1000), Some(dec!(100)));

    let body = SubmitRequestBody { side: OrderSide::Buy, qty: dec!(2.0) };

    let mut trace = h.trace();
    let first = h
        .engine
        .submit
        .submit(TENANT, PORTFOLIO, POSITION, &body, "K", &mut trace)
        .unwrap();
    assert!(first.accepted);
    assert!(!first.replayed);

    let second = h
        .engine
        .submit
        .submit(TENANT, PORTFOLIO, POSITION, &body, "K", &mut trace)
        .unwrap();
    assert_eq!(second.order_id, first.order_id);
    assert!(second.replayed);

    // Exactly one order exists.
    assert_eq!(h.orders.list_for_position(POSITION).len(), 1);
}

#[test]
fn same_key_different_body_is_a_signature_mismatch() {
    let h = Harness::new();
    h.seed_position(dec!(10), dec!(1000), Some(dec!(100)));

    let mut trace = h.trace();
    h.engine
        .submit
        .submit(
            TENANT, PORTFOLIO, POSITION,
            &SubmitRequestBody { side: OrderSide::Buy, qty: dec!(2.0) },
            "K",
            &mut trace,
        )
        .unwrap();

    let err = h
        .engine
        .submit
        .submit(
            TENANT, PORTFOLIO, POSITION,
            &SubmitRequestBody { side: OrderSide::Buy, qty: dec!(3.0) },
            "K",
            &mut trace,
        )
        .unwrap_err();

    match err {
        EngineError::Domain(DomainError::IdempotencySignatureMismatch { key }) => {
            assert_eq!(key, "K");
        }
        other => panic!("expected signature mismatch, got {other:?}"),
    }
    assert_eq!(h.orders.list_for_position(POSITION).len(), 1);
}

#[test]
fn equivalent_decimal_renderings_hash_identically() {
    // 2.0 and 2.00 are the same normalized quantity.
    let a = vbl_engine::SubmitOrder::signature(POSITION, OrderSide::Buy, dec!(2.0));
    let b = vbl_engine::SubmitOrder::signature(POSITION, OrderSide::Buy, dec!(2.00));
    assert_eq!(a, b);
    let c = vbl_engine::SubmitOrder::signature(POSITION, OrderSide::Sell, dec!(2.0));
    assert_ne!(a, c);
}

#[test]
fn daily_cap_blocks_the_next_submission() {
    let h = Harness::new();
    h.seed_position(dec!(10), dec!(100000), Some(dec!(100)));
    h.set_configs(
        vbl_domain::TriggerConfig::default(),
        GuardrailConfig { max_orders_per_day: 2, ..GuardrailConfig::default() },
        vbl_domain::OrderPolicyConfig::default(),
    );

    let mut trace = h.trace();
    for i in 0..2 {
        h.engine
            .submit
            .submit(
                TENANT, PORTFOLIO, POSITION,
                &SubmitRequestBody { side: OrderSide::Buy, qty: dec!(1) },
                &format!("K{i}"),
                &mut trace,
            )
            .unwrap();
    }

    let err = h
        .engine
        .submit
        .submit(
            TENANT, PORTFOLIO, POSITION,
            &SubmitRequestBody { side: OrderSide::Buy, qty: dec!(1) },
            "K9",
            &mut trace,
        )
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::Domain(DomainError::Guardrail(BreachReason::DailyOrderCapExceeded))
    );

    // The cap rolls over at the UTC midnight boundary.
    h.clock.advance_secs(24 * 3600);
    h.engine
        .submit
        .submit(
            TENANT, PORTFOLIO, POSITION,
            &SubmitRequestBody { side: OrderSide::Buy, qty: dec!(1) },
            "K10",
            &mut trace,
        )
        .unwrap();
}
