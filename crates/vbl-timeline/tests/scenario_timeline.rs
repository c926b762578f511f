//! Timeline join scenarios over engine-produced records.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use vbl_domain::{EvalAction, EvalMode, OrderStatus};
use vbl_engine::{FillRequest, SubmitRequestBody};
use vbl_store::{TimelineRepo, TradesRepo};
use vbl_testkit::{EngineHarness, PORTFOLIO, POSITION, SYMBOL, TENANT};
use vbl_timeline::{Aggregation, ExecutionStatus, Timeline, TimelineQuery, TimelineService};

/// One live-style tick: evaluate, and when a proposal comes back,
/// submit + fill at the tick price (the simulation's atomic model).
fn run_tick(h: &EngineHarness, price: Decimal) {
    h.market.set_price(SYMBOL, price);
    let mut trace = h.trace();
    let outcome = h
        .engine
        .evaluate
        .evaluate(TENANT, PORTFOLIO, POSITION, EvalMode::Live, None, &mut trace)
        .unwrap();

    if let Some(proposal) = &outcome.proposal {
        let mut record = outcome.record.clone();
        let submitted = h
            .engine
            .submit
            .submit(
                TENANT,
                PORTFOLIO,
                POSITION,
                &SubmitRequestBody { side: proposal.side, qty: proposal.qty },
                &format!("tick-{}", h.timeline.len()),
                &mut trace,
            )
            .unwrap();
        let fill = h
            .engine
            .execute
            .fill(
                &submitted.order_id,
                &FillRequest { qty: proposal.qty, price, commission: Decimal::ZERO },
                &mut trace,
            )
            .unwrap();
        record.order_id = Some(submitted.order_id);
        record.execution_qty = Some(fill.filled_qty);
        record.execution_price = Some(price);
        record.execution_value = Some(fill.filled_qty * price);
        record.commission = Some(Decimal::ZERO);
        h.engine.evaluate.append_record(record);
    }
}

fn service(h: &EngineHarness) -> TimelineService {
    TimelineService::new(h.timeline.clone(), h.orders.clone(), h.trades.clone())
}

fn build(h: &EngineHarness, query: &TimelineQuery) -> Timeline {
    service(h).build_for_position(POSITION, query)
}

#[test]
fn executed_rows_are_enriched_from_orders_and_trades() {
    let h = EngineHarness::new();
    h.seed_running_position(dec!(10), dec!(1000), Some(dec!(100)));
    run_tick(&h, dec!(110)); // sell trigger, executes

    let timeline = build(&h, &TimelineQuery { aggregation: Aggregation::All, ..Default::default() });
    assert_eq!(timeline.total_rows, 1);
    let row = &timeline.rows[0];
    assert_eq!(row.record.action, EvalAction::Sell);
    assert_eq!(row.order_status, Some(OrderStatus::Filled));
    assert_eq!(row.execution_status, ExecutionStatus::Filled);

    // Aggregates equal the trade log.
    let trades = h.trades.list_for_position(POSITION);
    assert_eq!(trades.len(), 1);
    assert_eq!(row.record.execution_qty, Some(trades[0].qty));
    assert_eq!(row.record.execution_price, Some(trades[0].price));
}

#[test]
fn daily_aggregation_keeps_action_rows_or_first_hold() {
    let h = EngineHarness::new();
    h.seed_running_position(dec!(10), dec!(1000), Some(dec!(100)));

    // Day 1: two holds.
    run_tick(&h, dec!(100.5));
    h.clock.advance_secs(3600);
    run_tick(&h, dec!(101));

    // Day 2: a hold, then a sell action.
    h.clock.advance_secs(24 * 3600);
    run_tick(&h, dec!(101.5));
    h.clock.advance_secs(3600);
    run_tick(&h, dec!(110));

    let daily = build(&h, &TimelineQuery::default());
    // Day 1 collapses to its first HOLD; day 2 keeps only the action row.
    assert_eq!(daily.filtered_rows, 2);
    let actions: Vec<EvalAction> = daily.rows.iter().map(|r| r.record.action).collect();
    assert!(actions.contains(&EvalAction::Sell));
    assert!(actions.contains(&EvalAction::Hold));

    let all = build(&h, &TimelineQuery { aggregation: Aggregation::All, ..Default::default() });
    assert_eq!(all.filtered_rows, 4);
    assert_eq!(all.total_rows, 4);
}

#[test]
fn rows_sort_newest_first_and_paginate() {
    let h = EngineHarness::new();
    h.seed_running_position(dec!(10), dec!(1000), Some(dec!(100)));
    for i in 0..5 {
        run_tick(&h, dec!(100) + Decimal::new(i, 1)); // small drifts: holds
        h.clock.advance_secs(60);
    }

    let q = TimelineQuery {
        aggregation: Aggregation::All,
        offset: 1,
        limit: 2,
        ..Default::default()
    };
    let page = build(&h, &q);
    assert_eq!(page.total_rows, 5);
    assert_eq!(page.filtered_rows, 5);
    assert_eq!(page.rows.len(), 2);
    assert!(page.rows[0].record.timestamp > page.rows[1].record.timestamp);

    // Limit clamps to the hard cap.
    let q = TimelineQuery { limit: 1_000_000, aggregation: Aggregation::All, ..Default::default() };
    assert_eq!(build(&h, &q).limit, vbl_timeline::MAX_LIMIT);
}

#[test]
fn action_and_status_filters_apply() {
    let h = EngineHarness::new();
    h.seed_running_position(dec!(10), dec!(1000), Some(dec!(100)));
    run_tick(&h, dec!(101)); // hold
    h.clock.advance_secs(60);
    run_tick(&h, dec!(110)); // sell

    let only_sells = build(
        &h,
        &TimelineQuery {
            aggregation: Aggregation::All,
            actions: Some(vec![EvalAction::Sell]),
            ..Default::default()
        },
    );
    assert_eq!(only_sells.filtered_rows, 1);
    assert_eq!(only_sells.rows[0].record.action, EvalAction::Sell);

    let only_filled = build(
        &h,
        &TimelineQuery {
            aggregation: Aggregation::All,
            order_statuses: Some(vec![OrderStatus::Filled]),
            ..Default::default()
        },
    );
    assert_eq!(only_filled.filtered_rows, 1);

    let rejected = build(
        &h,
        &TimelineQuery {
            aggregation: Aggregation::All,
            order_statuses: Some(vec![OrderStatus::Rejected]),
            ..Default::default()
        },
    );
    assert_eq!(rejected.filtered_rows, 0);
}

#[test]
fn execution_values_reconcile_with_the_trade_log() {
    let h = EngineHarness::new();
    h.seed_running_position(dec!(10), dec!(1000), Some(dec!(100)));

    run_tick(&h, dec!(110)); // sell
    h.clock.advance_secs(3600);
    run_tick(&h, dec!(102)); // hold or trade depending on new anchor (110 → -7%: buy)
    h.clock.advance_secs(3600);
    run_tick(&h, dec!(101)); // small move vs latest anchor

    let all = build(&h, &TimelineQuery { aggregation: Aggregation::All, ..Default::default() });
    let row_value: Decimal = all
        .rows
        .iter()
        .filter(|r| matches!(r.record.action, EvalAction::Buy | EvalAction::Sell))
        .filter_map(|r| r.record.execution_value)
        .sum();
    let trade_value: Decimal = h
        .trades
        .list_for_position(POSITION)
        .iter()
        .map(|t| t.qty * t.price)
        .sum();
    assert_eq!(row_value, trade_value);
    assert!(trade_value > Decimal::ZERO);
}
