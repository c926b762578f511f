//! The bar-replay driver.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use vbl_domain::{EvalMode, OrderStatus, Position};
use vbl_engine::{
    Engine, EnginePorts, FillRequest, PriceOverride, SeqIdGen, SubmitRequestBody, TraceContext,
};
use vbl_ports::{Clock, HistoricalBar, MarketData, PriceSource};
use vbl_store::{
    InMemoryConfigRepo, InMemoryEventsRepo, InMemoryIdempotencyRepo, InMemoryOrdersRepo,
    InMemoryPortfoliosRepo, InMemoryPositionsRepo, InMemoryTimelineRepo, InMemoryTradesRepo,
    OrdersRepo, PositionsRepo, TimelineRepo, TradesRepo,
};

use crate::metrics::compute_metrics;
use crate::types::{SimError, SimPrice, SimulationRequest, SimulationResult, SimulationRun};

const SIM_TENANT: &str = "sim";
const SIM_PORTFOLIO: &str = "sim";
const SIM_POSITION: &str = "sim-pos";

/// Clock pinned to the bar currently being replayed.
struct BarClock {
    now: Mutex<DateTime<Utc>>,
}

impl BarClock {
    fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().expect("bar clock lock") = to;
    }
}

impl Clock for BarClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("bar clock lock")
    }
}

/// Run one simulation over the requested range.
///
/// Bars come from the market-data port at the requested interval; the
/// decision pipeline is the live one; fills are atomic at the bar's price
/// with the configured commission.
pub fn run_simulation(
    request: &SimulationRequest,
    market: Arc<dyn MarketData>,
) -> Result<SimulationRun, SimError> {
    if request.initial_cash <= Decimal::ZERO {
        return Err(SimError::InvalidRequest {
            message: format!("initial_cash must be > 0, got {}", request.initial_cash),
        });
    }
    if request.end <= request.start {
        return Err(SimError::InvalidRequest {
            message: "end must be after start".to_string(),
        });
    }
    request
        .trigger
        .validate()
        .map_err(|e| SimError::InvalidRequest { message: e.to_string() })?;
    request
        .guardrail
        .validate()
        .map_err(|e| SimError::InvalidRequest { message: e.to_string() })?;
    request
        .order_policy
        .validate()
        .map_err(|e| SimError::InvalidRequest { message: e.to_string() })?;

    let bars = market
        .get_historical_bars(
            &request.ticker,
            request.start,
            request.end,
            request.interval_minutes,
            request.include_after_hours,
        )
        .map_err(SimError::Market)?;
    if bars.is_empty() {
        return Err(SimError::NoBars {
            ticker: request.ticker.clone(),
        });
    }

    run_over_bars(request, market, &bars)
}

/// Replay an explicit bar series (used by the CSV fixture path).
pub fn run_over_bars(
    request: &SimulationRequest,
    market: Arc<dyn MarketData>,
    bars: &[HistoricalBar],
) -> Result<SimulationRun, SimError> {
    if bars.is_empty() {
        return Err(SimError::NoBars {
            ticker: request.ticker.clone(),
        });
    }

    // -----------------------------------------------------------------------
    // In-memory world: fresh repos, counter ids, bar-pinned clock.
    // -----------------------------------------------------------------------
    let clock = Arc::new(BarClock::new(bars[0].timestamp));
    let positions = Arc::new(InMemoryPositionsRepo::new());
    let orders = Arc::new(InMemoryOrdersRepo::new());
    let trades = Arc::new(InMemoryTradesRepo::new());
    let events = Arc::new(InMemoryEventsRepo::new());
    let timeline = Arc::new(InMemoryTimelineRepo::new());
    let configs = Arc::new(InMemoryConfigRepo::new());

    let ports = EnginePorts {
        positions: positions.clone(),
        portfolios: Arc::new(InMemoryPortfoliosRepo::new()),
        orders: orders.clone(),
        trades: trades.clone(),
        events: events.clone(),
        idempotency: Arc::new(InMemoryIdempotencyRepo::new()),
        timeline: timeline.clone(),
        configs: configs.clone(),
        market,
        clock: clock.clone(),
        ids: Arc::new(SeqIdGen::new()),
    };
    let engine = Engine::new(ports);

    let position = Position::new(
        SIM_POSITION,
        SIM_TENANT,
        SIM_PORTFOLIO,
        &request.ticker,
        request.initial_cash,
        bars[0].timestamp,
    )
    .map_err(|e| SimError::InvalidRequest { message: e.to_string() })?;
    positions.save(position);
    configs.put_position_configs(
        SIM_TENANT,
        SIM_PORTFOLIO,
        SIM_POSITION,
        request.trigger.clone(),
        request.guardrail.clone(),
        request.order_policy.clone(),
    );

    // -----------------------------------------------------------------------
    // Bar loop
    // -----------------------------------------------------------------------
    let mut equity_curve: Vec<Decimal> = Vec::with_capacity(bars.len());
    let mut total_dividends = Decimal::ZERO;

    for (i, sim_bar) in bars.iter().enumerate() {
        clock.set(sim_bar.timestamp);
        let price = match request.sim_price {
            SimPrice::Close => sim_bar.close,
            SimPrice::Open => sim_bar.open,
        };

        let mut trace = TraceContext::root(engine.ports.ids.as_ref());
        let outcome = engine.evaluate.evaluate(
            SIM_TENANT,
            SIM_PORTFOLIO,
            SIM_POSITION,
            EvalMode::Simulation,
            Some(PriceOverride {
                price,
                source: PriceSource::Simulated,
                bar: Some(sim_bar.clone()),
                timestamp: Some(sim_bar.timestamp),
                dividend: sim_bar.dividend,
            }),
            &mut trace,
        )?;

        if let Some(amount) = outcome.record.dividend_amount {
            total_dividends += amount;
        }

        if let Some(proposal) = &outcome.proposal {
            let mut record = outcome.record.clone();
            // Submit + fill atomically at the bar's price; the simulated
            // venue never partially fills.
            let submitted = engine.submit.submit(
                SIM_TENANT,
                SIM_PORTFOLIO,
                SIM_POSITION,
                &SubmitRequestBody {
                    side: proposal.side,
                    qty: proposal.qty,
                },
                &format!("sim-bar-{i:06}"),
                &mut trace,
            );

            match submitted {
                Ok(submit_result) => {
                    let order = engine
                        .ports
                        .orders
                        .get(&submit_result.order_id)
                        .expect("order persisted by submit");
                    let commission =
                        proposal.qty * price * order.commission_rate_snapshot;
                    let filled = engine.execute.fill(
                        &submit_result.order_id,
                        &FillRequest {
                            qty: proposal.qty,
                            price,
                            commission,
                        },
                        &mut trace,
                    );

                    record.order_id = Some(submit_result.order_id.clone());
                    match filled {
                        Ok(fill) if fill.status == OrderStatus::Filled => {
                            record.execution_qty = Some(fill.filled_qty);
                            record.execution_price = Some(price);
                            record.execution_value = Some(fill.filled_qty * price);
                            record.commission = Some(commission);
                            record.anchor_after = Some(price);
                            record.anchor_reset = true;
                            record.anchor_reset_reason = Some("post_fill".to_string());
                        }
                        Ok(other) => {
                            // Below-min hold/reject at fill time.
                            record.action = vbl_domain::EvalAction::Skip;
                            record.allowed = false;
                            record.block_reason = Some(format!("fill_{}", other.status));
                        }
                        Err(e) => {
                            debug!(bar = i, error = %e, "simulated fill refused");
                            record.action = vbl_domain::EvalAction::Skip;
                            record.allowed = false;
                            record.block_reason = Some(e.code().to_string());
                        }
                    }
                }
                Err(e) => {
                    debug!(bar = i, error = %e, "simulated submit refused");
                    record.action = vbl_domain::EvalAction::Skip;
                    record.allowed = false;
                    record.block_reason = Some(e.code().to_string());
                }
            }
            engine.evaluate.append_record(record);
        }

        // Equity point from the applied position state.
        let pos = positions
            .get(SIM_TENANT, SIM_PORTFOLIO, SIM_POSITION)
            .expect("sim position exists");
        equity_curve.push(pos.total_value(price));
    }

    // -----------------------------------------------------------------------
    // Result assembly
    // -----------------------------------------------------------------------
    let final_pos = positions
        .get(SIM_TENANT, SIM_PORTFOLIO, SIM_POSITION)
        .expect("sim position exists");
    let trade_log = trades.list_for_position(SIM_POSITION);
    let total_commission = trade_log
        .iter()
        .map(|t| t.commission)
        .sum::<Decimal>();

    let (first_price, last_price) = match request.sim_price {
        SimPrice::Close => (bars[0].close, bars[bars.len() - 1].close),
        SimPrice::Open => (bars[0].open, bars[bars.len() - 1].open),
    };

    let metrics = compute_metrics(
        request.initial_cash,
        &equity_curve,
        first_price,
        last_price,
        request.interval_minutes,
        trade_log.len(),
        total_commission,
        total_dividends,
    );

    let final_value = equity_curve
        .last()
        .copied()
        .unwrap_or(request.initial_cash);

    let result = SimulationResult {
        ticker: request.ticker.clone(),
        start: request.start,
        end: request.end,
        interval_minutes: request.interval_minutes,
        include_after_hours: request.include_after_hours,
        sim_price: request.sim_price,
        bar_count: bars.len(),
        initial_cash: request.initial_cash,
        final_qty: final_pos.qty,
        final_cash: final_pos.cash,
        final_anchor: final_pos.anchor_price,
        final_value,
        metrics,
        trades: trade_log,
    };

    Ok(SimulationRun {
        result,
        records: timeline.list_all(),
    })
}
