//! Fully assembled in-memory engine for scenario tests across crates.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use vbl_broker_stub::StubBroker;
use vbl_domain::{
    GuardrailConfig, OrderPolicyConfig, Portfolio, Position, TradingState, TriggerConfig,
};
use vbl_engine::{Engine, EnginePorts, SeqIdGen, TraceContext};
use vbl_store::{
    InMemoryConfigRepo, InMemoryEventsRepo, InMemoryIdempotencyRepo, InMemoryOrdersRepo,
    InMemoryPortfoliosRepo, InMemoryPositionsRepo, InMemoryTimelineRepo, InMemoryTradesRepo,
    PortfoliosRepo, PositionsRepo,
};

use crate::clock::FixedClock;
use crate::market::ScriptedMarketData;

pub const TENANT: &str = "t1";
pub const PORTFOLIO: &str = "pf1";
pub const POSITION: &str = "pos1";
pub const SYMBOL: &str = "AAPL";

/// Engine + every concrete collaborator, all deterministic.
pub struct EngineHarness {
    pub engine: Engine,
    pub positions: Arc<InMemoryPositionsRepo>,
    pub portfolios: Arc<InMemoryPortfoliosRepo>,
    pub orders: Arc<InMemoryOrdersRepo>,
    pub trades: Arc<InMemoryTradesRepo>,
    pub events: Arc<InMemoryEventsRepo>,
    pub timeline: Arc<InMemoryTimelineRepo>,
    pub configs: Arc<InMemoryConfigRepo>,
    pub clock: Arc<FixedClock>,
    pub market: Arc<ScriptedMarketData>,
    pub broker: Arc<StubBroker>,
}

impl EngineHarness {
    pub fn new() -> Self {
        let clock = Arc::new(FixedClock::default());
        let market = Arc::new(ScriptedMarketData::new(clock.clone()));
        let broker = Arc::new(StubBroker::new(clock.clone()));

        let positions = Arc::new(InMemoryPositionsRepo::new());
        let portfolios = Arc::new(InMemoryPortfoliosRepo::new());
        let orders = Arc::new(InMemoryOrdersRepo::new());
        let trades = Arc::new(InMemoryTradesRepo::new());
        let events = Arc::new(InMemoryEventsRepo::new());
        let idempotency = Arc::new(InMemoryIdempotencyRepo::new());
        let timeline = Arc::new(InMemoryTimelineRepo::new());
        let configs = Arc::new(InMemoryConfigRepo::new());

        let ports = EnginePorts {
            positions: positions.clone(),
            portfolios: portfolios.clone(),
            orders: orders.clone(),
            trades: trades.clone(),
            events: events.clone(),
            idempotency: idempotency.clone(),
            timeline: timeline.clone(),
            configs: configs.clone(),
            market: market.clone(),
            clock: clock.clone(),
            ids: Arc::new(SeqIdGen::new()),
        };

        Self {
            engine: Engine::new(ports),
            positions,
            portfolios,
            orders,
            trades,
            events,
            timeline,
            configs,
            clock,
            market,
            broker,
        }
    }

    /// Seed a RUNNING portfolio plus one configured position.
    pub fn seed_running_position(
        &self,
        qty: Decimal,
        cash: Decimal,
        anchor: Option<Decimal>,
    ) -> Position {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        let mut portfolio = Portfolio::new(PORTFOLIO, TENANT, "main", t0);
        portfolio.trading_state = TradingState::Running;
        self.portfolios.save(portfolio);

        let mut pos = Position::new(POSITION, TENANT, PORTFOLIO, SYMBOL, cash, t0).unwrap();
        if qty > Decimal::ZERO {
            pos.cash = qty * dec!(1);
            pos.apply_buy(qty, dec!(1), Decimal::ZERO, t0).unwrap();
            pos.cash = cash;
        }
        if let Some(a) = anchor {
            pos.set_anchor(a, t0).unwrap();
        }
        self.positions.save(pos.clone());

        self.configs.put_position_configs(
            TENANT,
            PORTFOLIO,
            POSITION,
            TriggerConfig::default(),
            GuardrailConfig::default(),
            OrderPolicyConfig::default(),
        );
        pos
    }

    /// Seed an additional configured position in the same portfolio.
    pub fn seed_extra_position(
        &self,
        position_id: &str,
        symbol: &str,
        qty: Decimal,
        cash: Decimal,
        anchor: Option<Decimal>,
        order_policy: OrderPolicyConfig,
    ) -> Position {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        let mut pos = Position::new(position_id, TENANT, PORTFOLIO, symbol, cash, t0).unwrap();
        if qty > Decimal::ZERO {
            pos.cash = qty * dec!(1);
            pos.apply_buy(qty, dec!(1), Decimal::ZERO, t0).unwrap();
            pos.cash = cash;
        }
        if let Some(a) = anchor {
            pos.set_anchor(a, t0).unwrap();
        }
        self.positions.save(pos.clone());
        self.configs.put_position_configs(
            TENANT,
            PORTFOLIO,
            position_id,
            TriggerConfig::default(),
            GuardrailConfig::default(),
            order_policy,
        );
        pos
    }

    pub fn position(&self) -> Position {
        self.positions.get(TENANT, PORTFOLIO, POSITION).unwrap()
    }

    pub fn trace(&self) -> TraceContext {
        TraceContext::root(self.engine.ports.ids.as_ref())
    }
}

impl Default for EngineHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vbl_domain::{EvalAction, EvalMode};

    #[test]
    fn harness_runs_an_end_to_end_tick() {
        let h = EngineHarness::new();
        h.seed_running_position(dec!(10), dec!(1000), Some(dec!(100)));
        h.market.set_price(SYMBOL, dec!(101));

        let mut trace = h.trace();
        let outcome = h
            .engine
            .evaluate
            .evaluate(TENANT, PORTFOLIO, POSITION, EvalMode::Live, None, &mut trace)
            .unwrap();
        assert_eq!(outcome.action, EvalAction::Hold);
    }
}
