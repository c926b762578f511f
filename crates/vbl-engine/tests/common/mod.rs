//! Shared in-memory harness for the engine scenario tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use vbl_domain::{
    DomainError, GuardrailConfig, OrderPolicyConfig, Position, TriggerConfig,
};
use vbl_engine::{Engine, EnginePorts, SeqIdGen, TraceContext};
use vbl_ports::{
    Clock, HistoricalBar, MarketData, MarketStatus, PriceSource, ReferencePrice,
};
use vbl_store::{
    InMemoryConfigRepo, InMemoryEventsRepo, InMemoryIdempotencyRepo, InMemoryOrdersRepo,
    InMemoryPortfoliosRepo, InMemoryPositionsRepo, InMemoryTimelineRepo, InMemoryTradesRepo,
    PositionsRepo,
};

pub const TENANT: &str = "t1";
pub const PORTFOLIO: &str = "pf1";
pub const POSITION: &str = "pos1";
pub const SYMBOL: &str = "AAPL";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap()
}

// ---------------------------------------------------------------------------
// Deterministic clock
// ---------------------------------------------------------------------------

pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::seconds(secs);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// ---------------------------------------------------------------------------
// Scripted market data
// ---------------------------------------------------------------------------

pub struct ScriptedMarket {
    prices: Mutex<HashMap<String, Decimal>>,
    pub fresh: Mutex<bool>,
    pub available: Mutex<bool>,
    clock_now: Mutex<DateTime<Utc>>,
}

impl ScriptedMarket {
    pub fn new() -> Self {
        Self {
            prices: Mutex::new(HashMap::new()),
            fresh: Mutex::new(true),
            available: Mutex::new(true),
            clock_now: Mutex::new(t0()),
        }
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }
}

impl MarketData for ScriptedMarket {
    fn get_reference_price(&self, symbol: &str) -> Result<ReferencePrice, DomainError> {
        if !*self.available.lock().unwrap() {
            return Err(DomainError::PriceUnavailable { symbol: symbol.to_string() });
        }
        let price = self
            .prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| DomainError::PriceUnavailable { symbol: symbol.to_string() })?;
        Ok(ReferencePrice {
            symbol: symbol.to_string(),
            price,
            source: PriceSource::LastTrade,
            timestamp: *self.clock_now.lock().unwrap(),
            bid: None,
            ask: None,
            volume: None,
            is_market_hours: true,
            is_fresh: *self.fresh.lock().unwrap(),
        })
    }

    fn get_historical_bars(
        &self,
        _symbol: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _interval_minutes: u32,
        _include_after_hours: bool,
    ) -> Result<Vec<HistoricalBar>, DomainError> {
        Ok(Vec::new())
    }

    fn get_market_status(&self) -> Result<MarketStatus, DomainError> {
        Ok(MarketStatus {
            is_open: true,
            next_open: None,
            next_close: None,
            timezone: "America/New_York".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub engine: Engine,
    pub positions: Arc<InMemoryPositionsRepo>,
    pub orders: Arc<InMemoryOrdersRepo>,
    pub trades: Arc<InMemoryTradesRepo>,
    pub events: Arc<InMemoryEventsRepo>,
    pub timeline: Arc<InMemoryTimelineRepo>,
    pub configs: Arc<InMemoryConfigRepo>,
    pub clock: Arc<FixedClock>,
    pub market: Arc<ScriptedMarket>,
}

impl Harness {
    pub fn new() -> Self {
        let positions = Arc::new(InMemoryPositionsRepo::new());
        let portfolios = Arc::new(InMemoryPortfoliosRepo::new());
        let orders = Arc::new(InMemoryOrdersRepo::new());
        let trades = Arc::new(InMemoryTradesRepo::new());
        let events = Arc::new(InMemoryEventsRepo::new());
        let idempotency = Arc::new(InMemoryIdempotencyRepo::new());
        let timeline = Arc::new(InMemoryTimelineRepo::new());
        let configs = Arc::new(InMemoryConfigRepo::new());
        let clock = Arc::new(FixedClock::new(t0()));
        let market = Arc::new(ScriptedMarket::new());

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
            orders,
            trades,
            events,
            timeline,
            configs,
            clock,
            market,
        }
    }

    /// Seed a position with default configs, the given state and anchor.
    pub fn seed_position(&self, qty: Decimal, cash: Decimal, anchor: Option<Decimal>) {
        let mut pos = Position::new(POSITION, TENANT, PORTFOLIO, SYMBOL, cash, t0()).unwrap();
        if qty > Decimal::ZERO {
            // Direct state seeding for tests: buy at 1.00 with enough
            // transient cash, then restore the target cash.
            pos.cash = qty * dec!(1);
            pos.apply_buy(qty, dec!(1), Decimal::ZERO, t0()).unwrap();
            pos.cash = cash;
        }
        if let Some(a) = anchor {
            pos.set_anchor(a, t0()).unwrap();
        }
        self.positions.save(pos);
        self.configs.put_position_configs(
            TENANT,
            PORTFOLIO,
            POSITION,
            TriggerConfig::default(),
            GuardrailConfig::default(),
            OrderPolicyConfig::default(),
        );
    }

    pub fn set_configs(
        &self,
        trigger: TriggerConfig,
        guardrail: GuardrailConfig,
        policy: OrderPolicyConfig,
    ) {
        self.configs
            .put_position_configs(TENANT, PORTFOLIO, POSITION, trigger, guardrail, policy);
    }

    pub fn trace(&self) -> TraceContext {
        TraceContext::root(self.engine.ports.ids.as_ref())
    }

    pub fn position(&self) -> Position {
        self.positions.get(TENANT, PORTFOLIO, POSITION).unwrap()
    }
}
