//! Assemble a runnable engine world from settings.
//!
//! Selector policy: the `real` broker and `live` market-data adapters are
//! external integrations and are not bundled; selecting them fails fast
//! here rather than half-starting an engine.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;

use vbl_audit::JsonlEventsRepo;
use vbl_broker_stub::StubBroker;
use vbl_config::{BrokerSelector, ClockSelector, EngineSettings, MarketDataSelector};
use vbl_domain::{Portfolio, Position, TradingState};
use vbl_engine::{Engine, EnginePorts, UuidIdGen};
use vbl_live::PositionRef;
use vbl_ports::{Broker, Clock, SystemClock};
use vbl_store::{
    EventsRepo, InMemoryConfigRepo, InMemoryEventsRepo, InMemoryIdempotencyRepo,
    InMemoryOrdersRepo, InMemoryPortfoliosRepo, InMemoryPositionsRepo, InMemoryTimelineRepo,
    InMemoryTradesRepo, PortfoliosRepo, PositionsRepo,
};
use vbl_testkit::{FixedClock, ScriptedMarketData};

pub struct World {
    pub engine: Engine,
    pub broker: Arc<dyn Broker>,
    pub market: Arc<ScriptedMarketData>,
    pub positions: Vec<PositionRef>,
}

pub fn build_world(settings: &EngineSettings) -> Result<World> {
    let clock: Arc<dyn Clock> = match settings.clock {
        ClockSelector::System => Arc::new(SystemClock),
        ClockSelector::Deterministic => Arc::new(FixedClock::default()),
    };

    let market = match settings.market_data {
        MarketDataSelector::Deterministic => Arc::new(ScriptedMarketData::new(clock.clone())),
        MarketDataSelector::Live => {
            bail!("live market-data adapter is not bundled; set VBL_MARKET_DATA=deterministic")
        }
    };

    let broker: Arc<dyn Broker> = match settings.broker {
        BrokerSelector::Stub => Arc::new(StubBroker::new(clock.clone())),
        BrokerSelector::Real => {
            bail!("real broker adapter is not bundled; set VBL_BROKER=stub")
        }
    };

    let events: Arc<dyn EventsRepo> = match &settings.audit_path {
        Some(path) => Arc::new(
            JsonlEventsRepo::new(path, settings.audit_hash_chain)
                .with_context(|| format!("open audit log {path:?}"))?,
        ),
        None => Arc::new(InMemoryEventsRepo::new()),
    };

    let positions_repo = Arc::new(InMemoryPositionsRepo::new());
    let portfolios_repo = Arc::new(InMemoryPortfoliosRepo::new());
    let configs_repo = Arc::new(InMemoryConfigRepo::new());

    let now = clock.now();
    let mut refs = Vec::new();
    for spec in &settings.positions {
        let mut portfolio = Portfolio::new(&spec.portfolio_id, &spec.tenant_id, &spec.portfolio_id, now);
        portfolio.trading_state = TradingState::Running;
        portfolios_repo.save(portfolio);

        let mut position = Position::new(
            &spec.position_id,
            &spec.tenant_id,
            &spec.portfolio_id,
            &spec.symbol,
            spec.cash,
            now,
        )
        .map_err(|e| anyhow::anyhow!("position {}: {e}", spec.position_id))?;
        if let Some(anchor) = spec.anchor {
            if anchor > Decimal::ZERO {
                position
                    .set_anchor(anchor, now)
                    .map_err(|e| anyhow::anyhow!("position {}: {e}", spec.position_id))?;
            }
        }
        positions_repo.save(position);

        configs_repo.put_position_configs(
            &spec.tenant_id,
            &spec.portfolio_id,
            &spec.position_id,
            spec.trigger.clone(),
            spec.guardrail.clone(),
            spec.order_policy.clone(),
        );

        refs.push(PositionRef {
            tenant_id: spec.tenant_id.clone(),
            portfolio_id: spec.portfolio_id.clone(),
            position_id: spec.position_id.clone(),
        });
    }

    let ports = EnginePorts {
        positions: positions_repo,
        portfolios: portfolios_repo,
        orders: Arc::new(InMemoryOrdersRepo::new()),
        trades: Arc::new(InMemoryTradesRepo::new()),
        events,
        idempotency: Arc::new(InMemoryIdempotencyRepo::new()),
        timeline: Arc::new(InMemoryTimelineRepo::new()),
        configs: configs_repo,
        market: market.clone(),
        clock,
        ids: Arc::new(UuidIdGen),
    };

    Ok(World {
        engine: Engine::new(ports),
        broker,
        market,
        positions: refs,
    })
}
