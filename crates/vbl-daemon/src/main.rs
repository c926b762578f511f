use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use vbl_audit::JsonlEventsRepo;
use vbl_broker_stub::StubBroker;
use vbl_config::{
    apply_env_overrides, load_layered_yaml, BrokerSelector, ClockSelector, EngineSettings,
    MarketDataSelector,
};
use vbl_daemon::{build_router, AppState, BuildInfo};
use vbl_domain::{Portfolio, Position, TradingState};
use vbl_engine::{Engine, EnginePorts, UuidIdGen};
use vbl_live::{LiveTrader, LiveTraderConfig, RetryPolicy};
use vbl_ports::{Broker, Clock, SystemClock};
use vbl_store::{
    EventsRepo, InMemoryConfigRepo, InMemoryEventsRepo, InMemoryIdempotencyRepo,
    InMemoryOrdersRepo, InMemoryPortfoliosRepo, InMemoryPositionsRepo, InMemoryTimelineRepo,
    InMemoryTradesRepo, PortfoliosRepo, PositionsRepo,
};
use vbl_testkit::{FixedClock, ScriptedMarketData};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_paths: Vec<String> = std::env::args().skip(1).collect();
    let mut settings = if config_paths.is_empty() {
        EngineSettings::default()
    } else {
        let paths: Vec<&str> = config_paths.iter().map(String::as_str).collect();
        load_layered_yaml(&paths)?.settings
    };
    apply_env_overrides(&mut settings, std::env::vars())?;
    settings.validate()?;

    let engine = build_engine(&settings)?;
    let broker = build_broker(&settings, engine.ports.clock.clone())?;
    let trader = LiveTrader::new(
        engine.clone(),
        broker,
        LiveTraderConfig {
            tick_interval: Duration::from_secs(settings.tick_interval_secs.max(1)),
            reconcile_interval: Duration::from_secs(settings.reconcile_interval_secs.max(1)),
            retry: RetryPolicy::default(),
        },
    );
    let _reconcile = trader.spawn_reconcile_loop();

    let state = Arc::new(AppState {
        engine,
        trader,
        build: BuildInfo::default(),
    });

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = std::env::var("VBL_DAEMON_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(%addr, "daemon listening");
    axum::serve(listener, app).await.context("serve")?;
    Ok(())
}

fn build_broker(settings: &EngineSettings, clock: Arc<dyn Clock>) -> Result<Arc<dyn Broker>> {
    match settings.broker {
        BrokerSelector::Stub => Ok(Arc::new(StubBroker::new(clock))),
        BrokerSelector::Real => bail!("real broker adapter is not bundled; set VBL_BROKER=stub"),
    }
}

fn build_engine(settings: &EngineSettings) -> Result<Engine> {
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
    let events: Arc<dyn EventsRepo> = match &settings.audit_path {
        Some(path) => Arc::new(
            JsonlEventsRepo::new(path, settings.audit_hash_chain)
                .with_context(|| format!("open audit log {path:?}"))?,
        ),
        None => Arc::new(InMemoryEventsRepo::new()),
    };

    let positions = Arc::new(InMemoryPositionsRepo::new());
    let portfolios = Arc::new(InMemoryPortfoliosRepo::new());
    let configs = Arc::new(InMemoryConfigRepo::new());

    let now = clock.now();
    for spec in &settings.positions {
        let mut portfolio =
            Portfolio::new(&spec.portfolio_id, &spec.tenant_id, &spec.portfolio_id, now);
        portfolio.trading_state = TradingState::Running;
        portfolios.save(portfolio);

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
            position
                .set_anchor(anchor, now)
                .map_err(|e| anyhow::anyhow!("position {}: {e}", spec.position_id))?;
        }
        positions.save(position);
        configs.put_position_configs(
            &spec.tenant_id,
            &spec.portfolio_id,
            &spec.position_id,
            spec.trigger.clone(),
            spec.guardrail.clone(),
            spec.order_policy.clone(),
        );
    }

    let ports = EnginePorts {
        positions,
        portfolios,
        orders: Arc::new(InMemoryOrdersRepo::new()),
        trades: Arc::new(InMemoryTradesRepo::new()),
        events,
        idempotency: Arc::new(InMemoryIdempotencyRepo::new()),
        timeline: Arc::new(InMemoryTimelineRepo::new()),
        configs,
        market,
        clock,
        ids: Arc::new(UuidIdGen),
    };
    Ok(Engine::new(ports))
}
