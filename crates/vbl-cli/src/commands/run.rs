//! `vbl run`: bring up the live engine and trade until interrupted.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use vbl_config::{apply_env_overrides, load_layered_yaml};
use vbl_live::{LiveTrader, LiveTraderConfig, RetryPolicy};

use crate::wiring::build_world;

pub fn execute(config_paths: &[String]) -> Result<()> {
    let paths: Vec<&str> = config_paths.iter().map(String::as_str).collect();
    let loaded = load_layered_yaml(&paths)?;
    let mut settings = loaded.settings;
    apply_env_overrides(&mut settings, std::env::vars())?;
    settings.validate()?;

    info!(config_hash = %loaded.config_hash, positions = settings.positions.len(), "starting engine");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;

    runtime.block_on(async move {
        let world = build_world(&settings)?;
        // Deterministic market data starts from the configured anchors so
        // the engine has a reference price from the first tick.
        for spec in &settings.positions {
            if let Some(anchor) = spec.anchor {
                world.market.set_price(&spec.symbol, anchor);
            }
        }
        let trader = LiveTrader::new(
            world.engine.clone(),
            world.broker.clone(),
            LiveTraderConfig {
                tick_interval: Duration::from_secs(settings.tick_interval_secs.max(1)),
                reconcile_interval: Duration::from_secs(settings.reconcile_interval_secs.max(1)),
                retry: RetryPolicy::default(),
            },
        );

        for position in &world.positions {
            trader.start(position.clone());
        }
        let reconcile = trader.spawn_reconcile_loop();

        tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
        info!("shutdown requested");

        reconcile.abort();
        for position in &world.positions {
            trader.stop(&position.position_id).await;
        }
        Ok(())
    })
}
