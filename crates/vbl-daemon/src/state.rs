//! Shared daemon state.

use vbl_engine::Engine;
use vbl_live::LiveTrader;

#[derive(Debug, Clone, Copy)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            service: "vbl-daemon",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

pub struct AppState {
    pub engine: Engine,
    pub trader: LiveTrader,
    pub build: BuildInfo,
}
