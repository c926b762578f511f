//! Admin façade over the live engine: health and per-position worker
//! lifecycle (start / pause / resume / stop).

pub mod api_types;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::{AppState, BuildInfo};
