//! Deterministic historical simulation.
//!
//! Replays the live decision pipeline bar-by-bar over a historical series:
//! the same evaluation use case, the same fill application, an in-memory
//! order service that performs submit + fill atomically at the bar's
//! price (no partial fills). No wall clock, no randomness: identical
//! inputs produce bit-identical serialized output.

pub mod engine;
pub mod loader;
pub mod metrics;
pub mod types;

pub use engine::run_simulation;
pub use loader::{load_csv_file, parse_csv_bars, LoadError};
pub use metrics::{compute_metrics, SimulationMetrics};
pub use types::{SimError, SimPrice, SimulationRequest, SimulationResult, SimulationRun};
