//! Live trading: per-position tick scheduling, fill routing, broker
//! reconciliation and operational alerting.
//!
//! One cooperative task per active position drives evaluations at the
//! configured interval. Every state-mutating step for a position runs
//! under that position's async lock, so submit → fill → reconcile can
//! never interleave destructively. The broker's fill callback only
//! enqueues; a router task applies fills under the same locks.

pub mod alerts;
pub mod locks;
pub mod reconcile;
pub mod retry;
pub mod status;
pub mod trader;

pub use alerts::{
    Alert, AlertChecker, AlertCondition, AlertInputs, AlertSeverity, AlertsRepo,
    InMemoryAlertsRepo,
};
pub use locks::PositionLocks;
pub use reconcile::converge_order;
pub use retry::RetryPolicy;
pub use status::WorkerStatus;
pub use trader::{LiveTrader, LiveTraderConfig, PositionRef};
