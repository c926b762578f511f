//! Explicit constructor wiring: ports in, use cases out. No globals.

use std::sync::Arc;

use vbl_ports::{Clock, MarketData};
use vbl_store::{
    ConfigRepo, EventsRepo, IdempotencyRepo, OrdersRepo, PortfoliosRepo, PositionsRepo,
    TimelineRepo, TradesRepo,
};

use crate::evaluate::EvaluatePosition;
use crate::execute::ExecuteOrder;
use crate::ids::IdGen;
use crate::submit::SubmitOrder;

/// The full port bundle a running engine needs. Cloning is cheap (all
/// `Arc`s) and hands each use case its own handle set.
#[derive(Clone)]
pub struct EnginePorts {
    pub positions: Arc<dyn PositionsRepo>,
    pub portfolios: Arc<dyn PortfoliosRepo>,
    pub orders: Arc<dyn OrdersRepo>,
    pub trades: Arc<dyn TradesRepo>,
    pub events: Arc<dyn EventsRepo>,
    pub idempotency: Arc<dyn IdempotencyRepo>,
    pub timeline: Arc<dyn TimelineRepo>,
    pub configs: Arc<dyn ConfigRepo>,
    pub market: Arc<dyn MarketData>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGen>,
}

/// Assembled use-case set over one port bundle.
#[derive(Clone)]
pub struct Engine {
    pub ports: EnginePorts,
    pub evaluate: EvaluatePosition,
    pub submit: SubmitOrder,
    pub execute: ExecuteOrder,
}

impl Engine {
    pub fn new(ports: EnginePorts) -> Self {
        Self {
            evaluate: EvaluatePosition::new(ports.clone()),
            submit: SubmitOrder::new(ports.clone()),
            execute: ExecuteOrder::new(ports.clone()),
            ports,
        }
    }
}
