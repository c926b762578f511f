//! Repository ports and their in-memory implementations.
//!
//! Persistence backends are external collaborators: only the port
//! contracts live here, plus thread-safe in-memory implementations used by
//! the live engine's default wiring, the simulation engine and every test.
//! Scoping is always `(tenant_id, portfolio_id, id)`; maps iterate in
//! `BTreeMap` order so listings are deterministic.

pub mod memory;
pub mod traits;

pub use memory::{
    InMemoryConfigRepo, InMemoryEventsRepo, InMemoryIdempotencyRepo, InMemoryOrdersRepo,
    InMemoryPortfoliosRepo, InMemoryPositionsRepo, InMemoryTimelineRepo, InMemoryTradesRepo,
};
pub use traits::{
    ConfigRepo, EventsRepo, IdempotencyRepo, OrdersRepo, PortfoliosRepo, PositionsRepo,
    Reservation, StoreError, TimelineRepo, TradesRepo,
};
