//! Abstract boundaries to the outside world: market data, broker, clock.
//!
//! Ports are synchronous `Send + Sync` traits; the async edge (scheduler,
//! daemon) owns timeouts and retries around them. Adapters map their
//! transport failures into [`vbl_domain::DomainError`] variants at this
//! boundary so nothing downstream sees transport types.

pub mod broker;
pub mod clock;
pub mod market_data;

pub use broker::{
    Broker, BrokerAck, BrokerOrderState, BrokerStatus, FillCallback, FillNotification,
    SubmitRequest,
};
pub use clock::{Clock, SystemClock};
pub use market_data::{HistoricalBar, MarketData, MarketStatus, PriceSource, ReferencePrice};
