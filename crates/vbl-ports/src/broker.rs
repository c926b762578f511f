//! Broker port: asynchronous order routing behind a synchronous trait.
//!
//! Submission returns an acknowledged broker order id + status; fills
//! arrive later through a registered callback. Callback invocations may
//! arrive out of order, so consumers must be idempotent and monotonic in
//! `filled_qty`; the order's own `filled_qty` is the source of truth for
//! what has already been applied.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use vbl_domain::{DomainError, OrderSide};

/// Broker-side lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerStatus {
    Pending,
    Working,
    Partial,
    Filled,
    Rejected,
    Cancelled,
}

impl BrokerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Working => "working",
            Self::Partial => "partial",
            Self::Filled => "filled",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Rejected | Self::Cancelled)
    }
}

/// Submission payload. `order_id` doubles as the idempotency token: a
/// broker seeing the same id twice must not create a second order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub qty: Decimal,
    pub commission_snapshot: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerAck {
    pub broker_order_id: String,
    pub status: BrokerStatus,
}

/// Point-in-time broker view of one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerOrderState {
    pub broker_order_id: String,
    pub status: BrokerStatus,
    /// Cumulative quantity the broker reports as filled.
    pub filled_qty: Decimal,
    pub avg_price: Option<Decimal>,
    pub commission: Decimal,
}

/// Push notification for one fill slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillNotification {
    pub order_id: String,
    pub broker_order_id: String,
    /// Quantity of this slice (positive).
    pub qty: Decimal,
    pub price: Decimal,
    pub commission: Decimal,
    pub status: BrokerStatus,
    pub executed_at: DateTime<Utc>,
}

pub type FillCallback = Arc<dyn Fn(FillNotification) + Send + Sync>;

pub trait Broker: Send + Sync {
    /// Submit an order; idempotent on `request.order_id`.
    fn submit(&self, request: &SubmitRequest) -> Result<BrokerAck, DomainError>;

    fn status(&self, broker_order_id: &str) -> Result<BrokerOrderState, DomainError>;

    fn cancel(&self, broker_order_id: &str) -> Result<BrokerStatus, DomainError>;

    /// Register a fill listener. Callbacks may fire from any thread and
    /// must only enqueue work (never mutate positions directly).
    fn on_fill(&self, callback: FillCallback);
}
