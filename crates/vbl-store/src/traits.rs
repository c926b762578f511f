//! Repository port contracts.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use vbl_domain::{
    EvaluationRecord, EventRecord, GuardrailConfig, Order, OrderPolicyConfig, OrderStatus,
    Portfolio, Position, Trade, TriggerConfig,
};

/// Failures a repository implementation may surface. In-memory stores
/// never fail; file- or network-backed ones map their transport errors
/// here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    Io(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "store io error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// Entity repositories
// ---------------------------------------------------------------------------

pub trait PositionsRepo: Send + Sync {
    fn get(&self, tenant_id: &str, portfolio_id: &str, position_id: &str) -> Option<Position>;
    fn save(&self, position: Position);
    fn list(&self) -> Vec<Position>;
}

pub trait PortfoliosRepo: Send + Sync {
    fn get(&self, tenant_id: &str, portfolio_id: &str) -> Option<Portfolio>;
    fn save(&self, portfolio: Portfolio);
}

pub trait OrdersRepo: Send + Sync {
    fn get(&self, order_id: &str) -> Option<Order>;
    fn save(&self, order: Order);
    fn list_for_position(&self, position_id: &str) -> Vec<Order>;
    /// Orders created for the position on the given UTC calendar date.
    fn count_for_position_on_day(&self, position_id: &str, date_utc: NaiveDate) -> usize;
    /// Orders whose status is one of `statuses` (reconciliation sweep).
    fn list_by_status(&self, statuses: &[OrderStatus]) -> Vec<Order>;
}

pub trait TradesRepo: Send + Sync {
    fn save(&self, trade: Trade);
    fn list_for_order(&self, order_id: &str) -> Vec<Trade>;
    fn list_for_position(&self, position_id: &str) -> Vec<Trade>;
}

// ---------------------------------------------------------------------------
// Event log / timeline
// ---------------------------------------------------------------------------

/// Append-only audit event store. Implementations must never mutate or
/// reorder previously appended events.
pub trait EventsRepo: Send + Sync {
    fn append(&self, event: EventRecord) -> Result<(), StoreError>;
    fn list_by_trace(&self, trace_id: &str) -> Vec<EventRecord>;
    fn list_for_position(&self, position_id: &str) -> Vec<EventRecord>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Append-only evaluation-record store backing the explainability view.
pub trait TimelineRepo: Send + Sync {
    fn append(&self, record: EvaluationRecord);
    fn list_for_position(&self, position_id: &str) -> Vec<EvaluationRecord>;
    fn list_all(&self) -> Vec<EvaluationRecord>;
    fn len(&self) -> usize;
}

// ---------------------------------------------------------------------------
// Idempotency
// ---------------------------------------------------------------------------

/// Outcome of reserving `(position_id, idempotency_key)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    /// Key unseen (or an in-flight retry with the same signature):
    /// proceed and finish with [`IdempotencyRepo::complete`].
    Fresh,
    /// Same key + same signature already completed: return the original.
    Replay { order_id: String },
    /// Same key, different signature.
    Conflict,
}

pub trait IdempotencyRepo: Send + Sync {
    /// Reserve a key for the given request signature.
    fn reserve(&self, position_id: &str, key: &str, signature: &str) -> Reservation;
    /// Record the order id produced for a reserved key.
    fn complete(&self, position_id: &str, key: &str, signature: &str, order_id: &str);
}

// ---------------------------------------------------------------------------
// Config resolution
// ---------------------------------------------------------------------------

/// Per-position policy resolution. A `None` from any getter means the
/// position is not fully configured and the tick must fail with
/// `configuration_missing`.
pub trait ConfigRepo: Send + Sync {
    fn trigger_config(
        &self,
        tenant_id: &str,
        portfolio_id: &str,
        position_id: &str,
    ) -> Option<TriggerConfig>;

    fn guardrail_config(
        &self,
        tenant_id: &str,
        portfolio_id: &str,
        position_id: &str,
    ) -> Option<GuardrailConfig>;

    fn order_policy(
        &self,
        tenant_id: &str,
        portfolio_id: &str,
        position_id: &str,
    ) -> Option<OrderPolicyConfig>;

    /// Tenant/asset-level commission override; order policy is the
    /// fallback when absent.
    fn commission_rate(&self, tenant_id: &str, asset_symbol: &str) -> Option<Decimal>;
}
