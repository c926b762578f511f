//! Error taxonomy with stable reason codes.
//!
//! Reason codes are contract: they appear verbatim in audit events, on
//! timeline rows and in API errors, so tests and operators can match on
//! them. The enums here are the typed form; `code()` yields the stable
//! string.

use crate::order::TransitionError;

// ---------------------------------------------------------------------------
// Guardrail breach reasons
// ---------------------------------------------------------------------------

/// Policy violations raised by order submission and fill application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreachReason {
    /// The per-position daily order counter reached its cap (UTC date).
    DailyOrderCapExceeded,
    /// Proposed notional below the configured minimum.
    MinNotional,
    /// Proposed quantity below the configured minimum.
    BelowMinQty,
    /// BUY requires more cash than the position holds.
    InsufficientCash,
    /// SELL requires more quantity than the position holds.
    InsufficientQty,
    /// Post-trade stock allocation would fall below the lower bound.
    AllocBelowMin,
    /// Post-trade stock allocation would exceed the upper bound.
    AllocAboveMax,
}

impl BreachReason {
    /// Stable identifier for events, timeline rows and API payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DailyOrderCapExceeded => "daily_order_cap_exceeded",
            Self::MinNotional => "min_notional",
            Self::BelowMinQty => "below_min_qty",
            Self::InsufficientCash => "insufficient_cash",
            Self::InsufficientQty => "insufficient_qty",
            Self::AllocBelowMin => "alloc_below_min",
            Self::AllocAboveMax => "alloc_above_max",
        }
    }
}

impl std::fmt::Display for BreachReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

// ---------------------------------------------------------------------------
// DomainError
// ---------------------------------------------------------------------------

/// Failures surfaced by entities and use cases.
///
/// Infrastructure adapters map their own failures into the matching
/// variants at the port boundary; domain code never sees transport errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A required config (trigger / guardrail / order policy) is absent.
    ConfigurationMissing { what: String },
    PositionNotFound { position_id: String },
    OrderNotFound { order_id: String },
    PortfolioNotFound { portfolio_id: String },
    /// Same idempotency key replayed with a different request signature.
    IdempotencySignatureMismatch { key: String },
    /// A guardrail or order-policy check failed.
    Guardrail(BreachReason),
    /// The market-data port could not produce a price.
    PriceUnavailable { symbol: String },
    /// The market-data port produced a price older than the freshness window.
    PriceStale { symbol: String },
    BrokerUnreachable { message: String },
    BrokerRejected { message: String },
    /// An entity constructor or mutation rejected a value.
    InvalidValue { field: &'static str, message: String },
    /// An order lifecycle event was applied in an illegal state.
    Transition(TransitionError),
}

impl DomainError {
    /// Stable identifier mirroring the reason-code taxonomy.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigurationMissing { .. } => "configuration_missing",
            Self::PositionNotFound { .. } => "position_not_found",
            Self::OrderNotFound { .. } => "order_not_found",
            Self::PortfolioNotFound { .. } => "portfolio_not_found",
            Self::IdempotencySignatureMismatch { .. } => "idempotency_signature_mismatch",
            Self::Guardrail(reason) => reason.code(),
            Self::PriceUnavailable { .. } => "price_unavailable",
            Self::PriceStale { .. } => "price_stale",
            Self::BrokerUnreachable { .. } => "broker_unreachable",
            Self::BrokerRejected { .. } => "broker_rejected",
            Self::InvalidValue { .. } => "invalid_value",
            Self::Transition(_) => "illegal_transition",
        }
    }
}

impl std::fmt::Display for DomainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConfigurationMissing { what } => {
                write!(f, "configuration_missing: {what}")
            }
            Self::PositionNotFound { position_id } => {
                write!(f, "position_not_found: {position_id}")
            }
            Self::OrderNotFound { order_id } => write!(f, "order_not_found: {order_id}"),
            Self::PortfolioNotFound { portfolio_id } => {
                write!(f, "portfolio_not_found: {portfolio_id}")
            }
            Self::IdempotencySignatureMismatch { key } => {
                write!(f, "idempotency_signature_mismatch: key {key}")
            }
            Self::Guardrail(reason) => write!(f, "guardrail breach: {reason}"),
            Self::PriceUnavailable { symbol } => write!(f, "price_unavailable: {symbol}"),
            Self::PriceStale { symbol } => write!(f, "price_stale: {symbol}"),
            Self::BrokerUnreachable { message } => write!(f, "broker_unreachable: {message}"),
            Self::BrokerRejected { message } => write!(f, "broker_rejected: {message}"),
            Self::InvalidValue { field, message } => {
                write!(f, "invalid value for {field}: {message}")
            }
            Self::Transition(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for DomainError {}

impl From<TransitionError> for DomainError {
    fn from(e: TransitionError) -> Self {
        Self::Transition(e)
    }
}

impl From<BreachReason> for DomainError {
    fn from(r: BreachReason) -> Self {
        Self::Guardrail(r)
    }
}
