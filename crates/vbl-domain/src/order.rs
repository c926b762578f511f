//! Order entity and its lifecycle state machine.
//!
//! # State diagram
//!
//! ```text
//!   created ──► submitted ──► pending ──┐
//!                  │            │       ├─► partial ──► filled (term.)
//!                  │            ▼       │
//!                  └─────────► working ─┘
//!   any live state ──► filled | rejected | cancelled   (terminal)
//! ```
//!
//! Transitions never regress: a terminal order stays terminal, `partial`
//! cannot return to `working`, and `filled_qty` only grows (bounded by
//! `qty`). Illegal transitions return [`TransitionError`], which callers
//! must treat as an inconsistency alert, not a retryable failure.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

// ---------------------------------------------------------------------------
// Side / status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Created,
    Submitted,
    Pending,
    Working,
    Partial,
    Filled,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Submitted => "submitted",
            Self::Pending => "pending",
            Self::Working => "working",
            Self::Partial => "partial",
            Self::Filled => "filled",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    /// No further transitions are possible from a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Rejected | Self::Cancelled)
    }

    /// A live order may still receive fills.
    pub fn is_fillable(&self) -> bool {
        matches!(
            self,
            Self::Submitted | Self::Pending | Self::Working | Self::Partial
        )
    }

    /// Whether `self → to` is a legal edge of the lifecycle DAG.
    /// Self-transitions are legal no-ops (idempotent status echoes from
    /// the broker).
    pub fn can_transition(&self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        if *self == to {
            return true;
        }
        match (*self, to) {
            (Created, Submitted) => true,
            (Submitted, Pending | Working | Partial | Filled | Rejected | Cancelled) => true,
            (Pending, Working | Partial | Filled | Rejected | Cancelled) => true,
            (Working, Partial | Filled | Rejected | Cancelled) => true,
            (Partial, Filled | Rejected | Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TransitionError
// ---------------------------------------------------------------------------

/// Returned when a status change would violate the lifecycle DAG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub order_id: String,
    pub from: OrderStatus,
    pub to: OrderStatus,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "illegal order transition on {}: {} -> {}",
            self.order_id, self.from, self.to
        )
    }
}

impl std::error::Error for TransitionError {}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub tenant_id: String,
    pub portfolio_id: String,
    pub position_id: String,
    pub side: OrderSide,
    /// Requested quantity (always positive; direction is `side`).
    pub qty: Decimal,
    pub status: OrderStatus,
    pub idempotency_key: String,
    /// SHA-256 over the normalized request; used to detect a key replay
    /// with a different body.
    pub request_signature: String,
    /// Commission rate captured at submission time.
    pub commission_rate_snapshot: Decimal,
    pub broker_order_id: Option<String>,
    pub broker_status: Option<String>,
    pub filled_qty: Decimal,
    pub avg_fill_price: Option<Decimal>,
    pub total_commission: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        portfolio_id: impl Into<String>,
        position_id: impl Into<String>,
        side: OrderSide,
        qty: Decimal,
        idempotency_key: impl Into<String>,
        request_signature: impl Into<String>,
        commission_rate_snapshot: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if qty <= Decimal::ZERO {
            return Err(DomainError::InvalidValue {
                field: "qty",
                message: format!("must be > 0, got {qty}"),
            });
        }
        Ok(Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            portfolio_id: portfolio_id.into(),
            position_id: position_id.into(),
            side,
            qty,
            status: OrderStatus::Submitted,
            idempotency_key: idempotency_key.into(),
            request_signature: request_signature.into(),
            commission_rate_snapshot,
            broker_order_id: None,
            broker_status: None,
            filled_qty: Decimal::ZERO,
            avg_fill_price: None,
            total_commission: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        })
    }

    /// Remaining unfilled quantity.
    pub fn remaining_qty(&self) -> Decimal {
        self.qty - self.filled_qty
    }

    /// Apply a legal status transition, or fail with [`TransitionError`].
    pub fn transition(&mut self, to: OrderStatus, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.status.can_transition(to) {
            return Err(TransitionError {
                order_id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        if now > self.updated_at {
            self.updated_at = now;
        }
        Ok(())
    }

    /// Record a fill slice: grows `filled_qty`, re-derives the
    /// size-weighted `avg_fill_price`, accumulates commission and moves
    /// the status to `partial` or `filled`.
    ///
    /// # Errors
    /// Fails when the order is not fillable or the slice would exceed the
    /// requested quantity.
    pub fn record_fill(
        &mut self,
        fill_qty: Decimal,
        price: Decimal,
        commission: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.status.is_fillable() {
            return Err(DomainError::Transition(TransitionError {
                order_id: self.id.clone(),
                from: self.status,
                to: OrderStatus::Filled,
            }));
        }
        if fill_qty <= Decimal::ZERO {
            return Err(DomainError::InvalidValue {
                field: "fill_qty",
                message: format!("must be > 0, got {fill_qty}"),
            });
        }
        let new_filled = self.filled_qty + fill_qty;
        if new_filled > self.qty {
            return Err(DomainError::InvalidValue {
                field: "fill_qty",
                message: format!(
                    "fill of {fill_qty} would exceed order qty {} (already filled {})",
                    self.qty, self.filled_qty
                ),
            });
        }
        let prev_notional =
            self.avg_fill_price.unwrap_or(Decimal::ZERO) * self.filled_qty;
        self.avg_fill_price = (prev_notional + fill_qty * price).checked_div(new_filled);
        self.filled_qty = new_filled;
        self.total_commission += commission;
        let to = if self.filled_qty == self.qty {
            OrderStatus::Filled
        } else {
            OrderStatus::Partial
        };
        self.transition(to, now).map_err(DomainError::Transition)
    }
}
