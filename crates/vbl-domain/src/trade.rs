//! Immutable fill records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::order::OrderSide;

/// One executed fill slice of an order. Trades are append-only facts:
/// across an order, `Σ qty = order.filled_qty` and
/// `Σ commission = order.total_commission`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub tenant_id: String,
    pub portfolio_id: String,
    pub position_id: String,
    pub order_id: String,
    pub side: OrderSide,
    /// Absolute executed quantity (always positive).
    pub qty: Decimal,
    pub price: Decimal,
    pub commission: Decimal,
    /// `commission / notional`; `None` when the notional is zero.
    pub commission_rate_effective: Option<Decimal>,
    /// Always `"executed"`; carried for wire compatibility.
    pub status: String,
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        portfolio_id: impl Into<String>,
        position_id: impl Into<String>,
        order_id: impl Into<String>,
        side: OrderSide,
        qty: Decimal,
        price: Decimal,
        commission: Decimal,
        executed_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if qty <= Decimal::ZERO {
            return Err(DomainError::InvalidValue {
                field: "qty",
                message: format!("must be > 0, got {qty}"),
            });
        }
        if price <= Decimal::ZERO {
            return Err(DomainError::InvalidValue {
                field: "price",
                message: format!("must be > 0, got {price}"),
            });
        }
        if commission < Decimal::ZERO {
            return Err(DomainError::InvalidValue {
                field: "commission",
                message: format!("must be >= 0, got {commission}"),
            });
        }
        let notional = qty * price;
        let commission_rate_effective = if notional > Decimal::ZERO {
            commission.checked_div(notional)
        } else {
            None
        };
        Ok(Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            portfolio_id: portfolio_id.into(),
            position_id: position_id.into(),
            order_id: order_id.into(),
            side,
            qty,
            price,
            commission,
            commission_rate_effective,
            status: "executed".to_string(),
            executed_at,
        })
    }

    pub fn notional(&self) -> Decimal {
        self.qty * self.price
    }
}
