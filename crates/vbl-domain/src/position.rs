//! The rebalancing aggregate: one asset plus its cash sleeve.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{BreachReason, DomainError};
use crate::num;

/// A monitored position: `qty` of one asset plus a dedicated cash balance.
///
/// # Invariants
/// * `qty >= 0` (long-only)
/// * `cash >= 0` after any applied fill
/// * `anchor_price`, once set, is strictly positive
/// * `updated_at` never moves backwards
///
/// The only mutation paths are [`apply_buy`](Self::apply_buy) /
/// [`apply_sell`](Self::apply_sell) / [`apply_dividend`](Self::apply_dividend)
/// / [`set_anchor`](Self::set_anchor); each enforces the invariants and
/// leaves the position untouched on error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub tenant_id: String,
    pub portfolio_id: String,
    pub asset_symbol: String,
    pub qty: Decimal,
    pub cash: Decimal,
    pub anchor_price: Option<Decimal>,
    pub avg_cost: Option<Decimal>,
    pub total_commission_paid: Decimal,
    pub total_dividends_received: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Create a new position with zero quantity and the given cash.
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        portfolio_id: impl Into<String>,
        asset_symbol: impl Into<String>,
        cash: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if cash < Decimal::ZERO {
            return Err(DomainError::InvalidValue {
                field: "cash",
                message: format!("must be >= 0, got {cash}"),
            });
        }
        let asset_symbol = asset_symbol.into();
        if asset_symbol.trim().is_empty() {
            return Err(DomainError::InvalidValue {
                field: "asset_symbol",
                message: "must not be empty".to_string(),
            });
        }
        Ok(Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            portfolio_id: portfolio_id.into(),
            asset_symbol,
            qty: Decimal::ZERO,
            cash,
            anchor_price: None,
            avg_cost: None,
            total_commission_paid: Decimal::ZERO,
            total_dividends_received: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        })
    }

    // -----------------------------------------------------------------------
    // Derived state
    // -----------------------------------------------------------------------

    /// Market value of the asset leg at `price`.
    pub fn market_value(&self, price: Decimal) -> Decimal {
        self.qty * price
    }

    /// Asset value plus cash.
    pub fn total_value(&self, price: Decimal) -> Decimal {
        self.market_value(price) + self.cash
    }

    /// Stock allocation as a fraction of total value, if defined.
    pub fn stock_pct(&self, price: Decimal) -> Option<Decimal> {
        num::stock_pct(self.qty, self.cash, price)
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Apply a BUY fill: `qty += fill_qty; cash -= fill_qty·price + commission`.
    ///
    /// # Errors
    /// `insufficient_cash` when the cash leg would go negative. The
    /// position is not mutated on error.
    pub fn apply_buy(
        &mut self,
        fill_qty: Decimal,
        price: Decimal,
        commission: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        Self::validate_fill_inputs(fill_qty, price, commission)?;
        let cost = fill_qty * price + commission;
        if cost > self.cash {
            return Err(BreachReason::InsufficientCash.into());
        }
        // Weighted average cost across buys (commission excluded).
        let prev_cost_basis = self.avg_cost.unwrap_or(Decimal::ZERO) * self.qty;
        let new_qty = self.qty + fill_qty;
        self.avg_cost = (prev_cost_basis + fill_qty * price).checked_div(new_qty);
        self.qty = new_qty;
        self.cash -= cost;
        self.total_commission_paid += commission;
        self.touch(now);
        Ok(())
    }

    /// Apply a SELL fill: `qty -= fill_qty; cash += fill_qty·price - commission`.
    ///
    /// # Errors
    /// `insufficient_qty` when more than the held quantity is sold;
    /// `insufficient_cash` when the commission exceeds the sale proceeds
    /// plus held cash (the cash leg may never go negative).
    pub fn apply_sell(
        &mut self,
        fill_qty: Decimal,
        price: Decimal,
        commission: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        Self::validate_fill_inputs(fill_qty, price, commission)?;
        if fill_qty > self.qty {
            return Err(BreachReason::InsufficientQty.into());
        }
        let proceeds = fill_qty * price - commission;
        if self.cash + proceeds < Decimal::ZERO {
            return Err(BreachReason::InsufficientCash.into());
        }
        self.qty -= fill_qty;
        self.cash += proceeds;
        self.total_commission_paid += commission;
        if self.qty == Decimal::ZERO {
            self.avg_cost = None;
        }
        self.touch(now);
        Ok(())
    }

    /// Credit a dividend to the cash leg. The anchor is never touched.
    pub fn apply_dividend(
        &mut self,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if amount < Decimal::ZERO {
            return Err(DomainError::InvalidValue {
                field: "dividend",
                message: format!("must be >= 0, got {amount}"),
            });
        }
        self.cash += amount;
        self.total_dividends_received += amount;
        self.touch(now);
        Ok(())
    }

    /// Set or reset the anchor price.
    pub fn set_anchor(&mut self, price: Decimal, now: DateTime<Utc>) -> Result<(), DomainError> {
        if price <= Decimal::ZERO {
            return Err(DomainError::InvalidValue {
                field: "anchor_price",
                message: format!("must be > 0, got {price}"),
            });
        }
        self.anchor_price = Some(price);
        self.touch(now);
        Ok(())
    }

    /// Advance `updated_at` monotonically.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    fn validate_fill_inputs(
        fill_qty: Decimal,
        price: Decimal,
        commission: Decimal,
    ) -> Result<(), DomainError> {
        if fill_qty <= Decimal::ZERO {
            return Err(DomainError::InvalidValue {
                field: "fill_qty",
                message: format!("must be > 0, got {fill_qty}"),
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
        Ok(())
    }
}
