//! Per-position policy configuration.
//!
//! Policy is deliberately decoupled from [`Position`](crate::position::Position)
//! state: configs are separate entities resolved through a repository port,
//! so a running position can have its thresholds retuned without touching
//! its cash/qty state.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

// ---------------------------------------------------------------------------
// TriggerConfig
// ---------------------------------------------------------------------------

/// Thresholds for the anchor-relative price trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Upward deviation that fires a SELL, as a fraction (0.03 = 3 %).
    pub tau_up: Decimal,
    /// Downward deviation that fires a BUY, as a fraction.
    pub tau_down: Decimal,
    /// Sizing aggressiveness coefficient.
    pub rebalance_ratio: Decimal,
    /// Absolute deviation beyond which the anchor is reset instead of
    /// trading (corporate-action gap protection). `None` disables the
    /// policy.
    pub anomaly_reset_pct: Option<Decimal>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            tau_up: dec!(0.03),
            tau_down: dec!(0.03),
            rebalance_ratio: dec!(1.6667),
            anomaly_reset_pct: Some(dec!(0.50)),
        }
    }
}

impl TriggerConfig {
    /// Validate threshold sanity. Thresholds must be positive; the
    /// anomaly threshold, when present, must exceed both taus (otherwise
    /// every trigger would be classified as an anomaly).
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.tau_up <= Decimal::ZERO {
            return Err(DomainError::InvalidValue {
                field: "tau_up",
                message: format!("must be > 0, got {}", self.tau_up),
            });
        }
        if self.tau_down <= Decimal::ZERO {
            return Err(DomainError::InvalidValue {
                field: "tau_down",
                message: format!("must be > 0, got {}", self.tau_down),
            });
        }
        if self.rebalance_ratio <= Decimal::ZERO {
            return Err(DomainError::InvalidValue {
                field: "rebalance_ratio",
                message: format!("must be > 0, got {}", self.rebalance_ratio),
            });
        }
        if let Some(pct) = self.anomaly_reset_pct {
            if pct <= self.tau_up || pct <= self.tau_down {
                return Err(DomainError::InvalidValue {
                    field: "anomaly_reset_pct",
                    message: format!("must exceed tau_up/tau_down, got {pct}"),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// GuardrailConfig
// ---------------------------------------------------------------------------

/// Allocation bounds and per-day submission limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailConfig {
    /// Lower bound on the post-trade stock allocation, as a fraction.
    pub min_stock_pct: Decimal,
    /// Upper bound on the post-trade stock allocation, as a fraction.
    pub max_stock_pct: Decimal,
    /// Maximum orders created per position per UTC calendar day.
    pub max_orders_per_day: u32,
    /// Optional cap on a single trade's notional as a fraction of the
    /// position's total value.
    pub max_trade_pct: Option<Decimal>,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            min_stock_pct: dec!(0.25),
            max_stock_pct: dec!(0.75),
            max_orders_per_day: 5,
            max_trade_pct: None,
        }
    }
}

impl GuardrailConfig {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.min_stock_pct < Decimal::ZERO || self.min_stock_pct > Decimal::ONE {
            return Err(DomainError::InvalidValue {
                field: "min_stock_pct",
                message: format!("must be in [0, 1], got {}", self.min_stock_pct),
            });
        }
        if self.max_stock_pct < Decimal::ZERO || self.max_stock_pct > Decimal::ONE {
            return Err(DomainError::InvalidValue {
                field: "max_stock_pct",
                message: format!("must be in [0, 1], got {}", self.max_stock_pct),
            });
        }
        if self.min_stock_pct > self.max_stock_pct {
            return Err(DomainError::InvalidValue {
                field: "min_stock_pct",
                message: format!(
                    "lower bound {} exceeds upper bound {}",
                    self.min_stock_pct, self.max_stock_pct
                ),
            });
        }
        if let Some(pct) = self.max_trade_pct {
            if pct <= Decimal::ZERO || pct > Decimal::ONE {
                return Err(DomainError::InvalidValue {
                    field: "max_trade_pct",
                    message: format!("must be in (0, 1], got {pct}"),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// OrderPolicyConfig
// ---------------------------------------------------------------------------

/// What to do when a proposed or requested quantity falls below the
/// configured minimums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionBelowMin {
    /// Leave the order in its current state; no position change.
    Hold,
    /// Transition the order to `rejected`.
    Reject,
}

/// Minimum-size, rounding and commission rules applied to every order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPolicyConfig {
    /// Minimum absolute quantity; 0 disables the check.
    pub min_qty: Decimal,
    /// Minimum notional (|qty| × price); 0 disables the check.
    pub min_notional: Decimal,
    /// Lot size: quantities are floored to a multiple of this (0 disables).
    pub lot_size: Decimal,
    /// Quantization step for fractional quantities.
    pub qty_step: Decimal,
    pub action_below_min: ActionBelowMin,
    /// Commission as a fraction of notional.
    pub commission_rate: Decimal,
    /// Whether the position may trade outside regular market hours.
    pub allow_after_hours: bool,
}

impl Default for OrderPolicyConfig {
    fn default() -> Self {
        Self {
            min_qty: Decimal::ZERO,
            min_notional: dec!(100),
            lot_size: Decimal::ZERO,
            qty_step: dec!(0.00000001),
            action_below_min: ActionBelowMin::Hold,
            commission_rate: Decimal::ZERO,
            allow_after_hours: false,
        }
    }
}

impl OrderPolicyConfig {
    pub fn validate(&self) -> Result<(), DomainError> {
        for (field, v) in [
            ("min_qty", self.min_qty),
            ("min_notional", self.min_notional),
            ("lot_size", self.lot_size),
            ("qty_step", self.qty_step),
            ("commission_rate", self.commission_rate),
        ] {
            if v < Decimal::ZERO {
                return Err(DomainError::InvalidValue {
                    field,
                    message: format!("must be >= 0, got {v}"),
                });
            }
        }
        Ok(())
    }

    /// Quantize a requested absolute quantity: floor to `qty_step`, then
    /// floor to `lot_size` multiples.
    pub fn quantize_qty(&self, qty: Decimal) -> Decimal {
        let stepped = crate::num::quantize_to_step(qty, self.qty_step);
        if self.lot_size > Decimal::ZERO {
            crate::num::quantize_to_step(stepped, self.lot_size)
        } else {
            stepped
        }
    }

    /// Whether `qty` at `price` falls below either minimum.
    pub fn below_min(&self, qty: Decimal, price: Decimal) -> bool {
        let qty = qty.abs();
        let notional = qty * price;
        (self.min_qty > Decimal::ZERO && qty < self.min_qty)
            || (self.min_notional > Decimal::ZERO && notional < self.min_notional)
    }

    /// Which minimum failed, in check order: qty first, then notional.
    pub fn below_min_reason(&self, qty: Decimal, price: Decimal) -> Option<crate::BreachReason> {
        let qty = qty.abs();
        if self.min_qty > Decimal::ZERO && qty < self.min_qty {
            return Some(crate::BreachReason::BelowMinQty);
        }
        if self.min_notional > Decimal::ZERO && qty * price < self.min_notional {
            return Some(crate::BreachReason::MinNotional);
        }
        None
    }
}
