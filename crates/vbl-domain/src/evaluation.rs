//! The per-tick evaluation fact: one row per live tick or simulated bar.
//!
//! This record is the canonical "what did the algorithm decide, why, and
//! what happened" row. Every evaluation writes exactly one, including
//! skips, market-closed ticks and price failures, so the timeline can
//! explain why nothing happened as readily as why something did.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::order::OrderSide;
use crate::trigger::TriggerDirection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvalMode {
    Live,
    Simulation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvalAction {
    Buy,
    Sell,
    Hold,
    Skip,
}

impl EvalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
            Self::Skip => "SKIP",
        }
    }

    /// BUY / SELL / SKIP count as "action" rows for daily aggregation;
    /// HOLD rows do not.
    pub fn is_action(&self) -> bool {
        !matches!(self, Self::Hold)
    }
}

impl std::fmt::Display for EvalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Denormalized evaluation fact. Unknown fields encountered on the wire
/// are preserved in `extra` and re-emitted verbatim (forward-compatible
/// by contract).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub id: String,
    pub mode: EvalMode,
    pub timestamp: DateTime<Utc>,
    pub trace_id: String,
    pub tenant_id: String,
    pub portfolio_id: String,
    pub position_id: String,
    pub asset_symbol: String,

    /// Effective price used for the decision.
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,

    pub anchor_before: Option<Decimal>,
    pub anchor_after: Option<Decimal>,
    /// (price − anchor) / anchor, when an anchor existed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_pct: Option<Decimal>,
    pub tau_up: Decimal,
    pub tau_down: Decimal,

    pub trigger_fired: bool,
    pub trigger_direction: TriggerDirection,
    pub trigger_reason: String,

    pub min_stock_pct: Decimal,
    pub max_stock_pct: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_pct_current: Option<Decimal>,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,

    pub action: EvalAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<OrderSide>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intended_qty: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intended_value: Option<Decimal>,

    pub qty_before: Decimal,
    pub cash_before: Decimal,
    pub stock_value_before: Decimal,
    pub total_value_before: Decimal,
    pub qty_after: Decimal,
    pub cash_after: Decimal,
    pub stock_value_after: Decimal,
    pub total_value_after: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_pct_after: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_qty: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_value: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dividend_amount: Option<Decimal>,
    pub anchor_reset: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor_reset_reason: Option<String>,

    /// Fields this build does not know about; never dropped.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EvaluationRecord {
    /// Snapshot the before-state of a position into a HOLD row. Use-case
    /// code then layers the trigger/guardrail/action fields on top.
    #[allow(clippy::too_many_arguments)]
    pub fn base(
        id: impl Into<String>,
        mode: EvalMode,
        timestamp: DateTime<Utc>,
        trace_id: impl Into<String>,
        position: &crate::position::Position,
        price: Decimal,
        tau_up: Decimal,
        tau_down: Decimal,
        min_stock_pct: Decimal,
        max_stock_pct: Decimal,
    ) -> Self {
        let stock_value = position.market_value(price);
        let total_value = stock_value + position.cash;
        Self {
            id: id.into(),
            mode,
            timestamp,
            trace_id: trace_id.into(),
            tenant_id: position.tenant_id.clone(),
            portfolio_id: position.portfolio_id.clone(),
            position_id: position.id.clone(),
            asset_symbol: position.asset_symbol.clone(),
            price,
            price_source: None,
            open: None,
            high: None,
            low: None,
            close: None,
            volume: None,
            anchor_before: position.anchor_price,
            anchor_after: position.anchor_price,
            delta_pct: None,
            tau_up,
            tau_down,
            trigger_fired: false,
            trigger_direction: TriggerDirection::None,
            trigger_reason: String::new(),
            min_stock_pct,
            max_stock_pct,
            stock_pct_current: position.stock_pct(price),
            allowed: true,
            block_reason: None,
            action: EvalAction::Hold,
            side: None,
            intended_qty: None,
            intended_value: None,
            qty_before: position.qty,
            cash_before: position.cash,
            stock_value_before: stock_value,
            total_value_before: total_value,
            qty_after: position.qty,
            cash_after: position.cash,
            stock_value_after: stock_value,
            total_value_after: total_value,
            stock_pct_after: position.stock_pct(price),
            order_id: None,
            execution_qty: None,
            execution_price: None,
            execution_value: None,
            commission: None,
            dividend_amount: None,
            anchor_reset: false,
            anchor_reset_reason: None,
            extra: Map::new(),
        }
    }
}
