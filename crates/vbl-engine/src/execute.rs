//! Fill application: the only mutation path for position qty/cash.
//!
//! Callers must serialize invocations per `position_id` (the live layer
//! holds a per-position lock; the simulation is single-threaded). The
//! sequence validates everything before the first save so a failed check
//! never leaves partial state behind.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;

use vbl_domain::{
    validate_after_fill, ActionBelowMin, AllocationState, BreachReason, DomainError, EventRecord,
    EventType, Order, OrderSide, OrderStatus, Trade, TransitionError,
};
use vbl_ports::Clock;
use vbl_store::{ConfigRepo, EventsRepo, OrdersRepo, PositionsRepo, TradesRepo};

use crate::error::EngineError;
use crate::ids::IdGen;
use crate::trace::TraceContext;
use crate::wiring::EnginePorts;

/// One fill slice reported by the broker (or the simulation).
#[derive(Debug, Clone, PartialEq)]
pub struct FillRequest {
    /// Absolute quantity of this slice.
    pub qty: Decimal,
    pub price: Decimal,
    pub commission: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FillOutcome {
    pub order_id: String,
    pub status: OrderStatus,
    /// Quantity applied by THIS call (0 on idempotent replays and skips).
    pub filled_qty: Decimal,
    pub trade_id: Option<String>,
}

#[derive(Clone)]
pub struct ExecuteOrder {
    ports: EnginePorts,
}

impl ExecuteOrder {
    pub fn new(ports: EnginePorts) -> Self {
        Self { ports }
    }

    /// Apply a fill to an order and its position.
    ///
    /// * Already-`filled` orders return idempotently with no change.
    /// * `rejected`/`cancelled` orders refuse the fill.
    /// * Below-min slices follow the order policy's `action_below_min`.
    /// * SELL sufficiency and after-fill allocation guardrails are
    ///   enforced before any state changes.
    pub fn fill(
        &self,
        order_id: &str,
        request: &FillRequest,
        trace: &mut TraceContext,
    ) -> Result<FillOutcome, EngineError> {
        let mut order = self
            .ports
            .orders
            .get(order_id)
            .ok_or_else(|| DomainError::OrderNotFound {
                order_id: order_id.to_string(),
            })?;

        if order.status == OrderStatus::Filled {
            return Ok(FillOutcome {
                order_id: order.id,
                status: OrderStatus::Filled,
                filled_qty: Decimal::ZERO,
                trade_id: None,
            });
        }
        if order.status.is_terminal() {
            return Err(TransitionError {
                order_id: order.id.clone(),
                from: order.status,
                to: OrderStatus::Filled,
            }
            .into());
        }

        let mut position = self
            .ports
            .positions
            .get(&order.tenant_id, &order.portfolio_id, &order.position_id)
            .ok_or_else(|| DomainError::PositionNotFound {
                position_id: order.position_id.clone(),
            })?;

        let policy = self
            .ports
            .configs
            .order_policy(&order.tenant_id, &order.portfolio_id, &order.position_id)
            .ok_or_else(|| DomainError::ConfigurationMissing {
                what: format!("order policy for {}", order.position_id),
            })?;
        let guardrail = self
            .ports
            .configs
            .guardrail_config(&order.tenant_id, &order.portfolio_id, &order.position_id)
            .ok_or_else(|| DomainError::ConfigurationMissing {
                what: format!("guardrail config for {}", order.position_id),
            })?;

        if request.price <= Decimal::ZERO {
            return Err(DomainError::InvalidValue {
                field: "price",
                message: format!("must be > 0, got {}", request.price),
            }
            .into());
        }

        let now = self.ports.clock.now();
        let qty = policy.quantize_qty(request.qty.abs());
        let commission = request.commission.max(Decimal::ZERO);

        // -------------------------------------------------------------------
        // Below-min policy
        // -------------------------------------------------------------------
        if qty == Decimal::ZERO || policy.below_min(qty, request.price) {
            return self.apply_below_min(order, qty, request, policy.action_below_min, now, trace);
        }

        if qty > order.remaining_qty() {
            return Err(DomainError::InvalidValue {
                field: "fill_qty",
                message: format!(
                    "fill of {qty} exceeds remaining {} on {}",
                    order.remaining_qty(),
                    order.id
                ),
            }
            .into());
        }

        // -------------------------------------------------------------------
        // Sell sufficiency
        // -------------------------------------------------------------------
        if order.side == OrderSide::Sell && qty > position.qty {
            self.emit(
                trace,
                EventType::FillRejectedInsufficientQty,
                &order,
                now,
                "insufficient position qty".to_string(),
                json!({"qty": qty, "price": request.price, "held": position.qty}),
            )?;
            return Err(BreachReason::InsufficientQty.into());
        }

        // -------------------------------------------------------------------
        // After-fill guardrail
        // -------------------------------------------------------------------
        let state = AllocationState {
            qty: position.qty,
            cash: position.cash,
        };
        if let Err(breach) =
            validate_after_fill(state, order.side, qty, request.price, commission, &guardrail)
        {
            self.emit(
                trace,
                EventType::GuardrailBreach,
                &order,
                now,
                format!("guardrail breach: {}", breach.code()),
                json!({
                    "side": order.side,
                    "qty": qty,
                    "price": request.price,
                    "commission": commission,
                    "reason": breach.code(),
                }),
            )?;
            return Err(breach.into());
        }

        // -------------------------------------------------------------------
        // Apply: position first (validated), then trade, then order
        // -------------------------------------------------------------------
        let pre_qty = position.qty;
        let pre_cash = position.cash;
        let old_anchor = position.anchor_price;

        match order.side {
            OrderSide::Buy => position.apply_buy(qty, request.price, commission, now)?,
            OrderSide::Sell => position.apply_sell(qty, request.price, commission, now)?,
        }

        let trade = Trade::new(
            self.ports.ids.trade_id(),
            order.tenant_id.clone(),
            order.portfolio_id.clone(),
            order.position_id.clone(),
            order.id.clone(),
            order.side,
            qty,
            request.price,
            commission,
            now,
        )?;

        order.record_fill(qty, request.price, commission, now)?;

        // Anchor reset to the execution price.
        position.set_anchor(request.price, now)?;

        self.ports.positions.save(position.clone());
        self.ports.trades.save(trade.clone());
        self.ports.orders.save(order.clone());

        self.emit(
            trace,
            EventType::ExecutionRecorded,
            &order,
            now,
            format!("fill applied: {} {} @ {}", order.side, qty, request.price),
            json!({
                "trade_id": trade.id,
                "qty": qty,
                "price": request.price,
                "commission": commission,
                "commission_rate_effective": trade.commission_rate_effective,
                "order_status": order.status,
            }),
        )?;
        self.emit(
            trace,
            EventType::AnchorReset,
            &order,
            now,
            format!("anchor reset to {}", request.price),
            json!({"old": old_anchor, "new": request.price, "reason": "post_fill"}),
        )?;
        self.emit(
            trace,
            EventType::PositionUpdated,
            &order,
            now,
            "position updated".to_string(),
            json!({
                "pre": {"qty": pre_qty, "cash": pre_cash, "anchor": old_anchor},
                "post": {
                    "qty": position.qty,
                    "cash": position.cash,
                    "anchor": position.anchor_price,
                    "total_commission_paid": position.total_commission_paid,
                },
            }),
        )?;

        info!(
            order_id,
            trade_id = %trade.id,
            side = %order.side,
            qty = %qty,
            price = %request.price,
            status = %order.status,
            "execution recorded"
        );

        Ok(FillOutcome {
            order_id: order.id,
            status: order.status,
            filled_qty: qty,
            trade_id: Some(trade.id),
        })
    }

    // -----------------------------------------------------------------------

    fn apply_below_min(
        &self,
        mut order: Order,
        qty: Decimal,
        request: &FillRequest,
        action: ActionBelowMin,
        now: DateTime<Utc>,
        trace: &mut TraceContext,
    ) -> Result<FillOutcome, EngineError> {
        match action {
            ActionBelowMin::Reject => {
                order.transition(OrderStatus::Rejected, now)?;
                self.ports.orders.save(order.clone());
                self.emit(
                    trace,
                    EventType::FillRejectedBelowMin,
                    &order,
                    now,
                    "fill rejected: below minimum order policy".to_string(),
                    json!({"qty": qty, "price": request.price}),
                )?;
                Ok(FillOutcome {
                    order_id: order.id,
                    status: OrderStatus::Rejected,
                    filled_qty: Decimal::ZERO,
                    trade_id: None,
                })
            }
            ActionBelowMin::Hold => {
                self.emit(
                    trace,
                    EventType::FillSkippedBelowMin,
                    &order,
                    now,
                    "fill skipped: below minimum order policy".to_string(),
                    json!({"qty": qty, "price": request.price}),
                )?;
                Ok(FillOutcome {
                    order_id: order.id.clone(),
                    status: order.status,
                    filled_qty: Decimal::ZERO,
                    trade_id: None,
                })
            }
        }
    }

    fn emit(
        &self,
        trace: &mut TraceContext,
        event_type: EventType,
        order: &Order,
        now: DateTime<Utc>,
        message: String,
        payload: serde_json::Value,
    ) -> Result<(), EngineError> {
        let ev = EventRecord::new(
            self.ports.ids.event_id(),
            event_type,
            trace.trace_id.clone(),
            "engine",
            message,
            payload,
            now,
        )
        .with_scope(&order.tenant_id, &order.portfolio_id, &order.position_id);
        self.ports.events.append(trace.chain(ev))?;
        Ok(())
    }
}
