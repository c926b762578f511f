//! Idempotent order creation.
//!
//! Allocation guardrails are deliberately NOT rechecked here: the
//! execution price is unknown until fill time, so final enforcement lives
//! in [`crate::execute`]. What is checked: idempotency (same key + same
//! signature replays the original order id; same key + different
//! signature fails), and the per-position daily order cap on the UTC date.

use rust_decimal::Decimal;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::info;

use vbl_domain::{BreachReason, DomainError, EventRecord, EventType, Order, OrderSide};
use vbl_ports::Clock;
use vbl_store::{
    ConfigRepo, EventsRepo, IdempotencyRepo, OrdersRepo, PositionsRepo, Reservation,
};

use crate::error::EngineError;
use crate::ids::IdGen;
use crate::trace::TraceContext;
use crate::wiring::EnginePorts;

/// Submission body: side + requested absolute quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitRequestBody {
    pub side: OrderSide,
    pub qty: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitResult {
    pub order_id: String,
    pub accepted: bool,
    /// True when the idempotency key replayed a previously created order.
    pub replayed: bool,
}

#[derive(Clone)]
pub struct SubmitOrder {
    ports: EnginePorts,
}

impl SubmitOrder {
    pub fn new(ports: EnginePorts) -> Self {
        Self { ports }
    }

    /// SHA-256 over the normalized request; two requests with the same
    /// key must hash identically to be treated as a replay.
    pub fn signature(position_id: &str, side: OrderSide, qty: Decimal) -> String {
        let mut hasher = Sha256::new();
        hasher.update(position_id.as_bytes());
        hasher.update(b"|");
        hasher.update(side.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(qty.normalize().to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn submit(
        &self,
        tenant_id: &str,
        portfolio_id: &str,
        position_id: &str,
        request: &SubmitRequestBody,
        idempotency_key: &str,
        trace: &mut TraceContext,
    ) -> Result<SubmitResult, EngineError> {
        if request.qty <= Decimal::ZERO {
            return Err(DomainError::InvalidValue {
                field: "qty",
                message: format!("must be > 0, got {}", request.qty),
            }
            .into());
        }

        let position = self
            .ports
            .positions
            .get(tenant_id, portfolio_id, position_id)
            .ok_or_else(|| DomainError::PositionNotFound {
                position_id: position_id.to_string(),
            })?;

        // -------------------------------------------------------------------
        // Idempotency reservation
        // -------------------------------------------------------------------
        let signature = Self::signature(position_id, request.side, request.qty);
        match self
            .ports
            .idempotency
            .reserve(position_id, idempotency_key, &signature)
        {
            Reservation::Conflict => {
                return Err(DomainError::IdempotencySignatureMismatch {
                    key: idempotency_key.to_string(),
                }
                .into());
            }
            Reservation::Replay { order_id } => {
                return Ok(SubmitResult {
                    order_id,
                    accepted: true,
                    replayed: true,
                });
            }
            Reservation::Fresh => {}
        }

        // -------------------------------------------------------------------
        // Daily cap (UTC calendar date)
        // -------------------------------------------------------------------
        let guardrail = self
            .ports
            .configs
            .guardrail_config(tenant_id, portfolio_id, position_id)
            .ok_or_else(|| DomainError::ConfigurationMissing {
                what: format!("guardrail config for {position_id}"),
            })?;
        let today = self.ports.clock.now().date_naive();
        let submitted_today = self
            .ports
            .orders
            .count_for_position_on_day(position_id, today);
        if submitted_today >= guardrail.max_orders_per_day as usize {
            return Err(BreachReason::DailyOrderCapExceeded.into());
        }

        // -------------------------------------------------------------------
        // Commission snapshot: tenant/asset override, order-policy fallback
        // -------------------------------------------------------------------
        let policy = self
            .ports
            .configs
            .order_policy(tenant_id, portfolio_id, position_id)
            .ok_or_else(|| DomainError::ConfigurationMissing {
                what: format!("order policy for {position_id}"),
            })?;
        let commission_rate = self
            .ports
            .configs
            .commission_rate(tenant_id, &position.asset_symbol)
            .unwrap_or(policy.commission_rate);

        // -------------------------------------------------------------------
        // Create and persist
        // -------------------------------------------------------------------
        let now = self.ports.clock.now();
        let order_id = self.ports.ids.order_id();
        let order = Order::new(
            order_id.clone(),
            tenant_id,
            portfolio_id,
            position_id,
            request.side,
            request.qty,
            idempotency_key,
            signature.clone(),
            commission_rate,
            now,
        )?;
        self.ports.orders.save(order);
        self.ports
            .idempotency
            .complete(position_id, idempotency_key, &signature, &order_id);

        let ev = EventRecord::new(
            self.ports.ids.event_id(),
            EventType::OrderCreated,
            trace.trace_id.clone(),
            "engine",
            format!("order created ({} {})", request.side, request.qty),
            json!({
                "order_id": order_id,
                "side": request.side,
                "qty": request.qty,
                "idempotency_key": idempotency_key,
                "commission_rate_snapshot": commission_rate,
            }),
            now,
        )
        .with_scope(tenant_id, portfolio_id, position_id)
        .with_asset(&position.asset_symbol);
        self.ports.events.append(trace.chain(ev))?;

        info!(%order_id, position_id, side = %request.side, qty = %request.qty, "order created");

        Ok(SubmitResult {
            order_id,
            accepted: true,
            replayed: false,
        })
    }
}
