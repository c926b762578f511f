//! Broker-order convergence.
//!
//! Both the fill router and the periodic reconciliation worker converge
//! local order state to the broker's cumulative view. The local order's
//! `filled_qty` is the source of truth for what has been applied, so
//! re-delivered or out-of-order notifications reduce to a no-op delta.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use vbl_domain::{DomainError, OrderStatus};
use vbl_engine::{Engine, FillRequest, TraceContext};
use vbl_ports::{Broker, BrokerStatus, Clock as _};
use vbl_store::OrdersRepo;

/// Statuses the reconciliation sweep considers in-flight.
pub const OPEN_STATUSES: &[OrderStatus] = &[
    OrderStatus::Submitted,
    OrderStatus::Pending,
    OrderStatus::Working,
    OrderStatus::Partial,
];

/// Converge one order to the broker's reported state. Must be called
/// with the position's lock held.
///
/// Applies only the *delta* between the broker's cumulative `filled_qty`
/// and the locally applied quantity, so calling this twice for the same
/// broker state is a no-op (and a fill notification plus a reconcile
/// sweep cannot double-apply).
pub fn converge_order(
    engine: &Engine,
    broker: &Arc<dyn Broker>,
    order_id: &str,
    trace: &mut TraceContext,
) -> Result<Decimal, DomainError> {
    let order = engine
        .ports
        .orders
        .get(order_id)
        .ok_or_else(|| DomainError::OrderNotFound {
            order_id: order_id.to_string(),
        })?;

    let broker_order_id = match &order.broker_order_id {
        Some(id) => id.clone(),
        // Never acknowledged: nothing to converge against.
        None => return Ok(Decimal::ZERO),
    };

    let state = broker.status(&broker_order_id)?;

    let mut order = order;
    order.broker_status = Some(state.status.as_str().to_string());

    let delta = state.filled_qty - order.filled_qty;
    let mut applied = Decimal::ZERO;

    if delta > Decimal::ZERO {
        let price = state.avg_price.ok_or_else(|| DomainError::InvalidValue {
            field: "avg_price",
            message: format!("broker reports fills without a price on {broker_order_id}"),
        })?;
        // Commission attributable to the unapplied slice.
        let commission = (state.commission - order.total_commission).max(Decimal::ZERO);
        engine
            .ports
            .orders
            .save(order.clone());
        let outcome = engine
            .execute
            .fill(
                order_id,
                &FillRequest {
                    qty: delta,
                    price,
                    commission,
                },
                trace,
            )
            .map_err(|e| match e {
                vbl_engine::EngineError::Domain(d) => d,
                vbl_engine::EngineError::Store(s) => DomainError::InvalidValue {
                    field: "store",
                    message: s.to_string(),
                },
            })?;
        applied = outcome.filled_qty;
        info!(order_id, %applied, "reconciled fill delta");
    } else {
        engine.ports.orders.save(order.clone());
    }

    // Terminal broker states close out still-live local orders.
    let order = engine.ports.orders.get(order_id).expect("order persisted");
    if !order.status.is_terminal() {
        let local_target = match state.status {
            BrokerStatus::Cancelled => Some(OrderStatus::Cancelled),
            BrokerStatus::Rejected => Some(OrderStatus::Rejected),
            _ => None,
        };
        if let Some(target) = local_target {
            let mut order = order;
            if order.transition(target, engine.ports.clock.now()).is_ok() {
                engine.ports.orders.save(order);
                info!(order_id, status = %target, "converged terminal broker status");
            }
        }
    }

    Ok(applied)
}

/// One reconciliation sweep over all in-flight orders, serialized per
/// position via `locks`.
///
/// Returns the total quantity applied. Per-order failures are logged and
/// skipped; a broker outage fails the whole sweep so the alert checker
/// sees it.
pub async fn reconcile_open_orders(
    engine: &Engine,
    broker: &Arc<dyn Broker>,
    locks: &crate::locks::PositionLocks,
) -> Result<Decimal, DomainError> {
    let open = engine.ports.orders.list_by_status(OPEN_STATUSES);
    let mut total = Decimal::ZERO;
    for order in open {
        let lock = locks.for_position(&order.position_id);
        let _guard = lock.lock().await;
        let mut trace = TraceContext::root(engine.ports.ids.as_ref());
        match converge_order(engine, broker, &order.id, &mut trace) {
            Ok(applied) => total += applied,
            Err(DomainError::BrokerUnreachable { message }) => {
                return Err(DomainError::BrokerUnreachable { message });
            }
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "reconcile skipped order");
            }
        }
    }
    Ok(total)
}
