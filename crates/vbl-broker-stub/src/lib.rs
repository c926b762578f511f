//! Deterministic stub broker.
//!
//! Default behavior fills every submission immediately and in full at the
//! scripted per-symbol price, with commission derived from the submitted
//! rate snapshot. Scenario tests script other behaviors: accept-and-hold
//! (fills fired manually, possibly in slices), outright rejection, and an
//! unreachable venue. Ids are counters, so runs are reproducible.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use vbl_domain::DomainError;
use vbl_ports::{
    Broker, BrokerAck, BrokerOrderState, BrokerStatus, Clock, FillCallback, FillNotification,
    SubmitRequest,
};

/// How the stub reacts to submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubBehavior {
    /// Ack + full fill at the scripted price, synchronously.
    FillImmediately,
    /// Ack as `working`; fills fire only via [`StubBroker::fire_fill`].
    AcceptOnly,
    /// Reject every submission.
    RejectAll,
}

#[derive(Debug, Clone)]
struct StubOrder {
    client_order_id: String,
    symbol: String,
    qty: Decimal,
    commission_rate: Decimal,
    status: BrokerStatus,
    filled_qty: Decimal,
    avg_price: Option<Decimal>,
    commission: Decimal,
}

struct Inner {
    next_order: u64,
    next_fill: u64,
    behavior: StubBehavior,
    unreachable: bool,
    prices: BTreeMap<String, Decimal>,
    orders: BTreeMap<String, StubOrder>,
    by_client: BTreeMap<String, String>,
    submit_count: u64,
}

pub struct StubBroker {
    inner: Mutex<Inner>,
    callbacks: Mutex<Vec<FillCallback>>,
    clock: Arc<dyn Clock>,
}

impl StubBroker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_order: 1,
                next_fill: 1,
                behavior: StubBehavior::FillImmediately,
                unreachable: false,
                prices: BTreeMap::new(),
                orders: BTreeMap::new(),
                by_client: BTreeMap::new(),
                submit_count: 0,
            }),
            callbacks: Mutex::new(Vec::new()),
            clock,
        }
    }

    pub fn set_behavior(&self, behavior: StubBehavior) {
        self.inner.lock().expect("stub lock").behavior = behavior;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.lock().expect("stub lock").unreachable = unreachable;
    }

    /// Script the fill price for a symbol.
    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.inner
            .lock()
            .expect("stub lock")
            .prices
            .insert(symbol.to_string(), price);
    }

    pub fn submit_count(&self) -> u64 {
        self.inner.lock().expect("stub lock").submit_count
    }

    /// Fire one fill slice for an accepted order (AcceptOnly flows and
    /// partial-fill scenarios). Commission is taken verbatim.
    pub fn fire_fill(
        &self,
        broker_order_id: &str,
        qty: Decimal,
        price: Decimal,
        commission: Decimal,
    ) -> Result<FillNotification, DomainError> {
        let executed_at = self.clock.now();
        let notification = {
            let mut inner = self.inner.lock().expect("stub lock");
            let order = inner.orders.get_mut(broker_order_id).ok_or_else(|| {
                DomainError::BrokerRejected {
                    message: format!("unknown broker order {broker_order_id}"),
                }
            })?;
            if order.status.is_terminal() {
                return Err(DomainError::BrokerRejected {
                    message: format!(
                        "broker order {broker_order_id} ({}) is terminal",
                        order.symbol
                    ),
                });
            }
            apply_slice(order, qty, price, commission);
            let status = order.status;
            let client_order_id = order.client_order_id.clone();
            inner.next_fill += 1;
            FillNotification {
                order_id: client_order_id,
                broker_order_id: broker_order_id.to_string(),
                qty,
                price,
                commission,
                status,
                executed_at,
            }
        };
        self.dispatch(&notification);
        Ok(notification)
    }

    fn dispatch(&self, notification: &FillNotification) {
        let callbacks = self.callbacks.lock().expect("stub callbacks lock");
        for cb in callbacks.iter() {
            cb(notification.clone());
        }
    }
}

/// Cumulative slice application with size-weighted average price.
fn apply_slice(order: &mut StubOrder, qty: Decimal, price: Decimal, commission: Decimal) {
    let prev_notional = order.avg_price.unwrap_or(Decimal::ZERO) * order.filled_qty;
    let new_filled = order.filled_qty + qty;
    order.avg_price = (prev_notional + qty * price).checked_div(new_filled);
    order.filled_qty = new_filled;
    order.commission += commission;
    order.status = if order.filled_qty >= order.qty {
        BrokerStatus::Filled
    } else {
        BrokerStatus::Partial
    };
}

impl Broker for StubBroker {
    fn submit(&self, request: &SubmitRequest) -> Result<BrokerAck, DomainError> {
        let executed_at = self.clock.now();
        let (ack, notification) = {
            let mut inner = self.inner.lock().expect("stub lock");
            if inner.unreachable {
                return Err(DomainError::BrokerUnreachable {
                    message: "stub scripted unreachable".to_string(),
                });
            }
            inner.submit_count += 1;

            // Idempotency on the client order id: a retry returns the
            // original acknowledgement instead of a new broker order.
            if let Some(existing) = inner.by_client.get(&request.order_id) {
                let order = &inner.orders[existing];
                return Ok(BrokerAck {
                    broker_order_id: existing.clone(),
                    status: order.status,
                });
            }

            let broker_order_id = format!("BRK-{:06}", inner.next_order);
            inner.next_order += 1;

            let behavior = inner.behavior;
            let status = match behavior {
                StubBehavior::RejectAll => BrokerStatus::Rejected,
                StubBehavior::AcceptOnly => BrokerStatus::Working,
                StubBehavior::FillImmediately => BrokerStatus::Pending,
            };
            let mut order = StubOrder {
                client_order_id: request.order_id.clone(),
                symbol: request.symbol.clone(),
                qty: request.qty,
                commission_rate: request.commission_snapshot,
                status,
                filled_qty: Decimal::ZERO,
                avg_price: None,
                commission: Decimal::ZERO,
            };

            let mut notification = None;
            if behavior == StubBehavior::FillImmediately {
                let price = inner
                    .prices
                    .get(&request.symbol)
                    .copied()
                    .ok_or_else(|| DomainError::BrokerRejected {
                        message: format!("no scripted price for {}", request.symbol),
                    })?;
                let commission = request.qty * price * order.commission_rate;
                apply_slice(&mut order, request.qty, price, commission);
                inner.next_fill += 1;
                notification = Some(FillNotification {
                    order_id: request.order_id.clone(),
                    broker_order_id: broker_order_id.clone(),
                    qty: request.qty,
                    price,
                    commission,
                    status: order.status,
                    executed_at,
                });
            }

            let ack = BrokerAck {
                broker_order_id: broker_order_id.clone(),
                status: order.status,
            };
            inner
                .by_client
                .insert(request.order_id.clone(), broker_order_id.clone());
            inner.orders.insert(broker_order_id, order);
            (ack, notification)
        };

        if let Some(n) = notification {
            self.dispatch(&n);
        }
        Ok(ack)
    }

    fn status(&self, broker_order_id: &str) -> Result<BrokerOrderState, DomainError> {
        let inner = self.inner.lock().expect("stub lock");
        if inner.unreachable {
            return Err(DomainError::BrokerUnreachable {
                message: "stub scripted unreachable".to_string(),
            });
        }
        let order = inner.orders.get(broker_order_id).ok_or_else(|| {
            DomainError::BrokerRejected {
                message: format!("unknown broker order {broker_order_id}"),
            }
        })?;
        Ok(BrokerOrderState {
            broker_order_id: broker_order_id.to_string(),
            status: order.status,
            filled_qty: order.filled_qty,
            avg_price: order.avg_price,
            commission: order.commission,
        })
    }

    fn cancel(&self, broker_order_id: &str) -> Result<BrokerStatus, DomainError> {
        let mut inner = self.inner.lock().expect("stub lock");
        let order = inner.orders.get_mut(broker_order_id).ok_or_else(|| {
            DomainError::BrokerRejected {
                message: format!("unknown broker order {broker_order_id}"),
            }
        })?;
        if !order.status.is_terminal() {
            order.status = BrokerStatus::Cancelled;
        }
        Ok(order.status)
    }

    fn on_fill(&self, callback: FillCallback) {
        self.callbacks.lock().expect("stub callbacks lock").push(callback);
    }
}
