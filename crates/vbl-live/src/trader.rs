//! The per-position live trading scheduler.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use vbl_domain::{
    EvalAction, EvalMode, EvaluationRecord, EventRecord, EventType, TradingHoursPolicy,
};
use vbl_engine::{Engine, IdGen as _, SubmitRequestBody, TraceContext};
use vbl_ports::{Broker, BrokerStatus, Clock as _, FillNotification, MarketData as _, SubmitRequest};
use vbl_store::{
    ConfigRepo, EventsRepo, OrdersRepo, PortfoliosRepo, PositionsRepo, TimelineRepo,
};

use crate::alerts::{AlertChecker, AlertInputs};
use crate::locks::PositionLocks;
use crate::reconcile::{converge_order, reconcile_open_orders, OPEN_STATUSES};
use crate::retry::RetryPolicy;
use crate::status::WorkerStatus;

/// Fully-scoped position address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PositionRef {
    pub tenant_id: String,
    pub portfolio_id: String,
    pub position_id: String,
}

#[derive(Clone)]
pub struct LiveTraderConfig {
    pub tick_interval: Duration,
    pub reconcile_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for LiveTraderConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            reconcile_interval: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Pause,
    Stop,
}

struct Worker {
    command: watch::Sender<Command>,
    position: PositionRef,
    handle: JoinHandle<()>,
}

/// Live trading orchestrator. Cheap to clone (shared inner).
#[derive(Clone)]
pub struct LiveTrader {
    inner: Arc<Inner>,
}

struct Inner {
    engine: Engine,
    broker: Arc<dyn Broker>,
    locks: PositionLocks,
    config: LiveTraderConfig,
    statuses: StdMutex<HashMap<String, Arc<StdMutex<WorkerStatus>>>>,
    workers: StdMutex<HashMap<String, Worker>>,
}

impl LiveTrader {
    /// Wire the trader and bind the broker's fill callback to the fill
    /// router. Must be called inside a tokio runtime.
    pub fn new(engine: Engine, broker: Arc<dyn Broker>, config: LiveTraderConfig) -> Self {
        let inner = Arc::new(Inner {
            engine,
            broker: broker.clone(),
            locks: PositionLocks::new(),
            config,
            statuses: StdMutex::new(HashMap::new()),
            workers: StdMutex::new(HashMap::new()),
        });

        // The callback only enqueues; the router task applies fills under
        // the position locks.
        let (tx, mut rx) = mpsc::unbounded_channel::<FillNotification>();
        broker.on_fill(Arc::new(move |n| {
            let _ = tx.send(n);
        }));
        let router = inner.clone();
        tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                router.handle_fill(notification).await;
            }
        });

        Self { inner }
    }

    /// Start (or restart) the evaluation worker for a position.
    pub fn start(&self, position: PositionRef) {
        let key = position.position_id.clone();
        let mut workers = self.inner.workers.lock().expect("workers lock");
        if let Some(existing) = workers.get(&key) {
            // Already scheduled: just make sure it is running.
            let _ = existing.command.send(Command::Run);
            self.with_status(&key, |s| {
                s.running = true;
                s.paused = false;
            });
            return;
        }

        let (command_tx, command_rx) = watch::channel(Command::Run);
        let inner = self.inner.clone();
        let pos = position.clone();
        let handle = tokio::spawn(async move {
            inner.worker_loop(pos, command_rx).await;
        });
        workers.insert(
            key.clone(),
            Worker {
                command: command_tx,
                position,
                handle,
            },
        );
        self.with_status(&key, |s| {
            s.running = true;
            s.paused = false;
        });
        info!(position_id = %key, "worker started");
    }

    /// Stop scheduling new ticks; an in-flight tick finishes.
    pub fn pause(&self, position_id: &str) {
        if let Some(worker) = self.inner.workers.lock().expect("workers lock").get(position_id) {
            let _ = worker.command.send(Command::Pause);
        }
        self.with_status(position_id, |s| s.paused = true);
        info!(position_id, "worker paused");
    }

    pub fn resume(&self, position_id: &str) {
        if let Some(worker) = self.inner.workers.lock().expect("workers lock").get(position_id) {
            let _ = worker.command.send(Command::Run);
        }
        self.with_status(position_id, |s| s.paused = false);
        info!(position_id, "worker resumed");
    }

    /// Stop the worker and cancel the position's open broker orders.
    pub async fn stop(&self, position_id: &str) {
        let worker = {
            let mut workers = self.inner.workers.lock().expect("workers lock");
            workers.remove(position_id)
        };
        if let Some(worker) = worker {
            let _ = worker.command.send(Command::Stop);
            self.inner.cancel_open_orders(&worker.position).await;
            worker.handle.abort();
        }
        self.with_status(position_id, |s| {
            s.running = false;
            s.paused = false;
        });
        info!(position_id, "worker stopped");
    }

    pub fn status(&self, position_id: &str) -> Option<WorkerStatus> {
        self.inner
            .statuses
            .lock()
            .expect("statuses lock")
            .get(position_id)
            .map(|s| s.lock().expect("status lock").clone())
    }

    /// Drive exactly one tick for a position (also used by tests to step
    /// deterministically without waiting on the interval).
    pub async fn tick_once(&self, position: &PositionRef) {
        self.inner.run_tick(position).await;
    }

    /// Spawn the periodic broker reconciliation worker.
    pub fn spawn_reconcile_loop(&self) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(inner.config.reconcile_interval).await;
                if let Err(e) =
                    reconcile_open_orders(&inner.engine, &inner.broker, &inner.locks).await
                {
                    warn!(error = %e, "reconcile sweep failed");
                }
            }
        })
    }

    /// One immediate reconciliation sweep.
    pub async fn reconcile_now(&self) -> Result<Decimal, vbl_domain::DomainError> {
        reconcile_open_orders(&self.inner.engine, &self.inner.broker, &self.inner.locks).await
    }

    /// Build alert-check observations for one position from repo state
    /// and worker counters.
    pub fn alert_inputs(&self, position_id: &str) -> AlertInputs {
        let status = self.status(position_id).unwrap_or_default();
        let enabled = self
            .inner
            .workers
            .lock()
            .expect("workers lock")
            .contains_key(position_id);

        let records = self.inner.engine.ports.timeline.list_for_position(position_id);
        let last_evaluation_time = records.iter().map(|r| r.timestamp).max();
        // Every tick reads a price, so the latest row doubles as the
        // freshest price observation.
        let last_price_update = last_evaluation_time;

        const WINDOW: usize = 50;
        let guardrail_skips = records
            .iter()
            .rev()
            .take(WINDOW)
            .filter(|r| r.action == EvalAction::Skip)
            .filter(|r| {
                !matches!(
                    r.block_reason.as_deref(),
                    Some("closed_market")
                        | Some("trading_paused")
                        | Some("price_unavailable")
                        | Some("price_stale")
                )
            })
            .count() as u64;

        let rejections = self
            .inner
            .engine
            .ports
            .orders
            .list_for_position(position_id)
            .iter()
            .filter(|o| o.status == vbl_domain::OrderStatus::Rejected)
            .count() as u64;

        AlertInputs {
            worker_running: status.running,
            worker_enabled: enabled,
            last_evaluation_time,
            is_market_hours: self.inner.engine.ports.market.is_market_hours(),
            recent_order_rejections: rejections,
            recent_guardrail_skips: guardrail_skips,
            last_price_update,
            broker_reachable: status.last_error.as_deref() != Some("broker_unreachable"),
        }
    }

    /// Spawn the periodic alert sweep for one position.
    pub fn spawn_alert_loop(
        &self,
        checker: Arc<AlertChecker>,
        position_id: String,
        interval: Duration,
    ) -> JoinHandle<()> {
        let trader = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let inputs = trader.alert_inputs(&position_id);
                for alert in checker.run_all_checks(&inputs) {
                    warn!(
                        condition = ?alert.condition,
                        severity = ?alert.severity,
                        title = %alert.title,
                        "alert raised"
                    );
                }
            }
        })
    }

    fn with_status(&self, position_id: &str, f: impl FnOnce(&mut WorkerStatus)) {
        let handle = self.inner.status_handle(position_id);
        let mut status = handle.lock().expect("status lock");
        f(&mut status);
    }
}

impl Inner {
    fn status_handle(&self, position_id: &str) -> Arc<StdMutex<WorkerStatus>> {
        self.statuses
            .lock()
            .expect("statuses lock")
            .entry(position_id.to_string())
            .or_default()
            .clone()
    }

    async fn worker_loop(self: &Arc<Self>, position: PositionRef, mut command: watch::Receiver<Command>) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                changed = command.changed() => {
                    if changed.is_err() || *command.borrow() == Command::Stop {
                        break;
                    }
                }
                _ = interval.tick() => {
                    let cmd = *command.borrow();
                    match cmd {
                        Command::Stop => break,
                        Command::Pause => continue,
                        Command::Run => self.run_tick(&position).await,
                    }
                }
            }
        }
        let handle = self.status_handle(&position.position_id);
        handle.lock().expect("status lock").running = false;
    }

    /// One evaluation tick, serialized on the position lock when it may
    /// mutate.
    async fn run_tick(self: &Arc<Self>, position: &PositionRef) {
        let status = self.status_handle(&position.position_id);
        let now = self.engine.ports.clock.now();
        status.lock().expect("status lock").record_check(now);

        // Portfolio gate: only RUNNING portfolios evaluate.
        let portfolio = match self
            .engine
            .ports
            .portfolios
            .get(&position.tenant_id, &position.portfolio_id)
        {
            Some(p) => p,
            None => {
                status
                    .lock()
                    .expect("status lock")
                    .record_error("portfolio_not_found");
                return;
            }
        };
        if !portfolio.is_trading_enabled() {
            self.append_gate_skip(position, "trading_paused");
            return;
        }

        // Hours gate: extended-session trading needs both the portfolio
        // policy and the position's order policy to allow it.
        let is_open = self.engine.ports.market.is_market_hours();
        if !is_open {
            let after_hours_allowed = portfolio.trading_hours_policy
                == TradingHoursPolicy::Extended
                && self
                    .engine
                    .ports
                    .configs
                    .order_policy(
                        &position.tenant_id,
                        &position.portfolio_id,
                        &position.position_id,
                    )
                    .map(|p| p.allow_after_hours)
                    .unwrap_or(false);
            if !after_hours_allowed {
                self.append_gate_skip(position, "closed_market");
                return;
            }
        }

        let lock = self.locks.for_position(&position.position_id);
        let _guard = lock.lock().await;

        let mut trace = TraceContext::root(self.engine.ports.ids.as_ref());
        let outcome = match self.engine.evaluate.evaluate(
            &position.tenant_id,
            &position.portfolio_id,
            &position.position_id,
            EvalMode::Live,
            None,
            &mut trace,
        ) {
            Ok(o) => o,
            Err(e) => {
                warn!(position_id = %position.position_id, error = %e, "tick failed");
                status.lock().expect("status lock").record_error(e.code());
                return;
            }
        };

        let Some(proposal) = outcome.proposal.clone() else {
            return; // HOLD/SKIP rows were appended by the use case.
        };
        let mut record = outcome.record;

        // Submission: the trace id doubles as the idempotency key, so a
        // crashed-and-retried tick cannot create a duplicate order.
        let idempotency_key = trace.trace_id.clone();
        let submitted = self.engine.submit.submit(
            &position.tenant_id,
            &position.portfolio_id,
            &position.position_id,
            &SubmitRequestBody {
                side: proposal.side,
                qty: proposal.qty,
            },
            &idempotency_key,
            &mut trace,
        );

        match submitted {
            Ok(result) => {
                record.order_id = Some(result.order_id.clone());
                self.dispatch_to_broker(position, &result.order_id, &mut trace)
                    .await;
            }
            Err(e) => {
                record.action = EvalAction::Skip;
                record.allowed = false;
                record.block_reason = Some(e.code().to_string());
                status.lock().expect("status lock").record_error(e.code());
            }
        }
        self.engine.evaluate.append_record(record);
    }

    /// Hand a persisted order to the broker and converge any synchronous
    /// fill. Called with the position lock held.
    async fn dispatch_to_broker(
        self: &Arc<Self>,
        position: &PositionRef,
        order_id: &str,
        trace: &mut TraceContext,
    ) {
        let status = self.status_handle(&position.position_id);
        let Some(order) = self.engine.ports.orders.get(order_id) else {
            return;
        };
        let Some(pos) = self.engine.ports.positions.get(
            &position.tenant_id,
            &position.portfolio_id,
            &position.position_id,
        ) else {
            return;
        };

        let request = SubmitRequest {
            order_id: order.id.clone(),
            symbol: pos.asset_symbol.clone(),
            side: order.side,
            qty: order.qty,
            commission_snapshot: order.commission_rate_snapshot,
        };
        let broker = self.broker.clone();
        let ack = self
            .config
            .retry
            .run("broker_submit", || broker.submit(&request))
            .await;

        match ack {
            Ok(ack) => {
                let mut order = self
                    .engine
                    .ports
                    .orders
                    .get(order_id)
                    .expect("order persisted");
                order.broker_order_id = Some(ack.broker_order_id.clone());
                order.broker_status = Some(ack.status.as_str().to_string());
                let now = self.engine.ports.clock.now();
                let local = match ack.status {
                    BrokerStatus::Pending => Some(vbl_domain::OrderStatus::Pending),
                    BrokerStatus::Working => Some(vbl_domain::OrderStatus::Working),
                    BrokerStatus::Rejected => Some(vbl_domain::OrderStatus::Rejected),
                    BrokerStatus::Cancelled => Some(vbl_domain::OrderStatus::Cancelled),
                    // Fill progress converges below.
                    BrokerStatus::Partial | BrokerStatus::Filled => None,
                };
                if let Some(target) = local {
                    if let Err(e) = order.transition(target, now) {
                        warn!(order_id, error = %e, "broker ack status not applicable");
                    }
                }
                self.engine.ports.orders.save(order);

                if let Err(e) = converge_order(&self.engine, &self.broker, order_id, trace) {
                    warn!(order_id, error = %e, "post-ack convergence failed");
                } else if self
                    .engine
                    .ports
                    .orders
                    .get(order_id)
                    .map(|o| o.filled_qty > Decimal::ZERO)
                    .unwrap_or(false)
                {
                    status.lock().expect("status lock").record_trade();
                }
            }
            Err(e) => {
                warn!(order_id, error = %e, "broker submission failed");
                status.lock().expect("status lock").record_error(e.code());
                let ev = EventRecord::new(
                    // Event id from the shared generator keeps audit ids unique.
                    self.engine.ports.ids.event_id(),
                    EventType::BrokerError,
                    trace.trace_id.clone(),
                    "live",
                    format!("broker submission failed: {e}"),
                    json!({"order_id": order_id, "reason": e.code()}),
                    self.engine.ports.clock.now(),
                )
                .with_scope(
                    &position.tenant_id,
                    &position.portfolio_id,
                    &position.position_id,
                );
                let _ = self.engine.ports.events.append(trace.chain(ev));
            }
        }
    }

    /// Fill router: resolve the position, take its lock, converge.
    async fn handle_fill(self: &Arc<Self>, notification: FillNotification) {
        let Some(order) = self.engine.ports.orders.get(&notification.order_id) else {
            warn!(order_id = %notification.order_id, "fill for unknown order");
            return;
        };
        let lock = self.locks.for_position(&order.position_id);
        let _guard = lock.lock().await;

        let mut trace = TraceContext::root(self.engine.ports.ids.as_ref());
        match converge_order(&self.engine, &self.broker, &order.id, &mut trace) {
            Ok(applied) if applied > Decimal::ZERO => {
                let status = self.status_handle(&order.position_id);
                status.lock().expect("status lock").record_trade();
            }
            Ok(_) => {}
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "fill convergence failed");
                let status = self.status_handle(&order.position_id);
                status.lock().expect("status lock").record_error(e.code());
            }
        }
    }

    /// Timeline row for ticks blocked before evaluation (paused portfolio
    /// or closed market).
    fn append_gate_skip(self: &Arc<Self>, position: &PositionRef, reason: &str) {
        let Some(pos) = self.engine.ports.positions.get(
            &position.tenant_id,
            &position.portfolio_id,
            &position.position_id,
        ) else {
            return;
        };
        let trigger = self
            .engine
            .ports
            .configs
            .trigger_config(&position.tenant_id, &position.portfolio_id, &position.position_id)
            .unwrap_or_default();
        let guardrail = self
            .engine
            .ports
            .configs
            .guardrail_config(&position.tenant_id, &position.portfolio_id, &position.position_id)
            .unwrap_or_default();

        let mut record = EvaluationRecord::base(
            self.engine.ports.ids.record_id(),
            EvalMode::Live,
            self.engine.ports.clock.now(),
            self.engine.ports.ids.trace_id(),
            &pos,
            pos.anchor_price.unwrap_or(Decimal::ZERO),
            trigger.tau_up,
            trigger.tau_down,
            guardrail.min_stock_pct,
            guardrail.max_stock_pct,
        );
        record.action = EvalAction::Skip;
        record.allowed = false;
        record.block_reason = Some(reason.to_string());
        record.trigger_reason = reason.to_string();
        self.engine.ports.timeline.append(record);
    }

    /// Cancel the position's in-flight broker orders (Stop semantics) and
    /// record the aborted schedule on the audit log.
    async fn cancel_open_orders(self: &Arc<Self>, position: &PositionRef) {
        let lock = self.locks.for_position(&position.position_id);
        let _guard = lock.lock().await;
        let now = self.engine.ports.clock.now();

        let mut trace = TraceContext::root(self.engine.ports.ids.as_ref());
        let ev = EventRecord::new(
            self.engine.ports.ids.event_id(),
            EventType::TickCancelled,
            trace.trace_id.clone(),
            "live",
            "worker stopped; open orders cancelled".to_string(),
            json!({"position_id": position.position_id}),
            now,
        )
        .with_scope(
            &position.tenant_id,
            &position.portfolio_id,
            &position.position_id,
        );
        let _ = self.engine.ports.events.append(trace.chain(ev));

        let open = self.engine.ports.orders.list_by_status(OPEN_STATUSES);
        for mut order in open
            .into_iter()
            .filter(|o| o.position_id == position.position_id)
        {
            if let Some(broker_order_id) = order.broker_order_id.clone() {
                match self.broker.cancel(&broker_order_id) {
                    Ok(status) => {
                        order.broker_status = Some(status.as_str().to_string());
                    }
                    Err(e) => {
                        warn!(order_id = %order.id, error = %e, "broker cancel failed");
                        continue;
                    }
                }
            }
            if order
                .transition(vbl_domain::OrderStatus::Cancelled, now)
                .is_ok()
            {
                self.engine.ports.orders.save(order);
            }
        }
    }
}
