//! Thread-safe in-memory repositories.
//!
//! Backing maps are `BTreeMap` so listings iterate deterministically.
//! Locks are held only for the duration of a single call; values are
//! cloned out, never borrowed out.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use vbl_domain::{
    EvaluationRecord, EventRecord, GuardrailConfig, Order, OrderPolicyConfig, OrderStatus,
    Portfolio, Position, Trade, TriggerConfig,
};

use crate::traits::{
    ConfigRepo, EventsRepo, IdempotencyRepo, OrdersRepo, PortfoliosRepo, PositionsRepo,
    Reservation, StoreError, TimelineRepo, TradesRepo,
};

fn scope_key(tenant_id: &str, portfolio_id: &str, id: &str) -> String {
    format!("{tenant_id}/{portfolio_id}/{id}")
}

// ---------------------------------------------------------------------------
// Positions / portfolios
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryPositionsRepo {
    inner: RwLock<BTreeMap<String, Position>>,
}

impl InMemoryPositionsRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PositionsRepo for InMemoryPositionsRepo {
    fn get(&self, tenant_id: &str, portfolio_id: &str, position_id: &str) -> Option<Position> {
        self.inner
            .read()
            .expect("positions lock poisoned")
            .get(&scope_key(tenant_id, portfolio_id, position_id))
            .cloned()
    }

    fn save(&self, position: Position) {
        let key = scope_key(&position.tenant_id, &position.portfolio_id, &position.id);
        self.inner
            .write()
            .expect("positions lock poisoned")
            .insert(key, position);
    }

    fn list(&self) -> Vec<Position> {
        self.inner
            .read()
            .expect("positions lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}

#[derive(Default)]
pub struct InMemoryPortfoliosRepo {
    inner: RwLock<BTreeMap<String, Portfolio>>,
}

impl InMemoryPortfoliosRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PortfoliosRepo for InMemoryPortfoliosRepo {
    fn get(&self, tenant_id: &str, portfolio_id: &str) -> Option<Portfolio> {
        self.inner
            .read()
            .expect("portfolios lock poisoned")
            .get(&format!("{tenant_id}/{portfolio_id}"))
            .cloned()
    }

    fn save(&self, portfolio: Portfolio) {
        let key = format!("{}/{}", portfolio.tenant_id, portfolio.id);
        self.inner
            .write()
            .expect("portfolios lock poisoned")
            .insert(key, portfolio);
    }
}

// ---------------------------------------------------------------------------
// Orders / trades
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryOrdersRepo {
    inner: RwLock<BTreeMap<String, Order>>,
}

impl InMemoryOrdersRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrdersRepo for InMemoryOrdersRepo {
    fn get(&self, order_id: &str) -> Option<Order> {
        self.inner
            .read()
            .expect("orders lock poisoned")
            .get(order_id)
            .cloned()
    }

    fn save(&self, order: Order) {
        self.inner
            .write()
            .expect("orders lock poisoned")
            .insert(order.id.clone(), order);
    }

    fn list_for_position(&self, position_id: &str) -> Vec<Order> {
        self.inner
            .read()
            .expect("orders lock poisoned")
            .values()
            .filter(|o| o.position_id == position_id)
            .cloned()
            .collect()
    }

    fn count_for_position_on_day(&self, position_id: &str, date_utc: NaiveDate) -> usize {
        self.inner
            .read()
            .expect("orders lock poisoned")
            .values()
            .filter(|o| o.position_id == position_id && o.created_at.date_naive() == date_utc)
            .count()
    }

    fn list_by_status(&self, statuses: &[OrderStatus]) -> Vec<Order> {
        self.inner
            .read()
            .expect("orders lock poisoned")
            .values()
            .filter(|o| statuses.contains(&o.status))
            .cloned()
            .collect()
    }
}

#[derive(Default)]
pub struct InMemoryTradesRepo {
    inner: RwLock<Vec<Trade>>,
}

impl InMemoryTradesRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TradesRepo for InMemoryTradesRepo {
    fn save(&self, trade: Trade) {
        self.inner.write().expect("trades lock poisoned").push(trade);
    }

    fn list_for_order(&self, order_id: &str) -> Vec<Trade> {
        self.inner
            .read()
            .expect("trades lock poisoned")
            .iter()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect()
    }

    fn list_for_position(&self, position_id: &str) -> Vec<Trade> {
        self.inner
            .read()
            .expect("trades lock poisoned")
            .iter()
            .filter(|t| t.position_id == position_id)
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Events / timeline
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryEventsRepo {
    inner: RwLock<Vec<EventRecord>>,
}

impl InMemoryEventsRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<EventRecord> {
        self.inner.read().expect("events lock poisoned").clone()
    }
}

impl EventsRepo for InMemoryEventsRepo {
    fn append(&self, event: EventRecord) -> Result<(), StoreError> {
        self.inner.write().expect("events lock poisoned").push(event);
        Ok(())
    }

    fn list_by_trace(&self, trace_id: &str) -> Vec<EventRecord> {
        self.inner
            .read()
            .expect("events lock poisoned")
            .iter()
            .filter(|e| e.trace_id == trace_id)
            .cloned()
            .collect()
    }

    fn list_for_position(&self, position_id: &str) -> Vec<EventRecord> {
        self.inner
            .read()
            .expect("events lock poisoned")
            .iter()
            .filter(|e| e.position_id.as_deref() == Some(position_id))
            .cloned()
            .collect()
    }

    fn len(&self) -> usize {
        self.inner.read().expect("events lock poisoned").len()
    }
}

#[derive(Default)]
pub struct InMemoryTimelineRepo {
    inner: RwLock<Vec<EvaluationRecord>>,
}

impl InMemoryTimelineRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimelineRepo for InMemoryTimelineRepo {
    fn append(&self, record: EvaluationRecord) {
        self.inner.write().expect("timeline lock poisoned").push(record);
    }

    fn list_for_position(&self, position_id: &str) -> Vec<EvaluationRecord> {
        self.inner
            .read()
            .expect("timeline lock poisoned")
            .iter()
            .filter(|r| r.position_id == position_id)
            .cloned()
            .collect()
    }

    fn list_all(&self) -> Vec<EvaluationRecord> {
        self.inner.read().expect("timeline lock poisoned").clone()
    }

    fn len(&self) -> usize {
        self.inner.read().expect("timeline lock poisoned").len()
    }
}

// ---------------------------------------------------------------------------
// Idempotency
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct IdemEntry {
    signature: String,
    order_id: Option<String>,
}

#[derive(Default)]
pub struct InMemoryIdempotencyRepo {
    inner: RwLock<BTreeMap<String, IdemEntry>>,
}

impl InMemoryIdempotencyRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn scoped(position_id: &str, key: &str) -> String {
        format!("{position_id}:{key}")
    }
}

impl IdempotencyRepo for InMemoryIdempotencyRepo {
    fn reserve(&self, position_id: &str, key: &str, signature: &str) -> Reservation {
        let mut map = self.inner.write().expect("idempotency lock poisoned");
        let scoped = Self::scoped(position_id, key);
        match map.get(&scoped) {
            None => {
                map.insert(
                    scoped,
                    IdemEntry {
                        signature: signature.to_string(),
                        order_id: None,
                    },
                );
                Reservation::Fresh
            }
            Some(entry) if entry.signature != signature => Reservation::Conflict,
            Some(entry) => match &entry.order_id {
                Some(order_id) => Reservation::Replay {
                    order_id: order_id.clone(),
                },
                // Reserved but never completed (in-flight retry).
                None => Reservation::Fresh,
            },
        }
    }

    fn complete(&self, position_id: &str, key: &str, signature: &str, order_id: &str) {
        let mut map = self.inner.write().expect("idempotency lock poisoned");
        map.insert(
            Self::scoped(position_id, key),
            IdemEntry {
                signature: signature.to_string(),
                order_id: Some(order_id.to_string()),
            },
        );
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ConfigTables {
    trigger: BTreeMap<String, TriggerConfig>,
    guardrail: BTreeMap<String, GuardrailConfig>,
    order_policy: BTreeMap<String, OrderPolicyConfig>,
    commission: BTreeMap<String, Decimal>,
}

/// In-memory config tables with per-position entries and optional
/// tenant/asset commission overrides.
#[derive(Default)]
pub struct InMemoryConfigRepo {
    inner: RwLock<ConfigTables>,
}

impl InMemoryConfigRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the full config set for one position in one call.
    pub fn put_position_configs(
        &self,
        tenant_id: &str,
        portfolio_id: &str,
        position_id: &str,
        trigger: TriggerConfig,
        guardrail: GuardrailConfig,
        order_policy: OrderPolicyConfig,
    ) {
        let key = scope_key(tenant_id, portfolio_id, position_id);
        let mut tables = self.inner.write().expect("config lock poisoned");
        tables.trigger.insert(key.clone(), trigger);
        tables.guardrail.insert(key.clone(), guardrail);
        tables.order_policy.insert(key, order_policy);
    }

    pub fn put_commission_rate(&self, tenant_id: &str, asset_symbol: &str, rate: Decimal) {
        self.inner
            .write()
            .expect("config lock poisoned")
            .commission
            .insert(format!("{tenant_id}/{asset_symbol}"), rate);
    }
}

impl ConfigRepo for InMemoryConfigRepo {
    fn trigger_config(
        &self,
        tenant_id: &str,
        portfolio_id: &str,
        position_id: &str,
    ) -> Option<TriggerConfig> {
        self.inner
            .read()
            .expect("config lock poisoned")
            .trigger
            .get(&scope_key(tenant_id, portfolio_id, position_id))
            .cloned()
    }

    fn guardrail_config(
        &self,
        tenant_id: &str,
        portfolio_id: &str,
        position_id: &str,
    ) -> Option<GuardrailConfig> {
        self.inner
            .read()
            .expect("config lock poisoned")
            .guardrail
            .get(&scope_key(tenant_id, portfolio_id, position_id))
            .cloned()
    }

    fn order_policy(
        &self,
        tenant_id: &str,
        portfolio_id: &str,
        position_id: &str,
    ) -> Option<OrderPolicyConfig> {
        self.inner
            .read()
            .expect("config lock poisoned")
            .order_policy
            .get(&scope_key(tenant_id, portfolio_id, position_id))
            .cloned()
    }

    fn commission_rate(&self, tenant_id: &str, asset_symbol: &str) -> Option<Decimal> {
        self.inner
            .read()
            .expect("config lock poisoned")
            .commission
            .get(&format!("{tenant_id}/{asset_symbol}"))
            .copied()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use vbl_domain::OrderSide;

    fn t0() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap()
    }

    fn order(id: &str, position_id: &str, created_at: chrono::DateTime<Utc>) -> Order {
        let mut o = Order::new(
            id, "t1", "pf1", position_id,
            OrderSide::Buy, dec!(1), "K", "sig", Decimal::ZERO, created_at,
        )
        .unwrap();
        o.created_at = created_at;
        o
    }

    #[test]
    fn positions_roundtrip_by_scope() {
        let repo = InMemoryPositionsRepo::new();
        let p = Position::new("pos1", "t1", "pf1", "AAPL", dec!(1000), t0()).unwrap();
        repo.save(p.clone());
        assert_eq!(repo.get("t1", "pf1", "pos1"), Some(p));
        assert_eq!(repo.get("t2", "pf1", "pos1"), None);
    }

    #[test]
    fn daily_order_count_uses_utc_date() {
        let repo = InMemoryOrdersRepo::new();
        // 23:30 UTC Jan 2 and 00:30 UTC Jan 3 are different cap days.
        repo.save(order("o1", "pos1", Utc.with_ymd_and_hms(2024, 1, 2, 23, 30, 0).unwrap()));
        repo.save(order("o2", "pos1", Utc.with_ymd_and_hms(2024, 1, 3, 0, 30, 0).unwrap()));
        let jan2 = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let jan3 = chrono::NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        assert_eq!(repo.count_for_position_on_day("pos1", jan2), 1);
        assert_eq!(repo.count_for_position_on_day("pos1", jan3), 1);
        assert_eq!(repo.count_for_position_on_day("pos2", jan2), 0);
    }

    #[test]
    fn idempotency_reserve_replay_conflict() {
        let repo = InMemoryIdempotencyRepo::new();
        assert_eq!(repo.reserve("pos1", "K", "sig-a"), Reservation::Fresh);
        // In-flight retry with same signature stays fresh.
        assert_eq!(repo.reserve("pos1", "K", "sig-a"), Reservation::Fresh);
        repo.complete("pos1", "K", "sig-a", "ord_1");
        assert_eq!(
            repo.reserve("pos1", "K", "sig-a"),
            Reservation::Replay { order_id: "ord_1".into() }
        );
        assert_eq!(repo.reserve("pos1", "K", "sig-b"), Reservation::Conflict);
        // Same key on a different position is independent.
        assert_eq!(repo.reserve("pos2", "K", "sig-b"), Reservation::Fresh);
    }

    #[test]
    fn config_repo_resolves_per_position() {
        let repo = InMemoryConfigRepo::new();
        assert!(repo.trigger_config("t1", "pf1", "pos1").is_none());
        repo.put_position_configs(
            "t1", "pf1", "pos1",
            TriggerConfig::default(),
            GuardrailConfig::default(),
            OrderPolicyConfig::default(),
        );
        assert!(repo.trigger_config("t1", "pf1", "pos1").is_some());
        assert!(repo.guardrail_config("t1", "pf1", "pos1").is_some());
        assert!(repo.order_policy("t1", "pf1", "pos1").is_some());
        repo.put_commission_rate("t1", "AAPL", dec!(0.0001));
        assert_eq!(repo.commission_rate("t1", "AAPL"), Some(dec!(0.0001)));
    }

    #[test]
    fn events_filter_by_trace_and_position() {
        let repo = InMemoryEventsRepo::new();
        let ev = EventRecord::new(
            "evt_1",
            vbl_domain::EventType::OrderCreated,
            "trace-1",
            "engine",
            "order created",
            serde_json::json!({}),
            t0(),
        )
        .with_scope("t1", "pf1", "pos1");
        repo.append(ev).unwrap();
        assert_eq!(repo.list_by_trace("trace-1").len(), 1);
        assert_eq!(repo.list_for_position("pos1").len(), 1);
        assert_eq!(repo.list_for_position("pos2").len(), 0);
    }
}
