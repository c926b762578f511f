//! Explainability timeline: evaluations joined with orders and trades.
//!
//! One schema serves both live and simulated rows, so a discrepancy
//! between what the algorithm decided and what actually executed is
//! always visible in a single view.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use vbl_domain::{EvalAction, EvaluationRecord, OrderStatus};
use vbl_store::{OrdersRepo, TimelineRepo, TradesRepo};

/// Hard cap on page size.
pub const MAX_LIMIT: usize = 2000;

/// Execution completeness derived from the joined order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    Filled,
    Partial,
    None,
}

/// One denormalized timeline row: the evaluation fact enriched with the
/// order's current status and the aggregate of its trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineRow {
    #[serde(flatten)]
    pub record: EvaluationRecord,
    pub order_status: Option<OrderStatus>,
    pub broker_order_id: Option<String>,
    pub broker_status: Option<String>,
    pub execution_status: ExecutionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Per UTC day: all action rows when any exist, else the first HOLD.
    Daily,
    /// Every row.
    All,
}

/// Filter + pagination parameters.
#[derive(Debug, Clone)]
pub struct TimelineQuery {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub actions: Option<Vec<EvalAction>>,
    pub order_statuses: Option<Vec<OrderStatus>>,
    pub aggregation: Aggregation,
    pub offset: usize,
    pub limit: usize,
}

impl Default for TimelineQuery {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            actions: None,
            order_statuses: None,
            aggregation: Aggregation::Daily,
            offset: 0,
            limit: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub rows: Vec<TimelineRow>,
    /// Row count before filtering/aggregation.
    pub total_rows: usize,
    /// Row count after filtering and aggregation, before pagination.
    pub filtered_rows: usize,
    pub offset: usize,
    pub limit: usize,
    pub position_id: String,
}

/// Builds timelines from the stored evaluation records plus the order and
/// trade repositories.
pub struct TimelineService {
    timeline: Arc<dyn TimelineRepo>,
    orders: Arc<dyn OrdersRepo>,
    trades: Arc<dyn TradesRepo>,
}

impl TimelineService {
    pub fn new(
        timeline: Arc<dyn TimelineRepo>,
        orders: Arc<dyn OrdersRepo>,
        trades: Arc<dyn TradesRepo>,
    ) -> Self {
        Self {
            timeline,
            orders,
            trades,
        }
    }

    /// Build the timeline view for one position.
    pub fn build_for_position(&self, position_id: &str, query: &TimelineQuery) -> Timeline {
        let records = self.timeline.list_for_position(position_id);
        let total_rows = records.len();

        let enriched: Vec<TimelineRow> = records.into_iter().map(|r| self.enrich(r)).collect();
        let filtered = filter_rows(enriched, query);
        let aggregated = match query.aggregation {
            Aggregation::Daily => aggregate_daily(filtered),
            Aggregation::All => filtered,
        };
        let filtered_rows = aggregated.len();

        // Newest first.
        let mut sorted = aggregated;
        sorted.sort_by(|a, b| b.record.timestamp.cmp(&a.record.timestamp));

        let limit = query.limit.clamp(1, MAX_LIMIT);
        let rows: Vec<TimelineRow> = sorted.into_iter().skip(query.offset).take(limit).collect();

        Timeline {
            rows,
            total_rows,
            filtered_rows,
            offset: query.offset,
            limit,
            position_id: position_id.to_string(),
        }
    }

    /// Join one record with its order and trade aggregates.
    fn enrich(&self, mut record: EvaluationRecord) -> TimelineRow {
        let mut order_status = None;
        let mut broker_order_id = None;
        let mut broker_status = None;
        let mut execution_status = ExecutionStatus::None;

        if let Some(order_id) = record.order_id.clone() {
            if let Some(order) = self.orders.get(&order_id) {
                order_status = Some(order.status);
                broker_order_id = order.broker_order_id.clone();
                broker_status = order.broker_status.clone();

                let trades = self.trades.list_for_order(&order_id);
                if !trades.is_empty() {
                    let qty: Decimal = trades.iter().map(|t| t.qty).sum();
                    let notional: Decimal = trades.iter().map(|t| t.qty * t.price).sum();
                    let commission: Decimal = trades.iter().map(|t| t.commission).sum();
                    let price = notional.checked_div(qty);
                    record.execution_qty = Some(qty);
                    record.execution_price = price;
                    record.execution_value = price.map(|p| p * qty);
                    record.commission = Some(commission);
                }

                execution_status = match order.status {
                    OrderStatus::Filled => ExecutionStatus::Filled,
                    OrderStatus::Partial => ExecutionStatus::Partial,
                    _ if order.filled_qty > Decimal::ZERO => ExecutionStatus::Partial,
                    _ => ExecutionStatus::None,
                };
            }
        }

        TimelineRow {
            record,
            order_status,
            broker_order_id,
            broker_status,
            execution_status,
        }
    }
}

/// Inclusive date range + action set + order-status set.
fn filter_rows(rows: Vec<TimelineRow>, query: &TimelineQuery) -> Vec<TimelineRow> {
    rows.into_iter()
        .filter(|row| {
            if let Some(start) = query.start_date {
                if row.record.timestamp < start {
                    return false;
                }
            }
            if let Some(end) = query.end_date {
                if row.record.timestamp > end {
                    return false;
                }
            }
            if let Some(actions) = &query.actions {
                if !actions.contains(&row.record.action) {
                    return false;
                }
            }
            if let Some(statuses) = &query.order_statuses {
                match row.order_status {
                    Some(status) if statuses.contains(&status) => {}
                    _ => return false,
                }
            }
            true
        })
        .collect()
}

/// Per UTC calendar day: if any action row (BUY/SELL/SKIP) exists, keep
/// all action rows sorted by time; otherwise keep the day's first HOLD.
fn aggregate_daily(rows: Vec<TimelineRow>) -> Vec<TimelineRow> {
    let mut by_date: BTreeMap<NaiveDate, Vec<TimelineRow>> = BTreeMap::new();
    for row in rows {
        by_date
            .entry(row.record.timestamp.date_naive())
            .or_default()
            .push(row);
    }

    let mut out = Vec::new();
    for (_, mut day_rows) in by_date {
        day_rows.sort_by_key(|r| r.record.timestamp);
        let has_action = day_rows.iter().any(|r| r.record.action.is_action());
        if has_action {
            out.extend(day_rows.into_iter().filter(|r| r.record.action.is_action()));
        } else if let Some(first) = day_rows.into_iter().next() {
            out.push(first);
        }
    }
    out
}
