//! Audit event records.
//!
//! Events are append-only facts correlated by `trace_id` (one id per
//! evaluation tick or API request) and chained by `parent_event_id` into a
//! causal forest. They are never mutated after emission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PriceEvent,
    TriggerEvaluated,
    GuardrailEvaluated,
    OrderCreated,
    OrderSubmitted,
    FillRejectedBelowMin,
    FillSkippedBelowMin,
    FillRejectedInsufficientQty,
    GuardrailBreach,
    ExecutionRecorded,
    PositionUpdated,
    DividendPaid,
    AnchorReset,
    AnomalyDetected,
    TickCancelled,
    BrokerError,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PriceEvent => "price_event",
            Self::TriggerEvaluated => "trigger_evaluated",
            Self::GuardrailEvaluated => "guardrail_evaluated",
            Self::OrderCreated => "order_created",
            Self::OrderSubmitted => "order_submitted",
            Self::FillRejectedBelowMin => "fill_rejected_below_min",
            Self::FillSkippedBelowMin => "fill_skipped_below_min",
            Self::FillRejectedInsufficientQty => "fill_rejected_insufficient_qty",
            Self::GuardrailBreach => "guardrail_breach",
            Self::ExecutionRecorded => "execution_recorded",
            Self::PositionUpdated => "position_updated",
            Self::DividendPaid => "dividend_paid",
            Self::AnchorReset => "anchor_reset",
            Self::AnomalyDetected => "anomaly_detected",
            Self::TickCancelled => "tick_cancelled",
            Self::BrokerError => "broker_error",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit event. `payload` is typed by `event_type`; scope ids are
/// optional because not every event belongs to a position (e.g. worker
/// lifecycle events).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: String,
    pub created_at: DateTime<Utc>,
    pub event_type: EventType,
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portfolio_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_id: Option<String>,
    /// Emitting component (`engine`, `live`, `simulation`, `reconcile`).
    pub source: String,
    pub message: String,
    pub payload: Value,
}

impl EventRecord {
    /// Builder-style constructor; scope ids attach via [`with_scope`](Self::with_scope).
    pub fn new(
        event_id: impl Into<String>,
        event_type: EventType,
        trace_id: impl Into<String>,
        source: impl Into<String>,
        message: impl Into<String>,
        payload: Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            created_at,
            event_type,
            trace_id: trace_id.into(),
            parent_event_id: None,
            tenant_id: None,
            portfolio_id: None,
            asset_id: None,
            position_id: None,
            source: source.into(),
            message: message.into(),
            payload,
        }
    }

    pub fn with_scope(
        mut self,
        tenant_id: impl Into<String>,
        portfolio_id: impl Into<String>,
        position_id: impl Into<String>,
    ) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self.portfolio_id = Some(portfolio_id.into());
        self.position_id = Some(position_id.into());
        self
    }

    pub fn with_asset(mut self, asset_id: impl Into<String>) -> Self {
        self.asset_id = Some(asset_id.into());
        self
    }

    pub fn caused_by(mut self, parent_event_id: impl Into<String>) -> Self {
        self.parent_event_id = Some(parent_event_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn roundtrips_through_json() {
        let ev = EventRecord::new(
            "evt_1",
            EventType::AnchorReset,
            "trace-1",
            "engine",
            "anchor reset",
            json!({"old": "48", "new": "50", "reason": "post_fill"}),
            Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap(),
        )
        .with_scope("t1", "pf1", "pos1")
        .with_asset("AAPL");

        let s = serde_json::to_string(&ev).unwrap();
        assert!(s.contains("\"anchor_reset\""));
        let back: EventRecord = serde_json::from_str(&s).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn parent_link_forms_causal_edge() {
        let ev = EventRecord::new(
            "evt_2",
            EventType::OrderCreated,
            "trace-1",
            "engine",
            "order created",
            json!({}),
            Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 1).unwrap(),
        )
        .caused_by("evt_1");
        assert_eq!(ev.parent_event_id.as_deref(), Some("evt_1"));
    }
}
