//! Trace propagation: one id per tick or API request, causal chaining
//! between the events it emits.

use vbl_domain::EventRecord;

use crate::ids::IdGen;

/// Mutable per-tick trace state. Every event routed through
/// [`chain`](Self::chain) is stamped with the trace id and linked to the
/// previously emitted event, forming a causal path through the tick.
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
    last_event_id: Option<String>,
}

impl TraceContext {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            last_event_id: None,
        }
    }

    /// Fresh root trace (no parent).
    pub fn root(ids: &dyn IdGen) -> Self {
        Self::new(ids.trace_id())
    }

    /// Stamp `event` with this trace and link it to the previous event.
    pub fn chain(&mut self, mut event: EventRecord) -> EventRecord {
        event.trace_id = self.trace_id.clone();
        if event.parent_event_id.is_none() {
            event.parent_event_id = self.last_event_id.clone();
        }
        self.last_event_id = Some(event.event_id.clone());
        event
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use vbl_domain::EventType;

    fn event(id: &str) -> EventRecord {
        EventRecord::new(
            id,
            EventType::TriggerEvaluated,
            "overwritten",
            "engine",
            "",
            json!({}),
            Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap(),
        )
    }

    #[test]
    fn chains_events_into_a_causal_path() {
        let mut trace = TraceContext::new("trace-1");
        let first = trace.chain(event("evt_1"));
        let second = trace.chain(event("evt_2"));

        assert_eq!(first.trace_id, "trace-1");
        assert_eq!(first.parent_event_id, None);
        assert_eq!(second.parent_event_id.as_deref(), Some("evt_1"));
        assert_eq!(trace.last_event_id(), Some("evt_2"));
    }

    #[test]
    fn explicit_parent_wins() {
        let mut trace = TraceContext::new("trace-1");
        trace.chain(event("evt_1"));
        let ev = trace.chain(event("evt_2").caused_by("evt_0"));
        assert_eq!(ev.parent_event_id.as_deref(), Some("evt_0"));
    }
}
