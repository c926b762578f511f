//! Identifier generation behind a port.
//!
//! Live wiring uses random UUIDs; the simulation engine injects a
//! counter-based generator so identical runs produce identical ids (and
//! therefore bit-identical serialized output).

use std::sync::Mutex;
use uuid::Uuid;

pub trait IdGen: Send + Sync {
    fn order_id(&self) -> String;
    fn trade_id(&self) -> String;
    fn event_id(&self) -> String;
    fn record_id(&self) -> String;
    fn trace_id(&self) -> String;
}

/// Random ids with short recognizable prefixes (`ord_`, `trd_`, …).
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGen;

impl UuidIdGen {
    fn short() -> String {
        let id = Uuid::new_v4().simple().to_string();
        id[..8].to_string()
    }
}

impl IdGen for UuidIdGen {
    fn order_id(&self) -> String {
        format!("ord_{}", Self::short())
    }

    fn trade_id(&self) -> String {
        format!("trd_{}", Self::short())
    }

    fn event_id(&self) -> String {
        format!("evt_{}", Self::short())
    }

    fn record_id(&self) -> String {
        format!("rec_{}", Self::short())
    }

    fn trace_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic sequential ids (`ORD-000001`, `TRD-000001`, …).
#[derive(Debug, Default)]
pub struct SeqIdGen {
    counters: Mutex<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    order: u64,
    trade: u64,
    event: u64,
    record: u64,
    trace: u64,
}

impl SeqIdGen {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGen for SeqIdGen {
    fn order_id(&self) -> String {
        let mut c = self.counters.lock().expect("id counters poisoned");
        c.order += 1;
        format!("ORD-{:06}", c.order)
    }

    fn trade_id(&self) -> String {
        let mut c = self.counters.lock().expect("id counters poisoned");
        c.trade += 1;
        format!("TRD-{:06}", c.trade)
    }

    fn event_id(&self) -> String {
        let mut c = self.counters.lock().expect("id counters poisoned");
        c.event += 1;
        format!("EVT-{:06}", c.event)
    }

    fn record_id(&self) -> String {
        let mut c = self.counters.lock().expect("id counters poisoned");
        c.record += 1;
        format!("REC-{:06}", c.record)
    }

    fn trace_id(&self) -> String {
        let mut c = self.counters.lock().expect("id counters poisoned");
        c.trace += 1;
        format!("TRACE-{:06}", c.trace)
    }
}
