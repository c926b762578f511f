//! Per-position serialization locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Lazily created async mutexes keyed by `position_id`.
///
/// Holding the position's lock is the contract for every mutating flow
/// (tick with submission, fill application, reconciliation, dividend
/// application); pure reads may skip it.
#[derive(Default)]
pub struct PositionLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PositionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for one position, created on first use.
    pub fn for_position(&self, position_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().expect("position locks poisoned");
        map.entry(position_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}
