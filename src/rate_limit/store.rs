//! Trigger Store
//!
//! Storage for the last time each client fired a lead-engagement event.
//! The limiter owns the store behind a mutex, so implementations need no
//! internal synchronization.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Storage seam for rate-limit timestamps
///
/// The default `MemoryTriggerStore` grows with the number of distinct
/// clients; `purge_before` lets a sweeper bound it.
pub trait TriggerStore: Send {
    /// Last trigger time for a client
    fn get(&self, client_id: &str) -> Option<DateTime<Utc>>;

    /// Record a trigger time for a client
    fn set(&mut self, client_id: &str, at: DateTime<Utc>);

    /// Drop entries last triggered before `cutoff`, returning how many were removed
    fn purge_before(&mut self, cutoff: DateTime<Utc>) -> usize;

    /// Number of tracked clients
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory trigger store
#[derive(Debug, Clone, Default)]
pub struct MemoryTriggerStore {
    entries: HashMap<String, DateTime<Utc>>,
}

impl MemoryTriggerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TriggerStore for MemoryTriggerStore {
    fn get(&self, client_id: &str) -> Option<DateTime<Utc>> {
        self.entries.get(client_id).copied()
    }

    fn set(&mut self, client_id: &str, at: DateTime<Utc>) {
        self.entries.insert(client_id.to_string(), at);
    }

    fn purge_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, at| *at >= cutoff);
        before - self.entries.len()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
