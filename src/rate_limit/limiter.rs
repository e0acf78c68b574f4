//! Lead Trigger Limiter
//!
//! Forwards at most one lead-engagement event per client within a cooldown
//! window.

use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::store::{MemoryTriggerStore, TriggerStore};

/// Default cooldown between forwarded lead events for one client
pub const DEFAULT_LEAD_COOLDOWN: Duration = Duration::from_secs(10 * 60);

/// Per-client cooldown limiter
pub struct LeadTriggerLimiter {
    /// Store guarded for the whole check-and-record
    store: Mutex<Box<dyn TriggerStore>>,

    /// Minimum gap between forwarded events
    cooldown: Duration,
}

impl LeadTriggerLimiter {
    /// Create a limiter over an injected store
    pub fn new(store: Box<dyn TriggerStore>, cooldown: Duration) -> Self {
        Self {
            store: Mutex::new(store),
            cooldown,
        }
    }

    /// Create a limiter backed by a fresh in-memory store
    pub fn in_memory(cooldown: Duration) -> Self {
        Self::new(Box::new(MemoryTriggerStore::new()), cooldown)
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Decide whether `client_id` may fire an event at `now`
    ///
    /// Returns `true` and records `now` when the client has no entry or its
    /// last trigger is at least one cooldown old. Otherwise returns `false`
    /// and leaves the entry untouched. Lookup and write happen under one lock.
    pub fn should_trigger(&self, client_id: &str, now: DateTime<Utc>) -> bool {
        let mut store = self.lock();

        let allowed = match store.get(client_id) {
            None => true,
            // A negative gap (clock moved backwards) counts as still cooling down
            Some(last) => now
                .signed_duration_since(last)
                .to_std()
                .map(|elapsed| elapsed >= self.cooldown)
                .unwrap_or(false),
        };

        if allowed {
            store.set(client_id, now);
        }
        allowed
    }

    /// Remove entries whose cooldown has fully elapsed at `now`
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let cutoff = chrono::Duration::from_std(self.cooldown)
            .ok()
            .and_then(|cooldown| now.checked_sub_signed(cooldown));

        match cutoff {
            Some(cutoff) => self.lock().purge_before(cutoff),
            None => 0,
        }
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn TriggerStore>> {
        // The store holds plain timestamps; a panic mid-update cannot leave it inconsistent
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LeadTriggerLimiter {
    fn default() -> Self {
        Self::in_memory(DEFAULT_LEAD_COOLDOWN)
    }
}

impl std::fmt::Debug for LeadTriggerLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeadTriggerLimiter")
            .field("cooldown", &self.cooldown)
            .field("tracked_clients", &self.tracked_clients())
            .finish()
    }
}
