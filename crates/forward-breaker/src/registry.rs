//! A process-wide registry keyed by identity, each entry guarded by its own lock —
//! the replacement strategy §9 prescribes for "ad-hoc in-memory process state": no
//! global mutex, one lock per provider/endpoint so unrelated requests never contend.

use std::hash::Hash;
use std::sync::Mutex;
use std::time::Instant;

use dashmap::DashMap;
use forward_core::{BreakerTuning, EventListeners};

use crate::events::{BreakerEvent, BreakerEventKind};
use crate::state::{BreakerSnapshot, BreakerState, CircuitState};

/// A breaker registry over some identity type `K` (provider-id or endpoint-id).
pub struct BreakerRegistry<K> {
    entries: DashMap<K, Mutex<BreakerState>>,
    listeners: EventListeners<BreakerEvent>,
}

impl<K: Eq + Hash + Clone + ToString> BreakerRegistry<K> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            listeners: EventListeners::new(),
        }
    }

    pub fn with_listeners(listeners: EventListeners<BreakerEvent>) -> Self {
        Self {
            entries: DashMap::new(),
            listeners,
        }
    }

    /// Read-only: `isOpen` of §4.2. Never mutates (creates no entry if absent).
    pub fn is_open(&self, key: &K, now: Instant) -> bool {
        self.entries
            .get(key)
            .map(|entry| entry.lock().unwrap().is_open(now))
            .unwrap_or(false)
    }

    pub fn try_acquire(&self, key: &K, tuning: &BreakerTuning, now: Instant) -> bool {
        let entry = self.entries.entry(key.clone()).or_insert_with(|| Mutex::new(BreakerState::new()));
        let mut state = entry.lock().unwrap();
        let before = state.snapshot().state;
        let permitted = state.try_acquire(tuning, now, &key.to_string());
        let after = state.snapshot().state;
        drop(state);
        self.emit_transition(key, before, after);
        if !permitted {
            self.listeners.emit(&BreakerEvent {
                name: key.to_string(),
                timestamp: now,
                kind: BreakerEventKind::CallRejected,
            });
        }
        permitted
    }

    /// Records a failure. `is_probe` requests must never reach here with `true` in
    /// production code paths — callers are expected to filter probes out before calling
    /// (§8 invariant: "a probe request never mutates any breaker's failure count").
    pub fn record_failure(&self, key: &K, tuning: &BreakerTuning, is_probe: bool, now: Instant) {
        if is_probe {
            return;
        }
        let entry = self.entries.entry(key.clone()).or_insert_with(|| Mutex::new(BreakerState::new()));
        let mut state = entry.lock().unwrap();
        let before = state.snapshot().state;
        state.record_failure(tuning, now, &key.to_string());
        let after = state.snapshot().state;
        drop(state);
        self.emit_transition(key, before, after);
    }

    pub fn record_success(&self, key: &K, tuning: &BreakerTuning, is_probe: bool) {
        if is_probe {
            return;
        }
        let entry = self.entries.entry(key.clone()).or_insert_with(|| Mutex::new(BreakerState::new()));
        let mut state = entry.lock().unwrap();
        let before = state.snapshot().state;
        state.record_success(tuning, &key.to_string());
        let after = state.snapshot().state;
        drop(state);
        self.emit_transition(key, before, after);
    }

    pub fn force_open(&self, key: &K) {
        let entry = self.entries.entry(key.clone()).or_insert_with(|| Mutex::new(BreakerState::new()));
        entry.lock().unwrap().force_open(&key.to_string());
    }

    pub fn force_closed(&self, key: &K) {
        let entry = self.entries.entry(key.clone()).or_insert_with(|| Mutex::new(BreakerState::new()));
        entry.lock().unwrap().force_closed(&key.to_string());
    }

    pub fn reset(&self, key: &K) {
        let entry = self.entries.entry(key.clone()).or_insert_with(|| Mutex::new(BreakerState::new()));
        entry.lock().unwrap().reset(&key.to_string());
    }

    pub fn snapshot(&self, key: &K) -> Option<BreakerSnapshot> {
        self.entries.get(key).map(|entry| entry.lock().unwrap().snapshot())
    }

    fn emit_transition(&self, key: &K, before: CircuitState, after: CircuitState) {
        if before != after {
            self.listeners.emit(&BreakerEvent {
                name: key.to_string(),
                timestamp: Instant::now(),
                kind: BreakerEventKind::StateTransition {
                    from: before.into(),
                    to: after.into(),
                },
            });
        }
    }
}

impl<K: Eq + Hash + Clone + ToString> Default for BreakerRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forward_core::ProviderId;
    use std::time::Duration;

    fn tuning() -> BreakerTuning {
        BreakerTuning {
            failure_threshold: 1,
            open_duration: Duration::from_millis(10),
            half_open_success_threshold: 1,
        }
    }

    #[test]
    fn unknown_provider_reads_as_closed() {
        let registry: BreakerRegistry<ProviderId> = BreakerRegistry::new();
        assert!(!registry.is_open(&ProviderId::from("unseen"), Instant::now()));
    }

    #[test]
    fn failure_opens_and_try_acquire_rejects() {
        let registry: BreakerRegistry<ProviderId> = BreakerRegistry::new();
        let p1 = ProviderId::from("p1");
        let t = tuning();
        let now = Instant::now();
        registry.record_failure(&p1, &t, false, now);
        assert!(!registry.try_acquire(&p1, &t, now));
    }

    #[test]
    fn probe_failure_does_not_mutate_breaker() {
        let registry: BreakerRegistry<ProviderId> = BreakerRegistry::new();
        let p1 = ProviderId::from("p1");
        let t = tuning();
        let now = Instant::now();
        registry.record_failure(&p1, &t, true, now);
        assert!(registry.try_acquire(&p1, &t, now));
        assert!(registry.snapshot(&p1).is_none() || registry.snapshot(&p1).unwrap().failure_count == 0);
    }
}
