//! A named, TTL-bounded "degraded feature" flag (§9 design notes: the source's
//! `isBatchProbeLogsEndpointAvailable`-style module globals, generalized). Used to gate
//! an optional upstream batch-logs probe after a single failure without hand-rolling a
//! bare boolean with no re-enable path.
//!
//! Resolved open question (see DESIGN.md): the TTL defaults to 5 minutes, matching the
//! source's own comment, and is *not* cleared early by a partial success within a batch
//! — only TTL expiry or an explicit [`DegradedFeatureProbe::reset`] clears it. A feature
//! that flaps back on partial success would mask a rolling deployment mid-rollout in
//! exactly the way the source's comment warns about.

use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct DegradedFeatureProbe {
    name: &'static str,
    ttl: Duration,
    tripped_at: Mutex<Option<Instant>>,
}

impl DegradedFeatureProbe {
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self { name, ttl, tripped_at: Mutex::new(None) }
    }

    /// The default 5-minute batch-logs probe (§9).
    pub fn batch_logs_default() -> Self {
        Self::new("batch_probe_logs_endpoint", Duration::from_secs(300))
    }

    pub fn is_available(&self, now: Instant) -> bool {
        match *self.tripped_at.lock().unwrap() {
            None => true,
            Some(tripped) => now.duration_since(tripped) >= self.ttl,
        }
    }

    /// Marks the feature unavailable starting `now`; idempotent while already tripped
    /// (does not push the TTL window further out on repeated failures).
    pub fn trip(&self, now: Instant) {
        let mut guard = self.tripped_at.lock().unwrap();
        if guard.is_none() {
            tracing::warn!(feature = self.name, ttl_secs = self.ttl.as_secs(), "feature degraded");
            *guard = Some(now);
        }
    }

    /// Administrative reset, independent of TTL expiry.
    pub fn reset(&self) {
        *self.tripped_at.lock().unwrap() = None;
    }
}
