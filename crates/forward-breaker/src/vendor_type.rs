//! C3: the coarser vendor-type breaker (§4.2 last paragraph, §4.7 step 1.3, scenario 6).
//!
//! Trips when, within a single forwarding attempt, every endpoint of a
//! `(vendor, provider_type)` pair produced a 524 timeout. Unlike C2 it has no
//! half-open probing — it just shortcuts future requests for a fixed cool-down.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use forward_core::{ProviderType, VendorId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VendorTypeKey {
    pub vendor: VendorId,
    pub provider_type: ProviderType,
}

impl VendorTypeKey {
    pub fn new(vendor: VendorId, provider_type: ProviderType) -> Self {
        Self { vendor, provider_type }
    }
}

/// Tracks, per forwarding attempt across a provider's endpoint list, whether every
/// endpoint timed out. Call [`AllTimeoutsTracker::record`] once per endpoint outcome and
/// [`AllTimeoutsTracker::all_timed_out`] once the provider's endpoint list is exhausted.
#[derive(Debug, Default)]
pub struct AllTimeoutsTracker {
    total_endpoints: usize,
    timeouts: usize,
}

impl AllTimeoutsTracker {
    pub fn new(total_endpoints: usize) -> Self {
        Self {
            total_endpoints,
            timeouts: 0,
        }
    }

    pub fn record_timeout(&mut self) {
        self.timeouts += 1;
    }

    pub fn all_timed_out(&self) -> bool {
        self.total_endpoints > 0 && self.timeouts >= self.total_endpoints
    }
}

pub struct VendorTypeBreaker {
    open_until: DashMap<VendorTypeKey, Mutex<Option<Instant>>>,
}

impl VendorTypeBreaker {
    pub fn new() -> Self {
        Self {
            open_until: DashMap::new(),
        }
    }

    pub fn is_open(&self, key: &VendorTypeKey, now: Instant) -> bool {
        self.open_until
            .get(key)
            .map(|guard| guard.lock().unwrap().map(|until| now < until).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Trips the breaker for `cooldown` starting now.
    pub fn trip(&self, key: VendorTypeKey, cooldown: Duration, now: Instant) {
        let entry = self.open_until.entry(key).or_insert_with(|| Mutex::new(None));
        *entry.lock().unwrap() = Some(now + cooldown);
        tracing::warn!(vendor = ?entry.key().vendor, provider_type = ?entry.key().provider_type, "vendor-type breaker tripped: all endpoints timed out");
    }

    pub fn reset(&self, key: &VendorTypeKey) {
        if let Some(entry) = self.open_until.get(key) {
            *entry.lock().unwrap() = None;
        }
    }
}

impl Default for VendorTypeBreaker {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds one [`AllTimeoutsTracker`] per in-flight (provider, attempt-round); the
/// forwarder creates one per outer-loop iteration and drops it once the inner loop ends.
pub type TrackerScratch = HashMap<VendorTypeKey, AllTimeoutsTracker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_only_when_every_endpoint_timed_out() {
        let mut tracker = AllTimeoutsTracker::new(3);
        tracker.record_timeout();
        tracker.record_timeout();
        assert!(!tracker.all_timed_out());
        tracker.record_timeout();
        assert!(tracker.all_timed_out());
    }

    #[test]
    fn vendor_type_breaker_blocks_until_cooldown_elapses() {
        let breaker = VendorTypeBreaker::new();
        let key = VendorTypeKey::new(VendorId::from("vendor-a"), ProviderType::AnthropicLike);
        let now = Instant::now();
        assert!(!breaker.is_open(&key, now));

        breaker.trip(key.clone(), Duration::from_millis(50), now);
        assert!(breaker.is_open(&key, now));
        assert!(!breaker.is_open(&key, now + Duration::from_millis(60)));
    }
}
