//! Endpoint selection (C6, §4.4): order a vendor/provider-type's enabled endpoints by
//! last-probe latency, unprobed endpoints last, truncated to the retry budget. The
//! forwarder (not this crate) layers endpoint stickiness on top of the returned order.

use std::time::Instant;

use forward_breaker::BreakerRegistry;
use forward_core::{Endpoint, EndpointId, ProviderType, VendorId};

/// `pickEndpoints` of §4.4. Endpoints whose breaker (C2) is open are dropped from the
/// candidate list entirely rather than reordered to the back — an open endpoint isn't
/// just slow, it's the thing the breaker exists to shortcut.
pub fn pick_endpoints(
    endpoints: &[Endpoint],
    vendor: &VendorId,
    provider_type: ProviderType,
    max_retry_attempts: usize,
    breakers: &BreakerRegistry<EndpointId>,
    now: Instant,
) -> Vec<EndpointId> {
    let mut candidates: Vec<&Endpoint> = endpoints
        .iter()
        .filter(|e| e.enabled && &e.vendor == vendor && e.provider_type == provider_type)
        .filter(|e| !breakers.is_open(&e.id, now))
        .collect();

    candidates.sort_by(|a, b| match (latency(a), latency(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    candidates.into_iter().take(max_retry_attempts).map(|e| e.id.clone()).collect()
}

fn latency(endpoint: &Endpoint) -> Option<u64> {
    endpoint.last_probe.map(|probe| probe.latency_ms)
}
