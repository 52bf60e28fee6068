//! Provider resolution (C5, §4.4): filter the tenant's provider pool down to eligible
//! survivors, then weighted-random pick within the highest non-empty priority band.
//! Grounded in `tower-resilience-ratelimiter`'s enum-dispatch style for the filter chain
//! and in the pack's routing examples for the weighted-random tie-break.

use std::collections::HashSet;

use forward_breaker::BreakerRegistry;
use forward_core::{AgentPatterns, Key, Provider, ProviderId, ProviderType};
use rand::Rng;

/// Everything the resolver needs about the calling request beyond the provider pool
/// itself. Kept as plain fields rather than threading the full `Session` through, so the
/// resolver stays unit-testable without constructing a complete request context.
pub struct ResolveRequest<'a> {
    pub required_type: ProviderType,
    pub client_agent: &'a str,
    pub model: Option<&'a str>,
    pub exclude: &'a HashSet<ProviderId>,
    pub allow_open_breaker: bool,
}

/// `pickProvider` of §4.4. Returns `None` when no provider survives the filter chain.
///
/// The breaker check goes through `try_acquire`, not a plain `is_open` read: this is the
/// actual admission decision for the request about to be sent, so it's also the access
/// that must drive `open -> half-open` once `open_until` has elapsed (§4.2) and gate the
/// half-open success quota. A read-only check here would let `is_open` keep reporting
/// `false` past `open_until` forever without ever moving the breaker out of `Open`.
pub fn pick_provider(
    providers: &[Provider],
    key: &Key,
    request: &ResolveRequest<'_>,
    breakers: &BreakerRegistry<ProviderId>,
    now: std::time::Instant,
) -> Option<ProviderId> {
    let survivors: Vec<&Provider> = providers
        .iter()
        .filter(|p| p.provider_type == request.required_type)
        .filter(|p| !request.exclude.contains(&p.id))
        .filter(|p| request.allow_open_breaker || breakers.try_acquire(&p.id, &p.breaker, now))
        .filter(|p| agent_permitted(&key.agent_patterns, request.client_agent))
        .filter(|p| model_permitted(p, request.model))
        .collect();

    if survivors.is_empty() {
        return None;
    }

    let top_priority = survivors.iter().map(|p| p.routing.weights.priority).max()?;
    let band: Vec<&Provider> =
        survivors.iter().copied().filter(|p| p.routing.weights.priority == top_priority).collect();

    weighted_pick(&band).map(|p| p.id.clone())
}

fn agent_permitted(patterns: &AgentPatterns, client_agent: &str) -> bool {
    if patterns.blocked.iter().any(|pattern| client_agent.contains(pattern.as_str())) {
        return false;
    }
    if patterns.allowed.is_empty() {
        return true;
    }
    patterns.allowed.iter().any(|pattern| client_agent.contains(pattern.as_str()))
}

fn model_permitted(provider: &Provider, model: Option<&str>) -> bool {
    match (&provider.body_prefs.allowed_models, model) {
        (None, _) => true,
        (Some(allowed), Some(model)) => allowed.contains(model),
        (Some(_), None) => false,
    }
}

fn weighted_pick<'a>(band: &[&'a Provider]) -> Option<&'a Provider> {
    let total_weight: u64 = band.iter().map(|p| p.routing.weights.weight as u64).sum();
    if total_weight == 0 {
        return band.first().copied();
    }
    let mut roll = rand::thread_rng().gen_range(0..total_weight);
    for &provider in band {
        let weight = provider.routing.weights.weight as u64;
        if roll < weight {
            return Some(provider);
        }
        roll -= weight;
    }
    band.last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use forward_core::{
        BodyRewritePreferences, BreakerTuning, NetworkToggles, ProviderTimeouts, RoutingConfig, RoutingWeights,
    };
    use secrecy::SecretString;

    fn provider(id: &str, priority: u32, weight: u32, provider_type: ProviderType) -> Provider {
        Provider {
            id: ProviderId::from(id),
            vendor: forward_core::VendorId::from("vendor-a"),
            provider_type,
            credential: SecretString::from("secret".to_string()),
            override_url: None,
            routing: RoutingConfig { weights: RoutingWeights { priority, weight, cost_multiplier: 1.0 }, group_tag: None },
            breaker: BreakerTuning::default(),
            timeouts: ProviderTimeouts::default(),
            max_retry_attempts: None,
            body_prefs: BodyRewritePreferences::default(),
            proxy: None,
            network: NetworkToggles::default(),
            allow_passthrough: false,
        }
    }

    fn key() -> Key {
        Key {
            id: forward_core::KeyId::from("k1"),
            owning_user: forward_core::UserId::from("u1"),
            usd_limits: forward_core::UsdLimits::default(),
            daily_reset: forward_core::DailyReset {
                mode: forward_core::DailyResetMode::Rolling24h,
                time_of_day: None,
            },
            concurrency: forward_core::ConcurrencyLimits::default(),
            rpm: None,
            agent_patterns: AgentPatterns::default(),
            cache_ttl_preference: forward_core::CacheTtlPreference::Inherit,
        }
    }

    #[test]
    fn excludes_wrong_provider_type() {
        let providers = vec![provider("p1", 1, 1, ProviderType::CodexLike)];
        let breakers = BreakerRegistry::new();
        let request = ResolveRequest {
            required_type: ProviderType::AnthropicLike,
            client_agent: "curl",
            model: None,
            exclude: &HashSet::new(),
            allow_open_breaker: false,
        };
        assert!(pick_provider(&providers, &key(), &request, &breakers, std::time::Instant::now()).is_none());
    }

    #[test]
    fn prefers_highest_priority_band_only() {
        let providers = vec![
            provider("low", 1, 100, ProviderType::AnthropicLike),
            provider("high", 2, 1, ProviderType::AnthropicLike),
        ];
        let breakers = BreakerRegistry::new();
        let request = ResolveRequest {
            required_type: ProviderType::AnthropicLike,
            client_agent: "curl",
            model: None,
            exclude: &HashSet::new(),
            allow_open_breaker: false,
        };
        let picked = pick_provider(&providers, &key(), &request, &breakers, std::time::Instant::now()).unwrap();
        assert_eq!(picked, ProviderId::from("high"));
    }

    #[test]
    fn open_breaker_excludes_unless_explicitly_allowed() {
        let providers = vec![provider("p1", 1, 1, ProviderType::AnthropicLike)];
        let breakers: BreakerRegistry<ProviderId> = BreakerRegistry::new();
        let tuning = BreakerTuning { failure_threshold: 1, open_duration: std::time::Duration::from_secs(60), half_open_success_threshold: 1 };
        let now = std::time::Instant::now();
        breakers.record_failure(&ProviderId::from("p1"), &tuning, false, now);

        let request = ResolveRequest {
            required_type: ProviderType::AnthropicLike,
            client_agent: "curl",
            model: None,
            exclude: &HashSet::new(),
            allow_open_breaker: false,
        };
        assert!(pick_provider(&providers, &key(), &request, &breakers, now).is_none());

        let request_allowing_open = ResolveRequest { allow_open_breaker: true, ..request };
        assert!(pick_provider(&providers, &key(), &request_allowing_open, &breakers, now).is_some());
    }

    #[test]
    fn blocked_agent_pattern_excludes_all_providers() {
        let providers = vec![provider("p1", 1, 1, ProviderType::AnthropicLike)];
        let breakers = BreakerRegistry::new();
        let mut k = key();
        k.agent_patterns.blocked.push("bad-bot".to_string());
        let request = ResolveRequest {
            required_type: ProviderType::AnthropicLike,
            client_agent: "bad-bot/1.0",
            model: None,
            exclude: &HashSet::new(),
            allow_open_breaker: false,
        };
        assert!(pick_provider(&providers, &k, &request, &breakers, std::time::Instant::now()).is_none());
    }
}
