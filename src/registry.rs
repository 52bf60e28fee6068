//! Tenant configuration registry (§3 Provider/Endpoint/Key/User).
//!
//! The administrative UI and its persistence schema are out-of-scope external
//! collaborators (§1): the core only needs provider/key/user records as immutable
//! snapshots pulled once per request. This registry is the thin loader the binary uses
//! to satisfy that contract locally — a real deployment points it at the admin service's
//! own store instead of a JSON file.

use std::collections::HashMap;
use std::path::Path;

use forward_core::{Endpoint, Key, Provider, User, UserId};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to read tenant config at {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("failed to parse tenant config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One configured tenant credential plus the bearer secret clients present for it. Kept
/// separate from `forward_core::Key` because the secret itself is a lookup key here, not
/// part of the core's data model.
#[derive(Debug, Deserialize)]
struct KeyRecord {
    secret: String,
    #[serde(flatten)]
    key: Key,
}

#[derive(Debug, Deserialize, Default)]
struct TenantConfig {
    #[serde(default)]
    providers: Vec<Provider>,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
    #[serde(default)]
    keys: Vec<KeyRecord>,
    #[serde(default)]
    users: Vec<User>,
}

/// The provider/endpoint pool plus the key/user lookups the inbound HTTP surface needs
/// to turn a bearer secret into the `(Key, User)` pair the rate-limit guard and
/// forwarder require.
pub struct TenantRegistry {
    providers: Vec<Provider>,
    endpoints: Vec<Endpoint>,
    keys_by_secret: HashMap<String, Key>,
    users_by_id: HashMap<UserId, User>,
}

impl TenantRegistry {
    /// Loads from `path` if given, falling back to a small built-in demo tenant (one
    /// Anthropic-like provider/endpoint, one unlimited key) so the binary is runnable
    /// out of the box the way the teacher's own axum example is ("try it: curl ...").
    pub fn load(path: Option<&Path>) -> Result<Self, RegistryError> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|source| RegistryError::Read { path: path.display().to_string(), source })?;
                serde_json::from_str(&text)?
            }
            None => demo_config(),
        };
        Ok(Self::from_config(config))
    }

    fn from_config(config: TenantConfig) -> Self {
        let keys_by_secret = config.keys.into_iter().map(|record| (record.secret, record.key)).collect();
        let users_by_id = config.users.into_iter().map(|user| (user.id.clone(), user)).collect();
        Self { providers: config.providers, endpoints: config.endpoints, keys_by_secret, users_by_id }
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Resolves the bearer secret a client presented to its `(Key, User)` pair. `None`
    /// means the secret is unrecognized, which the caller renders as a plain
    /// authentication failure before the forwarder ever sees the request.
    pub fn authenticate(&self, secret: &str) -> Option<(Key, User)> {
        let key = self.keys_by_secret.get(secret)?.clone();
        let user = self.users_by_id.get(&key.owning_user)?.clone();
        Some((key, user))
    }
}

/// A single local Anthropic-like provider/endpoint/key/user, just enough to exercise the
/// forwarder against a real upstream without external configuration.
fn demo_config() -> TenantConfig {
    use forward_core::{
        AgentPatterns, BodyRewritePreferences, BreakerTuning, CacheTtlPreference, ConcurrencyLimits, DailyReset,
        DailyResetMode, EndpointId, KeyId, NetworkToggles, ProviderId, ProviderTimeouts, ProviderType, RoutingConfig,
        RoutingWeights, UsdLimits, VendorId,
    };
    use secrecy::SecretString;

    let vendor = VendorId::from("anthropic-demo");
    let provider = Provider {
        id: ProviderId::from("demo-anthropic"),
        vendor: vendor.clone(),
        provider_type: ProviderType::AnthropicLike,
        credential: SecretString::from(
            std::env::var("DEMO_PROVIDER_API_KEY").unwrap_or_else(|_| "sk-demo-placeholder".to_string()),
        ),
        override_url: Some("https://api.anthropic.com".to_string()),
        routing: RoutingConfig {
            weights: RoutingWeights { priority: 1, weight: 1, cost_multiplier: 1.0 },
            group_tag: None,
        },
        breaker: BreakerTuning::default(),
        timeouts: ProviderTimeouts::default(),
        max_retry_attempts: None,
        body_prefs: BodyRewritePreferences { cache_ttl: CacheTtlPreference::Inherit, ..Default::default() },
        proxy: None,
        network: NetworkToggles { http2_enabled: true },
        allow_passthrough: false,
    };
    let endpoint = Endpoint {
        id: EndpointId::from("demo-anthropic-primary"),
        vendor,
        provider_type: ProviderType::AnthropicLike,
        url: "https://api.anthropic.com".to_string(),
        label: "primary".to_string(),
        sort_hint: Some(0),
        enabled: true,
        last_probe: None,
    };
    let user = User {
        id: UserId::from("demo-user"),
        usd_limits: UsdLimits::default(),
        concurrency: ConcurrencyLimits::default(),
        rpm: None,
    };
    let key = Key {
        id: KeyId::from("demo-key"),
        owning_user: user.id.clone(),
        usd_limits: UsdLimits::default(),
        daily_reset: DailyReset { mode: DailyResetMode::Rolling24h, time_of_day: None },
        concurrency: ConcurrencyLimits::default(),
        rpm: None,
        agent_patterns: AgentPatterns::default(),
        cache_ttl_preference: CacheTtlPreference::Inherit,
    };

    TenantConfig {
        providers: vec![provider],
        endpoints: vec![endpoint],
        keys: vec![KeyRecord { secret: "sk-demo-key".to_string(), key }],
        users: vec![user],
    }
}
