//! The data model of §3: provider/endpoint/key/user configuration snapshots and the
//! per-request session. Provider/Endpoint/Key/User are immutable for the lifetime of a
//! request — the forwarder pulls them once at entry and never mutates them.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::NaiveTime;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(ProviderId);
string_id!(EndpointId);
string_id!(VendorId);
string_id!(KeyId);
string_id!(UserId);

/// The dialect family an endpoint/provider speaks. See GLOSSARY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderType {
    AnthropicLike,
    CodexLike,
    GeminiLike,
    OpenAiCompatible,
}

/// A distinct per-request dispatch kind (§6, §7, §9). Standard requests participate in
/// the full retry/failover/breaker machinery; the others opt out of parts of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// A normal `/v1/messages`, `/v1/responses`, `/v1/chat/completions` request.
    Standard,
    /// `/v1/messages/count_tokens` — throws immediately on any error, never switches
    /// providers, never touches a breaker (§7).
    CountTokens,
    /// An administrative health check. Reads breaker state but never writes it, and
    /// never counts against `MAX_PROVIDER_SWITCHES` bookkeeping (GLOSSARY).
    Probe,
    /// A non-standard path treated as opaque vendor-native traffic (the MCP case).
    /// Endpoint resolution is relaxed and the vendor-type breaker does not apply.
    Passthrough,
}

impl RequestKind {
    pub fn is_probe(self) -> bool {
        matches!(self, RequestKind::Probe)
    }

    pub fn is_count_tokens(self) -> bool {
        matches!(self, RequestKind::CountTokens)
    }

    pub fn is_passthrough(self) -> bool {
        matches!(self, RequestKind::Passthrough)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingWeights {
    pub priority: u32,
    pub weight: u32,
    pub cost_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub weights: RoutingWeights,
    pub group_tag: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BreakerTuning {
    pub failure_threshold: u32,
    pub open_duration: Duration,
    pub half_open_success_threshold: u32,
}

impl Default for BreakerTuning {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
            half_open_success_threshold: 1,
        }
    }
}

impl BreakerTuning {
    /// Derives the per-endpoint breaker's tuning from the provider's (§4.2: "the same
    /// shape but a smaller failure budget"). Only the failure threshold is scaled down;
    /// the open duration and half-open quota stay the provider's, since the spec calls
    /// out the budget alone as the difference.
    pub fn for_endpoint(&self) -> BreakerTuning {
        BreakerTuning { failure_threshold: (self.failure_threshold / 2).max(1), ..*self }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProviderTimeouts {
    pub first_byte_timeout_streaming: Duration,
    pub request_timeout_non_streaming: Duration,
    pub streaming_idle_timeout: Duration,
}

impl Default for ProviderTimeouts {
    fn default() -> Self {
        Self {
            first_byte_timeout_streaming: Duration::from_secs(30),
            request_timeout_non_streaming: Duration::from_secs(120),
            streaming_idle_timeout: Duration::from_secs(30),
        }
    }
}

/// Cache-TTL preference for Anthropic-family `cache_control` rewriting (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheTtlPreference {
    Inherit,
    FiveMinutes,
    OneHour,
}

/// Context-window preference for the 1m-context beta flag (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextSizePreference {
    Inherit,
    ForceEnable,
    Disabled,
}

/// Per-provider strong overrides that beat client-supplied values (§4.5, last bullet).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderOverrides {
    pub max_tokens: Option<u64>,
    pub thinking_budget: Option<u64>,
    pub reasoning_effort: Option<String>,
    pub reasoning_summary: Option<String>,
    pub text_verbosity: Option<String>,
    pub parallel_tool_calls: Option<bool>,
    pub google_search_enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BodyRewritePreferences {
    pub cache_ttl: CacheTtlPreference,
    pub context_size: ContextSizePreference,
    pub model_redirects: HashMap<String, String>,
    pub allowed_models: Option<HashSet<String>>,
    pub overrides: ProviderOverrides,
}

impl Default for CacheTtlPreference {
    fn default() -> Self {
        CacheTtlPreference::Inherit
    }
}

impl Default for ContextSizePreference {
    fn default() -> Self {
        ContextSizePreference::Inherit
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub url: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NetworkToggles {
    pub http2_enabled: bool,
}

/// Per-key provider configuration (§3 "Provider"). Immutable for the request's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: ProviderId,
    pub vendor: VendorId,
    pub provider_type: ProviderType,
    #[serde(skip_serializing)]
    pub credential: SecretString,
    pub override_url: Option<String>,
    pub routing: RoutingConfig,
    pub breaker: BreakerTuning,
    pub timeouts: ProviderTimeouts,
    pub max_retry_attempts: Option<u32>,
    pub body_prefs: BodyRewritePreferences,
    pub proxy: Option<ProxyConfig>,
    pub network: NetworkToggles,
    /// Whether clients may use this provider for MCP passthrough traffic.
    pub allow_passthrough: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub ok: bool,
    pub latency_ms: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// A distinct URL belonging to one vendor for one provider-type (§3 "Endpoint").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    pub vendor: VendorId,
    pub provider_type: ProviderType,
    pub url: String,
    pub label: String,
    pub sort_hint: Option<u32>,
    pub enabled: bool,
    pub last_probe: Option<ProbeOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DailyResetMode {
    FixedAtTimeOfDay,
    Rolling24h,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DailyReset {
    pub mode: DailyResetMode,
    pub time_of_day: Option<NaiveTime>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UsdLimits {
    pub five_hour_rolling: Option<f64>,
    pub daily: Option<f64>,
    pub weekly: Option<f64>,
    pub monthly: Option<f64>,
    pub total: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConcurrencyLimits {
    pub sessions: Option<u32>,
    pub distinct_client_agents: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentPatterns {
    pub allowed: Vec<String>,
    pub blocked: Vec<String>,
}

/// Tenant credential (§3 "Key").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Key {
    pub id: KeyId,
    pub owning_user: UserId,
    pub usd_limits: UsdLimits,
    pub daily_reset: DailyReset,
    pub concurrency: ConcurrencyLimits,
    pub rpm: Option<u32>,
    pub agent_patterns: AgentPatterns,
    pub cache_ttl_preference: CacheTtlPreference,
}

/// Tenant account (§3 "User"); mirrors Key's budget/concurrency one level up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub usd_limits: UsdLimits,
    pub concurrency: ConcurrencyLimits,
    pub rpm: Option<u32>,
}

impl Key {
    /// Key concurrency limits inherit the user limit when unset (§4.3), avoiding the
    /// "Key unlimited, User 1" paradox.
    pub fn effective_concurrency(&self, user: &User) -> ConcurrencyLimits {
        ConcurrencyLimits {
            sessions: self.concurrency.sessions.or(user.concurrency.sessions),
            distinct_client_agents: self
                .concurrency
                .distinct_client_agents
                .or(user.concurrency.distinct_client_agents),
        }
    }
}

/// The immutable inputs of a request, captured once at entry (§3 "Session").
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: http::Method,
    pub path: String,
    pub headers: http::HeaderMap,
    pub body: serde_json::Value,
    pub original_format: ProviderType,
    pub kind: RequestKind,
}

/// Mutable per-request execution state threaded through the forwarder (§3 "Session").
/// Owned by exactly one request; never visible across requests except through the
/// session-binding record, which downstream components read as a plain key/value entry.
#[derive(Debug, Clone)]
pub struct Session {
    pub request_id: Uuid,
    pub session_id: String,
    pub key_id: KeyId,
    pub user_id: UserId,
    pub request: RequestContext,
    pub current_provider: Option<ProviderId>,
    pub request_sequence: u64,
    pub cache_ttl_resolved: Option<CacheTtlPreference>,
    pub context_flag_resolved: Option<ContextSizePreference>,
}

impl Session {
    pub fn new(key_id: KeyId, user_id: UserId, request: RequestContext) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            session_id: Uuid::new_v4().to_string(),
            key_id,
            user_id,
            request,
            current_provider: None,
            request_sequence: 0,
            cache_ttl_resolved: None,
            context_flag_resolved: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_concurrency_inherits_from_user_when_unset() {
        let user = User {
            id: UserId::from("u1"),
            usd_limits: UsdLimits::default(),
            concurrency: ConcurrencyLimits {
                sessions: Some(1),
                distinct_client_agents: Some(2),
            },
            rpm: None,
        };
        let key = Key {
            id: KeyId::from("k1"),
            owning_user: user.id.clone(),
            usd_limits: UsdLimits::default(),
            daily_reset: DailyReset {
                mode: DailyResetMode::Rolling24h,
                time_of_day: None,
            },
            concurrency: ConcurrencyLimits::default(),
            rpm: None,
            agent_patterns: AgentPatterns::default(),
            cache_ttl_preference: CacheTtlPreference::Inherit,
        };

        let effective = key.effective_concurrency(&user);
        assert_eq!(effective.sessions, Some(1));
        assert_eq!(effective.distinct_client_agents, Some(2));
    }
}
