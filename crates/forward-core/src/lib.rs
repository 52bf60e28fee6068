//! Shared types for the forwarding engine: the data model (§3), the error taxonomy
//! (§7), the decision chain (§3, §4.9, C11), and a small event bus used by the breaker
//! and rate-limit guard for observability.

pub mod decision_chain;
pub mod error;
pub mod events;
pub mod model;

pub use decision_chain::{CircuitStateSnapshot, DecisionChain, DecisionChainEntry, DecisionReason};
pub use error::{ClientError, ErrorCategory, ForwardError, RateLimitDetail, TransportError, UpstreamError};
pub use events::{EngineEvent, EventListener, EventListeners, FnListener};
pub use model::{
    AgentPatterns, BodyRewritePreferences, BreakerTuning, CacheTtlPreference, ConcurrencyLimits,
    ContextSizePreference, DailyReset, DailyResetMode, Endpoint, EndpointId, Key, KeyId,
    NetworkToggles, ProbeOutcome, Provider, ProviderId, ProviderOverrides, ProviderTimeouts,
    ProviderType, ProxyConfig, RequestContext, RequestKind, RoutingConfig, RoutingWeights,
    Session, UsdLimits, User, UserId, VendorId,
};
