//! Engine-wide configuration (§6): the small set of environment-driven knobs that aren't
//! per-provider. Loaded once at startup by the binary and threaded into the `Forwarder`.

use std::env;
use std::time::Duration;

/// Hard ceiling on provider switches within one request (§4.7). Not configurable — the
/// spec names it as a fixed constant, not a deployment knob.
pub const MAX_PROVIDER_SWITCHES: u32 = 20;

/// Fixed inter-attempt delay within the inner loop (§5): "no exponential backoff in the
/// inner loop; the breaker is the backpressure mechanism across attempts that switch
/// providers".
pub const INNER_LOOP_RETRY_DELAY: Duration = Duration::from_millis(100);

/// The synthetic HTTP status used for every flavor of upstream timeout (§4.1, §5).
pub const TIMEOUT_STATUS: u16 = 524;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// `MAX_RETRY_ATTEMPTS_DEFAULT`: integer 1..8, default 2. Used when a provider does
    /// not set its own `max_retry_attempts`.
    pub max_retry_attempts_default: u32,
    /// `ENABLE_CIRCUIT_BREAKER_ON_NETWORK_ERRORS`: whether a `SystemError` outcome counts
    /// to the provider breaker on exhaustion (§4.1 category 5). Default false.
    pub enable_circuit_breaker_on_network_errors: bool,
    /// `FETCH_HEADERS_TIMEOUT`: upper bound on waiting for response headers.
    pub fetch_headers_timeout: Duration,
    /// `FETCH_BODY_TIMEOUT`: upper bound on waiting for the full non-streaming body, or
    /// the streaming-idle gap between SSE bytes.
    pub fetch_body_timeout: Duration,
    /// Global HTTP/2 on/off toggle; a provider's own `network.http2_enabled` still wins
    /// per-provider, but this gates whether HTTP/2 is ever attempted at all.
    pub http2_enabled_globally: bool,
    /// Cool-down window for the vendor-type breaker (C3) once tripped (§4.2, §4.7).
    pub vendor_type_breaker_cooldown: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts_default: 2,
            enable_circuit_breaker_on_network_errors: false,
            fetch_headers_timeout: Duration::from_secs(30),
            fetch_body_timeout: Duration::from_secs(120),
            http2_enabled_globally: true,
            vendor_type_breaker_cooldown: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// Loads from the environment, falling back to the §6 defaults for anything unset
    /// or unparsable. Manual parsing (no `envy`/`config` dependency) matches the
    /// teacher's own `axum-resilient-kv-store` example, which reads its handful of env
    /// vars by hand rather than pulling in a config-layer crate for three knobs.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_retry_attempts_default: env_parsed("MAX_RETRY_ATTEMPTS_DEFAULT", defaults.max_retry_attempts_default)
                .clamp(1, 8),
            enable_circuit_breaker_on_network_errors: env_bool(
                "ENABLE_CIRCUIT_BREAKER_ON_NETWORK_ERRORS",
                defaults.enable_circuit_breaker_on_network_errors,
            ),
            fetch_headers_timeout: env_duration_ms("FETCH_HEADERS_TIMEOUT", defaults.fetch_headers_timeout),
            fetch_body_timeout: env_duration_ms("FETCH_BODY_TIMEOUT", defaults.fetch_body_timeout),
            http2_enabled_globally: env_bool("HTTP2_ENABLED", defaults.http2_enabled_globally),
            vendor_type_breaker_cooldown: defaults.vendor_type_breaker_cooldown,
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key).ok().as_deref() {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}

fn env_duration_ms(key: &str, default: Duration) -> Duration {
    env::var(key).ok().and_then(|v| v.parse::<u64>().ok()).map(Duration::from_millis).unwrap_or(default)
}

/// `clamp(provider.maxRetryAttempts || default, [1,8])` (§4.7 step 1.1).
pub fn clamp_max_attempts(requested: Option<u32>, default: u32) -> u32 {
    requested.unwrap_or(default).clamp(1, 8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_respects_the_one_to_eight_bound() {
        assert_eq!(clamp_max_attempts(Some(0), 2), 1);
        assert_eq!(clamp_max_attempts(Some(20), 2), 8);
        assert_eq!(clamp_max_attempts(None, 2), 2);
    }
}
