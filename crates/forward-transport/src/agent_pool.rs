//! The agent pool (C8, §4.6): a keyed connection/agent cache. Keyed by
//! `(endpoint-origin, proxy-config-or-none, http2-enabled)`. `mark_unhealthy` invalidates
//! an entry on an agent-level fault (SSL failure, HTTP/2 protocol error) so the next
//! request builds a fresh agent instead of reusing a poisoned one.

use std::time::Duration;

use dashmap::DashMap;

/// Identifies one cached agent. Two requests to the same origin through the same proxy
/// (or none) with the same HTTP/2 preference share a connection pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentKey {
    pub origin: String,
    pub proxy: Option<String>,
    pub http2_enabled: bool,
}

impl AgentKey {
    pub fn new(origin: impl Into<String>, proxy: Option<String>, http2_enabled: bool) -> Self {
        Self { origin: origin.into(), proxy, http2_enabled }
    }

    /// The same key with HTTP/2 forced off, used for the transparent HTTP/2-to-HTTP/1
    /// fallback retry (§4.6).
    pub fn without_http2(&self) -> Self {
        Self { http2_enabled: false, ..self.clone() }
    }
}

/// A process-wide, per-key-locked cache of `reqwest::Client`s. `dashmap` shards the
/// table so unrelated origins never contend on the same lock (§9's "replacement for
/// ad-hoc in-memory process state", generalized to many keyed entities instead of the
/// single-entity `Arc<Mutex<Circuit>>` the breaker crate uses).
pub struct AgentPool {
    agents: DashMap<AgentKey, reqwest::Client>,
}

impl AgentPool {
    pub fn new() -> Self {
        Self { agents: DashMap::new() }
    }

    /// Returns the cached client for `key`, building and inserting a fresh one on a
    /// cache miss.
    pub fn get(&self, key: &AgentKey) -> reqwest::Client {
        if let Some(existing) = self.agents.get(key) {
            return existing.clone();
        }
        let client = build_client(key);
        self.agents.insert(key.clone(), client.clone());
        client
    }

    /// Invalidates `key` after an agent-level fault so the next `get` builds fresh
    /// (§4.6: SSL failure, HTTP/2 protocol error).
    pub fn mark_unhealthy(&self, key: &AgentKey, reason: &str) {
        if self.agents.remove(key).is_some() {
            tracing::warn!(origin = %key.origin, http2 = key.http2_enabled, reason, "agent marked unhealthy, evicted from pool");
        }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for AgentPool {
    fn default() -> Self {
        Self::new()
    }
}

fn build_client(key: &AgentKey) -> reqwest::Client {
    // Deliberately built without the gzip/brotli/deflate reqwest features (see the
    // workspace Cargo.toml): the core bypasses automatic content-decoding and handles
    // gzip manually (§6), so there is no decoder here to disable.
    let mut builder = reqwest::Client::builder().connect_timeout(Duration::from_secs(10));

    builder = if key.http2_enabled { builder.http2_prior_knowledge() } else { builder.http1_only() };

    if let Some(proxy_url) = &key.proxy {
        match reqwest::Proxy::all(proxy_url) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(error) => tracing::warn!(%error, proxy = %proxy_url, "invalid proxy config, ignoring"),
        }
    }

    builder.build().unwrap_or_else(|error| {
        tracing::error!(%error, "failed to build agent with requested options, falling back to defaults");
        reqwest::Client::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_returns_a_shared_client() {
        let pool = AgentPool::new();
        let key = AgentKey::new("https://api.example.invalid", None, true);
        let _a = pool.get(&key);
        let _b = pool.get(&key);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn distinct_http2_preference_is_a_distinct_entry() {
        let pool = AgentPool::new();
        let origin = "https://api.example.invalid";
        pool.get(&AgentKey::new(origin, None, true));
        pool.get(&AgentKey::new(origin, None, false));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn mark_unhealthy_evicts_so_next_get_rebuilds() {
        let pool = AgentPool::new();
        let key = AgentKey::new("https://api.example.invalid", None, true);
        pool.get(&key);
        assert_eq!(pool.len(), 1);
        pool.mark_unhealthy(&key, "http2 protocol error");
        assert!(pool.is_empty());
    }

    #[test]
    fn without_http2_produces_the_fallback_key() {
        let key = AgentKey::new("https://api.example.invalid", None, true);
        let fallback = key.without_http2();
        assert!(!fallback.http2_enabled);
        assert_eq!(fallback.origin, key.origin);
    }
}
