//! Checks 3 and 4 of §4.3: atomic reserve-and-track concurrency limiters. Grounded in
//! `forward_breaker::BreakerRegistry`'s per-entity-locked `DashMap`, generalized here to
//! hold a refcounted reservation set instead of a breaker state.
//!
//! Both checks release their reservation when the caller drops the returned guard, so a
//! crashed or cancelled request can never leak a permit permanently (unlike a counter the
//! caller has to remember to decrement).

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

/// Tracks the number of concurrently active sessions per scope (Key, in practice).
/// Unlike the distinct-agent limiter, a session reserves exactly one slot per active
/// request regardless of how many times that session id has been seen before.
#[derive(Clone)]
pub struct SessionConcurrencyLimiter<K> {
    active: Arc<DashMap<K, Mutex<usize>>>,
}

pub struct SessionReservation<K: Eq + Hash + Clone> {
    limiter: SessionConcurrencyLimiter<K>,
    key: K,
}

impl<K: Eq + Hash + Clone> SessionConcurrencyLimiter<K> {
    pub fn new() -> Self {
        Self { active: Arc::new(DashMap::new()) }
    }

    /// Attempts to reserve one slot for `key`, failing if doing so would exceed `limit`.
    pub fn try_reserve(&self, key: K, limit: Option<u32>) -> Result<SessionReservation<K>, u32> {
        let Some(limit) = limit else {
            return Ok(SessionReservation { limiter: self.clone(), key });
        };
        let entry = self.active.entry(key.clone()).or_insert_with(|| Mutex::new(0));
        let mut count = entry.lock().unwrap();
        if (*count as u32) >= limit {
            return Err(*count as u32);
        }
        *count += 1;
        drop(count);
        Ok(SessionReservation { limiter: self.clone(), key })
    }

    pub fn current(&self, key: &K) -> u32 {
        self.active.get(key).map(|e| *e.lock().unwrap() as u32).unwrap_or(0)
    }

    fn release(&self, key: &K) {
        if let Some(entry) = self.active.get(key) {
            let mut count = entry.lock().unwrap();
            *count = count.saturating_sub(1);
        }
    }
}

impl<K: Eq + Hash + Clone> Default for SessionConcurrencyLimiter<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> Drop for SessionReservation<K> {
    fn drop(&mut self) {
        self.limiter.release(&self.key);
    }
}

/// Tracks the number of *distinct* concurrently active client agents per scope. Several
/// concurrent requests from the same agent id count once; the limit bounds how many
/// different agents may be active at once, not how many requests.
#[derive(Clone)]
pub struct DistinctAgentLimiter<K, A> {
    active: Arc<DashMap<K, Mutex<HashMap<A, usize>>>>,
}

pub struct AgentReservation<K: Eq + Hash + Clone, A: Eq + Hash + Clone> {
    limiter: DistinctAgentLimiter<K, A>,
    key: K,
    agent: A,
}

impl<K: Eq + Hash + Clone, A: Eq + Hash + Clone> DistinctAgentLimiter<K, A> {
    pub fn new() -> Self {
        Self { active: Arc::new(DashMap::new()) }
    }

    /// Reserves one request slot under `agent` within `key`'s scope. Only rejects when
    /// `agent` is not already active and admitting it would push the distinct-agent count
    /// over `limit`; a repeat caller under the same agent id is always admitted.
    pub fn try_reserve(
        &self,
        key: K,
        agent: A,
        limit: Option<u32>,
    ) -> Result<AgentReservation<K, A>, u32> {
        let entry = self.active.entry(key.clone()).or_insert_with(|| Mutex::new(HashMap::new()));
        let mut agents = entry.lock().unwrap();
        if let Some(limit) = limit {
            let already_active = agents.contains_key(&agent);
            if !already_active && agents.len() as u32 >= limit {
                return Err(agents.len() as u32);
            }
        }
        *agents.entry(agent.clone()).or_insert(0) += 1;
        drop(agents);
        Ok(AgentReservation { limiter: self.clone(), key, agent })
    }

    pub fn distinct_count(&self, key: &K) -> u32 {
        self.active.get(key).map(|e| e.lock().unwrap().len() as u32).unwrap_or(0)
    }

    fn release(&self, key: &K, agent: &A) {
        if let Some(entry) = self.active.get(key) {
            let mut agents = entry.lock().unwrap();
            if let Some(refcount) = agents.get_mut(agent) {
                *refcount -= 1;
                if *refcount == 0 {
                    agents.remove(agent);
                }
            }
        }
    }
}

impl<K: Eq + Hash + Clone, A: Eq + Hash + Clone> Default for DistinctAgentLimiter<K, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone, A: Eq + Hash + Clone> Drop for AgentReservation<K, A> {
    fn drop(&mut self) {
        self.limiter.release(&self.key, &self.agent);
    }
}
