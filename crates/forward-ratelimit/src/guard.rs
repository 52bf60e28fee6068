//! The rate-limit guard itself (C4, §4.3): runs the 13 checks in their fixed order,
//! short-circuiting on the first failure, and hands back an RAII reservation covering the
//! two concurrency slots it atomically reserved.

use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use forward_core::{ClientError, DailyResetMode, Key, KeyId, RateLimitDetail, User, UserId};
use std::sync::Mutex;

use crate::concurrency::{AgentReservation, DistinctAgentLimiter, SessionConcurrencyLimiter, SessionReservation};
use crate::rpm::RpmLimiter;
use crate::usd::UsdLedger;

/// Holds the two concurrency reservations made while passing checks 3 and 4. Dropping it
/// releases both slots; callers hold it for the lifetime of the forwarding attempt.
pub struct RateLimitReservation {
    _session: SessionReservation<KeyId>,
    _agent: AgentReservation<KeyId, String>,
}

pub struct RateLimitGuard {
    key_usd: DashMap<KeyId, Mutex<UsdLedger>>,
    user_usd: DashMap<UserId, Mutex<UsdLedger>>,
    user_rpm: RpmLimiter<UserId>,
    sessions: SessionConcurrencyLimiter<KeyId>,
    agents: DistinctAgentLimiter<KeyId, String>,
}

impl RateLimitGuard {
    pub fn new() -> Self {
        Self {
            key_usd: DashMap::new(),
            user_usd: DashMap::new(),
            user_rpm: RpmLimiter::new(),
            sessions: SessionConcurrencyLimiter::new(),
            agents: DistinctAgentLimiter::new(),
        }
    }

    /// Runs checks 1-13 in order against `key` and `user`, reserving a session slot and an
    /// agent slot on success. `agent_id` identifies the calling client agent for check 3.
    pub fn admit(
        &self,
        key: &Key,
        user: &User,
        agent_id: &str,
        now_instant: Instant,
        now_utc: DateTime<Utc>,
    ) -> Result<RateLimitReservation, ClientError> {
        let key_ledger = self.key_usd.entry(key.id.clone()).or_insert_with(|| Mutex::new(UsdLedger::new()));
        let user_ledger = self.user_usd.entry(user.id.clone()).or_insert_with(|| Mutex::new(UsdLedger::new()));

        // 1. Key total USD.
        if let Some(outcome) = key_ledger.lock().unwrap().check_total(key.usd_limits.total) {
            reject_if_failed(&outcome, "key_total_usd", key.id.as_str())?;
        }
        // 2. User total USD.
        if let Some(outcome) = user_ledger.lock().unwrap().check_total(user.usd_limits.total) {
            reject_if_failed(&outcome, "user_total_usd", user.id.as_str())?;
        }

        // 3. Key+User distinct-client-agent concurrency (inherits from user if unset).
        let effective = key.effective_concurrency(user);
        let agent_reservation = self
            .agents
            .try_reserve(key.id.clone(), agent_id.to_string(), effective.distinct_client_agents)
            .map_err(|current| {
                ClientError::RateLimit(RateLimitDetail {
                    limit_type: "key_user_distinct_agent_concurrency".into(),
                    current: current as f64,
                    limit: effective.distinct_client_agents.unwrap_or(0) as f64,
                    reset_time: None,
                    resource_id: key.id.to_string(),
                })
            })?;

        // 4. Key+User concurrent-session count.
        let session_reservation = match self.sessions.try_reserve(key.id.clone(), effective.sessions) {
            Ok(reservation) => reservation,
            Err(current) => {
                drop(agent_reservation);
                return Err(ClientError::RateLimit(RateLimitDetail {
                    limit_type: "key_user_session_concurrency".into(),
                    current: current as f64,
                    limit: effective.sessions.unwrap_or(0) as f64,
                    reset_time: None,
                    resource_id: key.id.to_string(),
                }));
            }
        };

        // 5. User requests-per-minute.
        if let Err(current) = self.user_rpm.try_admit(user.id.clone(), user.rpm, now_instant) {
            return Err(ClientError::RateLimit(RateLimitDetail {
                limit_type: "user_rpm".into(),
                current: current as f64,
                limit: user.rpm.unwrap_or(0) as f64,
                reset_time: None,
                resource_id: user.id.to_string(),
            }));
        }

        {
            let key_guard = key_ledger.lock().unwrap();
            let user_guard = user_ledger.lock().unwrap();

            // 6/7. Five-hour rolling USD.
            if let Some(outcome) = key_guard.check_five_hour_rolling(key.usd_limits.five_hour_rolling, now_utc) {
                reject_if_failed(&outcome, "key_five_hour_usd", key.id.as_str())?;
            }
            if let Some(outcome) = user_guard.check_five_hour_rolling(user.usd_limits.five_hour_rolling, now_utc) {
                reject_if_failed(&outcome, "user_five_hour_usd", user.id.as_str())?;
            }

            // 8/9. Daily USD.
            if let Some(outcome) = key_guard.check_daily(
                key.usd_limits.daily,
                key.daily_reset.mode,
                key.daily_reset.time_of_day,
                now_utc,
            ) {
                reject_if_failed(&outcome, "key_daily_usd", key.id.as_str())?;
            }
            if let Some(outcome) =
                user_guard.check_daily(user.usd_limits.daily, DailyResetMode::Rolling24h, None, now_utc)
            {
                reject_if_failed(&outcome, "user_daily_usd", user.id.as_str())?;
            }

            // 10/11. Weekly USD.
            if let Some(outcome) = key_guard.check_weekly(key.usd_limits.weekly, now_utc) {
                reject_if_failed(&outcome, "key_weekly_usd", key.id.as_str())?;
            }
            if let Some(outcome) = user_guard.check_weekly(user.usd_limits.weekly, now_utc) {
                reject_if_failed(&outcome, "user_weekly_usd", user.id.as_str())?;
            }

            // 12/13. Monthly USD.
            if let Some(outcome) = key_guard.check_monthly(key.usd_limits.monthly, now_utc) {
                reject_if_failed(&outcome, "key_monthly_usd", key.id.as_str())?;
            }
            if let Some(outcome) = user_guard.check_monthly(user.usd_limits.monthly, now_utc) {
                reject_if_failed(&outcome, "user_monthly_usd", user.id.as_str())?;
            }
        }

        Ok(RateLimitReservation { _session: session_reservation, _agent: agent_reservation })
    }

    /// Records completed spend against both the key and the user ledger. Called once the
    /// upstream response (and therefore its cost) is known.
    pub fn record_spend(&self, key_id: &KeyId, user_id: &UserId, amount: f64, at: DateTime<Utc>) {
        if let Some(ledger) = self.key_usd.get(key_id) {
            ledger.lock().unwrap().record_spend(amount, at);
        }
        if let Some(ledger) = self.user_usd.get(user_id) {
            ledger.lock().unwrap().record_spend(amount, at);
        }
    }
}

impl Default for RateLimitGuard {
    fn default() -> Self {
        Self::new()
    }
}

fn reject_if_failed(
    outcome: &crate::usd::UsdCheckOutcome,
    limit_type: &str,
    resource_id: &str,
) -> Result<(), ClientError> {
    if outcome.passed {
        Ok(())
    } else {
        Err(ClientError::RateLimit(RateLimitDetail {
            limit_type: limit_type.into(),
            current: outcome.current,
            limit: outcome.limit,
            reset_time: outcome.reset_time,
            resource_id: resource_id.into(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forward_core::{AgentPatterns, CacheTtlPreference, ConcurrencyLimits, DailyReset, UsdLimits};

    fn user(id: &str) -> User {
        User { id: UserId::from(id), usd_limits: UsdLimits::default(), concurrency: ConcurrencyLimits::default(), rpm: None }
    }

    fn key(id: &str, owner: &str) -> Key {
        Key {
            id: KeyId::from(id),
            owning_user: UserId::from(owner),
            usd_limits: UsdLimits::default(),
            daily_reset: DailyReset { mode: DailyResetMode::Rolling24h, time_of_day: None },
            concurrency: ConcurrencyLimits::default(),
            rpm: None,
            agent_patterns: AgentPatterns::default(),
            cache_ttl_preference: CacheTtlPreference::Inherit,
        }
    }

    #[test]
    fn admits_when_no_limits_configured() {
        let guard = RateLimitGuard::new();
        let u = user("u1");
        let k = key("k1", "u1");
        assert!(guard.admit(&k, &u, "agent-a", Instant::now(), Utc::now()).is_ok());
    }

    #[test]
    fn key_total_usd_cap_short_circuits_before_later_checks() {
        let guard = RateLimitGuard::new();
        let mut k = key("k1", "u1");
        k.usd_limits.total = Some(1.0);
        let u = user("u1");

        guard.record_spend(&k.id, &u.id, 5.0, Utc::now());
        let err = guard.admit(&k, &u, "agent-a", Instant::now(), Utc::now()).unwrap_err();
        match err {
            ClientError::RateLimit(detail) => assert_eq!(detail.limit_type, "key_total_usd"),
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[test]
    fn session_reservation_releases_on_drop_freeing_the_slot() {
        let guard = RateLimitGuard::new();
        let mut k = key("k1", "u1");
        k.concurrency.sessions = Some(1);
        let u = user("u1");

        let r1 = guard.admit(&k, &u, "agent-a", Instant::now(), Utc::now()).unwrap();
        assert!(guard.admit(&k, &u, "agent-b", Instant::now(), Utc::now()).is_err());
        drop(r1);
        assert!(guard.admit(&k, &u, "agent-b", Instant::now(), Utc::now()).is_ok());
    }

    #[test]
    fn unset_key_concurrency_inherits_user_limit() {
        let guard = RateLimitGuard::new();
        let k = key("k1", "u1");
        let mut u = user("u1");
        u.concurrency.distinct_client_agents = Some(1);

        let _r1 = guard.admit(&k, &u, "agent-a", Instant::now(), Utc::now()).unwrap();
        let err = guard.admit(&k, &u, "agent-b", Instant::now(), Utc::now()).unwrap_err();
        match err {
            ClientError::RateLimit(detail) => assert_eq!(detail.limit_type, "key_user_distinct_agent_concurrency"),
            other => panic!("expected rate limit, got {other:?}"),
        }
    }
}
