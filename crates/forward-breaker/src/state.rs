//! The per-entity breaker state machine (§3 "Breaker State", §4.2), grounded in
//! `tower-resilience-circuitbreaker`'s `Circuit` but simplified to the spec's plain
//! failure-count threshold instead of a sliding-window failure rate: §4.2 trips on
//! `failure-count >= threshold`, not on a windowed rate.

use std::time::{Duration, Instant};

use forward_core::BreakerTuning;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl From<CircuitState> for forward_core::CircuitStateSnapshot {
    fn from(state: CircuitState) -> Self {
        match state {
            CircuitState::Closed => forward_core::CircuitStateSnapshot::Closed,
            CircuitState::Open => forward_core::CircuitStateSnapshot::Open,
            CircuitState::HalfOpen => forward_core::CircuitStateSnapshot::HalfOpen,
        }
    }
}

/// One entity's breaker state (§3 invariants a/b/c):
/// (a) open ⇒ `open_until` > now; (b) half-open ⇒ failure_count never exceeds threshold
/// without transitioning to open; (c) `manual_open` takes precedence over timers.
#[derive(Debug)]
pub struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    open_until: Option<Instant>,
    half_open_success_count: u32,
    manual_open: bool,
}

impl Default for BreakerState {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_at: None,
            open_until: None,
            half_open_success_count: 0,
            manual_open: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub open_until: Option<Instant>,
    pub half_open_success_count: u32,
}

impl BreakerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state,
            failure_count: self.failure_count,
            open_until: self.open_until,
            half_open_success_count: self.half_open_success_count,
        }
    }

    /// `isOpen` of §4.2: true iff open-and-unexpired, or manually opened.
    pub fn is_open(&self, now: Instant) -> bool {
        if self.manual_open {
            return true;
        }
        matches!(self.state, CircuitState::Open) && self.open_until.map(|u| now < u).unwrap_or(false)
    }

    /// Lazily transitions Open -> HalfOpen on the first access past `open_until`
    /// (§4.2 "open -> half-open: on first probeAccess after open-until"), then reports
    /// whether the caller may proceed.
    pub fn try_acquire(&mut self, tuning: &BreakerTuning, now: Instant, name: &str) -> bool {
        if self.manual_open {
            return false;
        }
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let expired = self.open_until.map(|u| now >= u).unwrap_or(true);
                if expired {
                    self.transition_to(CircuitState::HalfOpen, name);
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                self.half_open_success_count < tuning.half_open_success_threshold
                    || self.failure_count == 0
            }
        }
    }

    /// `recordFailure` of §4.2. Probe requests must never reach this (GLOSSARY); the
    /// caller is responsible for that exclusion (§8 invariant: "a probe request never
    /// mutates any breaker's failure count").
    pub fn record_failure(&mut self, tuning: &BreakerTuning, now: Instant, name: &str) {
        self.last_failure_at = Some(now);
        match self.state {
            CircuitState::HalfOpen => {
                self.open_for(tuning.open_duration, now, name);
            }
            CircuitState::Closed | CircuitState::Open => {
                self.failure_count += 1;
                if self.failure_count >= tuning.failure_threshold {
                    self.open_for(tuning.open_duration, now, name);
                }
            }
        }
    }

    /// `recordSuccess` of §4.2.
    pub fn record_success(&mut self, tuning: &BreakerTuning, name: &str) {
        match self.state {
            CircuitState::HalfOpen => {
                self.half_open_success_count += 1;
                if self.half_open_success_count >= tuning.half_open_success_threshold {
                    self.transition_to(CircuitState::Closed, name);
                }
            }
            CircuitState::Closed => {
                self.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn force_open(&mut self, name: &str) {
        self.manual_open = true;
        self.transition_to(CircuitState::Open, name);
    }

    pub fn force_closed(&mut self, name: &str) {
        self.manual_open = false;
        self.transition_to(CircuitState::Closed, name);
    }

    pub fn reset(&mut self, name: &str) {
        self.manual_open = false;
        self.transition_to(CircuitState::Closed, name);
    }

    fn open_for(&mut self, duration: Duration, now: Instant, name: &str) {
        self.open_until = Some(now + duration);
        self.transition_to(CircuitState::Open, name);
    }

    fn transition_to(&mut self, state: CircuitState, name: &str) {
        if self.state == state {
            return;
        }
        let from = self.state;
        self.state = state;
        if state != CircuitState::Open {
            self.open_until = None;
        }
        if state == CircuitState::HalfOpen || state == CircuitState::Closed {
            self.failure_count = 0;
            self.half_open_success_count = 0;
        }
        tracing::info!(breaker = name, ?from, to = ?state, "circuit state transition");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning() -> BreakerTuning {
        BreakerTuning {
            failure_threshold: 2,
            open_duration: Duration::from_millis(50),
            half_open_success_threshold: 1,
        }
    }

    #[test]
    fn closed_to_open_after_threshold_failures() {
        let mut breaker = BreakerState::new();
        let t = tuning();
        let now = Instant::now();
        breaker.record_failure(&t, now, "p1");
        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
        breaker.record_failure(&t, now, "p1");
        assert_eq!(breaker.snapshot().state, CircuitState::Open);
    }

    #[test]
    fn open_transitions_to_half_open_after_wait_duration() {
        let mut breaker = BreakerState::new();
        let t = tuning();
        let now = Instant::now();
        breaker.record_failure(&t, now, "p1");
        breaker.record_failure(&t, now, "p1");
        assert!(!breaker.try_acquire(&t, now, "p1"));

        let later = now + Duration::from_millis(60);
        assert!(breaker.try_acquire(&t, later, "p1"));
        assert_eq!(breaker.snapshot().state, CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let mut breaker = BreakerState::new();
        let t = tuning();
        let now = Instant::now();
        breaker.record_failure(&t, now, "p1");
        breaker.record_failure(&t, now, "p1");
        let later = now + Duration::from_millis(60);
        breaker.try_acquire(&t, later, "p1");
        breaker.record_failure(&t, later, "p1");
        assert_eq!(breaker.snapshot().state, CircuitState::Open);
    }

    #[test]
    fn half_open_success_closes_circuit() {
        let mut breaker = BreakerState::new();
        let t = tuning();
        let now = Instant::now();
        breaker.record_failure(&t, now, "p1");
        breaker.record_failure(&t, now, "p1");
        let later = now + Duration::from_millis(60);
        breaker.try_acquire(&t, later, "p1");
        breaker.record_success(&t, "p1");
        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
    }

    #[test]
    fn manual_open_bypasses_timers() {
        let mut breaker = BreakerState::new();
        let t = tuning();
        let now = Instant::now();
        breaker.force_open("p1");
        let later = now + Duration::from_secs(3600);
        assert!(breaker.is_open(later));
        assert!(!breaker.try_acquire(&t, later, "p1"));
    }

    #[test]
    fn failure_count_never_decreases_while_open_and_unexpired() {
        let mut breaker = BreakerState::new();
        let t = tuning();
        let now = Instant::now();
        breaker.record_failure(&t, now, "p1");
        breaker.record_failure(&t, now, "p1");
        let before = breaker.snapshot().failure_count;
        // success attempts while still open must not reduce the count before half-open
        breaker.record_success(&t, "p1");
        let after = breaker.snapshot().failure_count;
        assert!(after >= before || breaker.snapshot().state != CircuitState::Open);
    }
}
