//! Breaker observability events, emitted by the registry (not the bare state machine)
//! so listener dispatch stays independent of the pure state-transition logic in
//! [`crate::state`] — mirrors the split between `Circuit` and `CircuitBreakerEvent` in
//! `tower-resilience-circuitbreaker`.

use std::time::Instant;

use forward_core::{CircuitStateSnapshot, EngineEvent};

#[derive(Debug, Clone, Copy)]
pub enum BreakerEventKind {
    StateTransition {
        from: CircuitStateSnapshot,
        to: CircuitStateSnapshot,
    },
    CallRejected,
}

#[derive(Debug)]
pub struct BreakerEvent {
    pub name: String,
    pub timestamp: Instant,
    pub kind: BreakerEventKind,
}

impl EngineEvent for BreakerEvent {
    fn event_type(&self) -> &'static str {
        match self.kind {
            BreakerEventKind::StateTransition { .. } => "breaker_state_transition",
            BreakerEventKind::CallRejected => "breaker_call_rejected",
        }
    }

    fn timestamp(&self) -> Instant {
        self.timestamp
    }
}
