//! C11: the per-request append-only decision chain (§3, §4.9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{EndpointId, ProviderId};

/// Snapshot of a breaker's coarse state, carried on each decision-chain entry so an
/// auditor can see what the breaker believed at the moment of the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitStateSnapshot {
    Closed,
    Open,
    HalfOpen,
}

/// The enumerated reasons of §4.9. Exactly one terminal entry per request determines
/// the final disposition (§8 invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionReason {
    RequestSuccess,
    RetrySuccess,
    RetryFailed,
    SystemError,
    ResourceNotFound,
    ClientErrorNonRetryable,
    StrictBlockedLegacyFallback,
    Http2Fallback,
}

impl DecisionReason {
    /// Whether this reason is a valid *terminal* disposition (§8 invariant). The two
    /// bookkeeping-only reasons never terminate a request on their own.
    pub fn is_terminal_disposition(self) -> bool {
        !matches!(
            self,
            DecisionReason::StrictBlockedLegacyFallback | DecisionReason::Http2Fallback
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub error_type: Option<String>,
    pub message: Option<String>,
}

/// One append-only audit row (§3 "Decision-Chain Entry").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionChainEntry {
    pub timestamp: DateTime<Utc>,
    pub provider_id: Option<ProviderId>,
    pub endpoint_id: Option<EndpointId>,
    pub reason: DecisionReason,
    pub attempt_number: u32,
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
    pub circuit_state_snapshot: Option<CircuitStateSnapshot>,
    pub error_details: ErrorDetails,
}

/// The per-session accumulator. Invariant: at most one entry per
/// `(attempt_number, provider_id)` pair (§3), enforced by construction since the
/// forwarder appends exactly one entry per attempt before branching.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionChain {
    entries: Vec<DecisionChainEntry>,
}

impl DecisionChain {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn append(&mut self, entry: DecisionChainEntry) {
        debug_assert!(
            !self.entries.iter().any(|existing| existing.attempt_number
                == entry.attempt_number
                && existing.provider_id == entry.provider_id),
            "duplicate decision-chain entry for the same (attempt, provider)"
        );
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[DecisionChainEntry] {
        &self.entries
    }

    /// The reason of the last appended entry, which determines the request's terminal
    /// disposition (§3 invariant (b)).
    pub fn terminal_reason(&self) -> Option<DecisionReason> {
        self.entries.last().map(|entry| entry.reason)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
