//! The write side of the persistence store the core treats as an external collaborator
//! (§1, §6 "Persistence store"): message-requests and sessions, write-only from the
//! core. The actual store (schema, durability) lives outside this repository's remit;
//! this is the thin `AuditSink` the forwarder writes through, with a `tracing`-backed
//! implementation standing in for it locally.

use forward_core::DecisionChain;
use forward_rectify::SpecialSettingAudit;
use uuid::Uuid;

/// One completed request's write shape (§6): error message, status, duration,
/// provider-chain, special-settings, and the inbound/outbound metadata the real
/// persistence store is expected to record.
pub struct MessageRequestRecord<'a> {
    pub request_id: Uuid,
    pub session_id: &'a str,
    pub status: u16,
    pub duration_ms: u64,
    pub decision_chain: &'a DecisionChain,
    pub special_settings: &'a [SpecialSettingAudit],
}

pub trait AuditSink: Send + Sync {
    /// Persists one completed request. Called fire-and-forget (§5): correctness never
    /// depends on this completing before the response reaches the client.
    fn record_message_request(&self, record: MessageRequestRecord<'_>);
}

/// Logs the audit row at `info` instead of writing it anywhere durable. Adequate for the
/// demo binary; a production deployment swaps this for a real store without touching the
/// forwarder, which only ever sees the `AuditSink` trait.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record_message_request(&self, record: MessageRequestRecord<'_>) {
        tracing::info!(
            request_id = %record.request_id,
            session_id = record.session_id,
            status = record.status,
            duration_ms = record.duration_ms,
            decision_chain_len = record.decision_chain.len(),
            terminal_reason = ?record.decision_chain.terminal_reason(),
            special_settings = record.special_settings.len(),
            "message request completed"
        );
    }
}
