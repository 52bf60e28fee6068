//! The error taxonomy of §7, plus the `classify`-facing [`ErrorCategory`] of §4.1.
//!
//! Two levels, deliberately kept apart: [`ErrorCategory`] is what the classifier (C1)
//! produces from a transport-level failure; [`ClientError`] is what the response builder
//! (C12) renders to the client. The forwarder maps categories to client errors only at
//! the edges (terminal disposition, or full provider exhaustion) — never in between.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The five buckets §4.1 classifies every transport/upstream error into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The client closed the connection. Never retried, never counted to a breaker.
    ClientAbort,
    /// The upstream rejected the request on its own terms (prompt too long, content
    /// filter, etc). Never retried, never counted to a breaker.
    NonRetryableClient,
    /// Upstream responded 404. Retried on the same provider until budget exhaustion.
    ResourceNotFound,
    /// Upstream returned a 4xx/5xx (other than 404), an empty response, or timed out.
    ProviderError,
    /// DNS failure, connection refused, reset, or any other transport-layer error.
    SystemError,
}

impl ErrorCategory {
    /// Whether an outcome in this category should ever increment a breaker's failure
    /// count (subject to the per-deployment flag for `SystemError`, see
    /// `EngineConfig::count_network_errors_to_breaker`).
    pub fn breaker_eligible(self) -> bool {
        matches!(self, ErrorCategory::ProviderError | ErrorCategory::SystemError)
    }
}

/// A best-effort parse of an upstream error body (§7 "Body extraction").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamErrorBody {
    pub message: Option<String>,
    pub error_type: Option<String>,
    pub raw: Option<String>,
}

/// An upstream HTTP failure, synthesized timeout (524), or empty-response sentinel.
#[derive(Debug, Clone, Error)]
#[error("upstream error: status={status} message={}", body.message.clone().unwrap_or_default())]
pub struct UpstreamError {
    pub status: u16,
    pub body: UpstreamErrorBody,
}

impl UpstreamError {
    pub fn is_timeout(&self) -> bool {
        self.status == 524
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Status `0` is the sentinel for an empty-response failure (§4.1): the upstream
    /// closed the connection without sending a status line at all.
    pub fn is_empty_response(&self) -> bool {
        self.status == 0
    }
}

/// A transport-layer failure below the HTTP-response level (DNS, TCP reset, etc).
#[derive(Debug, Clone, Error)]
#[error("transport error: {message}")]
pub struct TransportError {
    pub message: String,
    pub aborted_by_client: bool,
    /// The underlying error's type name, when the transport exposes one (e.g.
    /// `AbortError`, `ResponseAborted`) — used by the classifier's client-abort rule.
    pub error_name: Option<String>,
}

/// The raw error a vendor call can fail with, before classification.
#[derive(Debug, Clone, Error)]
pub enum ForwardError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("client aborted the request")]
    ClientAbort,
}

/// Detail attached to a `rate_limit` error (§4.3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitDetail {
    pub limit_type: String,
    pub current: f64,
    pub limit: f64,
    /// `None` for rolling windows, which report no reset time (§4.3).
    pub reset_time: Option<DateTime<Utc>>,
    pub resource_id: String,
}

impl RateLimitDetail {
    pub fn retry_after(&self) -> Duration {
        match self.reset_time {
            Some(reset) => {
                let now = Utc::now();
                if reset > now {
                    (reset - now).to_std().unwrap_or(Duration::from_secs(1))
                } else {
                    Duration::from_secs(1)
                }
            }
            None => Duration::from_secs(60),
        }
    }
}

/// The taxonomy observable to the client (§7). This is what `ErrorRenderer` (C12)
/// turns into an HTTP status and envelope; it is never constructed mid-forwarding.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("rate limited: {0:?}")]
    RateLimit(RateLimitDetail),
    #[error("client aborted")]
    ClientAbort,
    #[error("client input error: {message}")]
    ClientInputError { message: String },
    #[error("provider error: {status} {message}")]
    ProviderError { status: u16, message: String },
    #[error("resource not found")]
    ResourceNotFound,
    #[error("upstream timeout")]
    TimeoutError,
    #[error("all providers temporarily unavailable")]
    AllProvidersUnavailable,
}

impl ClientError {
    /// HTTP status selection (§6, §7). `524`/provider identity never leaks through the
    /// exhaustion path — it always renders as a generic `503`.
    pub fn status_code(&self) -> u16 {
        match self {
            ClientError::RateLimit(_) => 429,
            ClientError::ClientAbort => 499,
            ClientError::ClientInputError { .. } => 400,
            ClientError::ProviderError { status, .. } => *status,
            ClientError::ResourceNotFound => 404,
            ClientError::TimeoutError => 524,
            ClientError::AllProvidersUnavailable => 503,
        }
    }

    /// The wire-bit-stable envelope `{ "error": { "type", "message" }, "status" }` (§6).
    pub fn envelope(&self) -> serde_json::Value {
        let (kind, message) = match self {
            ClientError::RateLimit(detail) => (
                "rate_limit",
                format!(
                    "rate limit exceeded for {}: {} of {}",
                    detail.limit_type, detail.current, detail.limit
                ),
            ),
            ClientError::ClientAbort => ("client_abort", "client aborted the request".to_string()),
            ClientError::ClientInputError { message } => {
                ("client_input_error", message.clone())
            }
            ClientError::ProviderError { message, .. } => ("provider_error", message.clone()),
            ClientError::ResourceNotFound => {
                ("resource_not_found", "resource not found".to_string())
            }
            ClientError::TimeoutError => ("timeout_error", "upstream request timed out".to_string()),
            ClientError::AllProvidersUnavailable => (
                "all_providers_unavailable",
                "All providers temporarily unavailable, try again later".to_string(),
            ),
        };
        serde_json::json!({
            "error": { "type": kind, "message": message },
            "status": self.status_code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_error_never_leaks_provider_identity() {
        let err = ClientError::AllProvidersUnavailable;
        let body = err.envelope();
        let message = body["error"]["message"].as_str().unwrap();
        assert_eq!(message, "All providers temporarily unavailable, try again later");
        assert!(!message.contains("prov-"));
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn rate_limit_with_no_reset_time_uses_default_retry_after() {
        let detail = RateLimitDetail {
            limit_type: "key_5h_usd".to_string(),
            current: 10.0,
            limit: 5.0,
            reset_time: None,
            resource_id: "key-1".to_string(),
        };
        assert_eq!(detail.retry_after(), Duration::from_secs(60));
    }
}
