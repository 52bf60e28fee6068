//! The outbound HTTP client interface the forwarder drives (§6): `request(url, {method,
//! headers, body, signal, dispatcher, headersTimeout, bodyTimeout}) -> {status, headers,
//! bodyStream}`. Kept as a trait so the engine can be exercised against a mock transport
//! in tests instead of a real socket.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use forward_core::TransportError;
use futures_util::Stream;
use http::{HeaderMap, Method};
use tokio_util::sync::CancellationToken;

use crate::agent_pool::AgentKey;

/// A response body as a pull-based stream of already-decoded chunks. Upstream read
/// errors never surface here as `Err` — the adapter that produces this stream (gzip
/// decode, or the raw reqwest byte stream) converts them to a graceful end-of-stream
/// per §6, so consumers only ever see `None` to mean "done, possibly early".
pub type BodyStream = Pin<Box<dyn Stream<Item = Bytes> + Send>>;

/// Everything one outbound attempt needs, pre-rectified and addressed at a single
/// endpoint URL (the forwarder resolves endpoint + rectification before calling this).
pub struct OutboundRequest {
    pub url: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub agent_key: AgentKey,
    /// First-byte-streaming timeout for SSE requests, total-elapsed for non-streaming
    /// (§5 "Timeouts"). The client treats this as "time to first response byte"; the
    /// forwarder is responsible for picking the right duration for the request shape.
    pub headers_timeout: Duration,
    /// Streaming-idle timeout once the body is flowing (§5).
    pub body_timeout: Duration,
    /// The composed cancellation token joining the response-timeout controller and the
    /// client-abort signal (§5 "Cancellation").
    pub cancellation: CancellationToken,
}

pub struct OutboundResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn request(&self, request: OutboundRequest) -> Result<OutboundResponse, TransportError>;
}
