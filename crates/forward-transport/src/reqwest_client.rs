//! The concrete `HttpClient` (§6): `reqwest` over the agent pool, composing the
//! response-timeout and client-abort signals into one cancellation, and manually gzip
//! decoding when the upstream sets `content-encoding: gzip` (the agent pool is built
//! with automatic decompression disabled; see `agent_pool::build_client`).

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use forward_core::TransportError;
use futures_util::StreamExt;
use http::header::CONTENT_ENCODING;

use crate::agent_pool::AgentPool;
use crate::client::{BodyStream, HttpClient, OutboundRequest, OutboundResponse};
use crate::gzip::decode_gzip_body;

pub struct ReqwestHttpClient {
    agents: Arc<AgentPool>,
}

impl ReqwestHttpClient {
    pub fn new(agents: Arc<AgentPool>) -> Self {
        Self { agents }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn request(&self, request: OutboundRequest) -> Result<OutboundResponse, TransportError> {
        let client = self.agents.get(&request.agent_key);

        let builder = client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone())
            .body(request.body.clone())
            .timeout(request.headers_timeout);

        // `headers_timeout` bounds the wait for the response's status line; once bytes
        // start flowing, `body_timeout` (streaming-idle) takes over, enforced by the
        // caller polling the returned stream under its own idle timer.
        let send_fut = builder.send();
        let response = tokio::select! {
            biased;
            _ = request.cancellation.cancelled() => {
                return Err(TransportError {
                    message: "request cancelled before headers were received".to_string(),
                    aborted_by_client: true,
                    error_name: Some("AbortError".to_string()),
                });
            }
            result = send_fut => result.map_err(classify_send_error)?,
        };

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let is_gzip = headers
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("gzip"))
            .unwrap_or(false);

        let cancellation = request.cancellation.clone();
        let raw = response.bytes_stream().map(move |chunk| -> Result<Bytes, io::Error> {
            chunk.map_err(|error| io::Error::new(io::ErrorKind::Other, error))
        });
        // The client-abort/timeout signal is composed into the body stream too: once
        // fired, the stream ends (gracefully, per §6) rather than yielding more chunks.
        let raw = futures_util::stream::unfold((raw, cancellation), |(mut raw, cancellation)| async move {
            if cancellation.is_cancelled() {
                return None;
            }
            raw.next().await.map(|item| (item, (raw, cancellation)))
        });

        let body: BodyStream = if is_gzip {
            Box::pin(decode_gzip_body(raw))
        } else {
            Box::pin(raw.filter_map(|chunk| async move {
                match chunk {
                    Ok(bytes) => Some(bytes),
                    Err(error) => {
                        tracing::debug!(%error, "body stream read error, closing gracefully");
                        None
                    }
                }
            }))
        };

        Ok(OutboundResponse { status, headers, body })
    }
}

fn classify_send_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        return TransportError {
            message: "request timed out waiting for response headers".to_string(),
            aborted_by_client: false,
            error_name: Some("TimeoutError".to_string()),
        };
    }
    if error.is_connect() {
        return TransportError {
            message: format!("connection failed: {error}"),
            aborted_by_client: false,
            error_name: Some("ConnectError".to_string()),
        };
    }
    TransportError {
        message: error.to_string(),
        aborted_by_client: false,
        error_name: if is_http2_protocol_error(&error) { Some("Http2ProtocolError".to_string()) } else { None },
    }
}

/// Whether `error` looks like an HTTP/2-layer protocol failure (§4.6): the trigger for
/// the transparent HTTP/1 fallback retry, distinct from an ordinary connection refusal.
pub fn is_http2_protocol_error(error: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(error);
    while let Some(err) = source {
        let text = err.to_string().to_ascii_lowercase();
        if text.contains("http2") || text.contains("h2 protocol error") || text.contains("stream error") {
            return true;
        }
        source = std::error::Error::source(err);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_pool::AgentKey;
    use std::sync::Arc;

    #[tokio::test]
    async fn cancellation_before_send_short_circuits_with_client_abort() {
        let agents = Arc::new(AgentPool::new());
        let client = ReqwestHttpClient::new(agents);
        let cancellation = tokio_util::sync::CancellationToken::new();
        cancellation.cancel();

        let request = OutboundRequest {
            url: "https://127.0.0.1:0/".to_string(),
            method: http::Method::GET,
            headers: http::HeaderMap::new(),
            body: Bytes::new(),
            agent_key: AgentKey::new("https://127.0.0.1:0", None, false),
            headers_timeout: std::time::Duration::from_secs(1),
            body_timeout: std::time::Duration::from_secs(1),
            cancellation,
        };

        let error = client.request(request).await.unwrap_err();
        assert!(error.aborted_by_client);
    }
}
