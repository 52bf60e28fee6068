//! The inbound HTTP surface (§6): accepts the small set of standard vendor-facing paths
//! plus MCP passthrough, authenticates the caller, runs the rate-limit guard (C4), drives
//! the forwarder (C9), and renders either the upstream response or the §7 error envelope.

use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use forward_core::{ClientError, DecisionChain, ProviderType, RequestContext, RequestKind, Session};
use forward_engine::{FinalResponse, ForwardInput, ForwardOutcome};
use forward_ratelimit::RateLimitReservation;
use forward_rectify::SpecialSettingAudit;
use futures_util::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::audit::MessageRequestRecord;
use crate::state::AppState;

/// Maps an inbound path to its dispatch kind and dialect (§6). Paths outside the
/// standard set are MCP passthrough: opaque vendor-native traffic, relaxed endpoint
/// resolution, no vendor-type breaker (§4.7 step 1.3).
fn classify_path(path: &str, headers: &HeaderMap) -> (RequestKind, ProviderType) {
    if headers.get("x-forward-proxy-probe").is_some() {
        return (RequestKind::Probe, ProviderType::AnthropicLike);
    }
    match path {
        "/v1/messages/count_tokens" => (RequestKind::CountTokens, ProviderType::AnthropicLike),
        "/v1/messages" => (RequestKind::Standard, ProviderType::AnthropicLike),
        "/v1/responses" => (RequestKind::Standard, ProviderType::CodexLike),
        "/v1/chat/completions" | "/v1/models" => (RequestKind::Standard, ProviderType::OpenAiCompatible),
        _ => {
            // MCP passthrough has no fixed dialect; the admin-configured client tells us
            // which vendor family it expects via this header. Defaults to
            // Anthropic-like, the most common MCP host today.
            let provider_type = headers
                .get("x-provider-type")
                .and_then(|v| v.to_str().ok())
                .map(provider_type_from_header)
                .unwrap_or(ProviderType::AnthropicLike);
            (RequestKind::Passthrough, provider_type)
        }
    }
}

fn provider_type_from_header(value: &str) -> ProviderType {
    match value {
        "codex" => ProviderType::CodexLike,
        "gemini" => ProviderType::GeminiLike,
        "openai-compatible" => ProviderType::OpenAiCompatible,
        _ => ProviderType::AnthropicLike,
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }
    headers.get("x-api-key").and_then(|v| v.to_str().ok()).map(str::to_string)
}

fn render_error(error: &ClientError) -> Response {
    let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = axum::Json(error.envelope()).into_response();
    *response.status_mut() = status;
    if let ClientError::RateLimit(detail) = error {
        let secs = detail.retry_after().as_secs().to_string();
        if let Ok(value) = axum::http::HeaderValue::from_str(&secs) {
            response.headers_mut().insert("retry-after", value);
        }
    }
    response
}

/// The single handler every route in `main.rs` dispatches to; `classify_path` is what
/// differentiates standard dialects from MCP passthrough for a given path.
pub async fn handle_request(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let start = Instant::now();
    let path = uri.path().to_string();
    let (kind, original_format) = classify_path(&path, &headers);

    let Some(secret) = extract_bearer(&headers) else {
        return render_error(&ClientError::ClientInputError { message: "missing bearer credential".to_string() });
    };
    let Some((key, user)) = state.registry.authenticate(&secret) else {
        return render_error(&ClientError::ClientInputError { message: "invalid API key".to_string() });
    };

    let parsed_body: Value = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(_) => {
                return render_error(&ClientError::ClientInputError {
                    message: "request body is not valid JSON".to_string(),
                });
            }
        }
    };
    let model = parsed_body.get("model").and_then(Value::as_str).map(str::to_string);
    let client_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let reservation = if kind.is_probe() {
        None
    } else {
        match state.guard.admit(&key, &user, &client_agent, Instant::now(), Utc::now()) {
            Ok(reservation) => Some(reservation),
            Err(err) => return render_error(&err),
        }
    };

    let session = Session::new(
        key.id.clone(),
        user.id.clone(),
        RequestContext { method, path, headers, body: parsed_body, original_format, kind },
    );
    let session_id = session.session_id.clone();
    let request_id = session.request_id;

    // axum does not surface a client-disconnect future to the handler without extra
    // service-level wiring; this token exists so the composed cancellation point §5
    // describes has somewhere to attach once that wiring is added.
    let client_abort = CancellationToken::new();

    let input = ForwardInput {
        session: &session,
        key: &key,
        providers: state.registry.providers(),
        endpoints: state.registry.endpoints(),
        client_agent: &client_agent,
        model: model.as_deref(),
        client_abort,
    };

    let outcome = state.forwarder.forward(input).await;

    match outcome {
        Ok(ForwardOutcome { response, decision_chain, audits }) => {
            render_success(state, response, decision_chain, audits, reservation, request_id, session_id, start)
        }
        Err(client_error) => {
            drop(reservation);
            state.audit.record_message_request(MessageRequestRecord {
                request_id,
                session_id: &session_id,
                status: client_error.status_code(),
                duration_ms: start.elapsed().as_millis() as u64,
                decision_chain: &DecisionChain::new(),
                special_settings: &[],
            });
            render_error(&client_error)
        }
    }
}

fn render_success(
    state: AppState,
    response: FinalResponse,
    decision_chain: DecisionChain,
    audits: Vec<SpecialSettingAudit>,
    reservation: Option<RateLimitReservation>,
    request_id: uuid::Uuid,
    session_id: String,
    start: Instant,
) -> Response {
    match response {
        FinalResponse::NonStreaming { status, headers, body } => {
            drop(reservation);
            state.audit.record_message_request(MessageRequestRecord {
                request_id,
                session_id: &session_id,
                status,
                duration_ms: start.elapsed().as_millis() as u64,
                decision_chain: &decision_chain,
                special_settings: &audits,
            });
            let mut built = Response::builder().status(status);
            if let Some(builder_headers) = built.headers_mut() {
                *builder_headers = headers;
            }
            built.body(Body::from(body)).unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        FinalResponse::Streaming { status, headers, body, finalizer } => {
            // §4.8: success is not recorded and the reservation is not released until the
            // stream is observed to end cleanly; both are settled once `ctx.inner` ends.
            let provider = finalizer
                .peek()
                .and_then(|deferred| state.registry.providers().iter().find(|p| p.id == deferred.provider_id).cloned());

            let ctx = StreamCtx {
                inner: body,
                scanner: forward_engine::SseTerminalErrorScanner::new(),
                decision_chain,
                audits,
                reservation,
                request_id,
                session_id,
                start,
                state,
                provider,
                finalizer,
                status,
            };
            let scanned = futures_util::stream::unfold(Some(ctx), |slot| async move {
                let mut ctx = slot?;
                match ctx.inner.next().await {
                    Some(chunk) => {
                        ctx.scanner.observe(&chunk);
                        Some((chunk, Some(ctx)))
                    }
                    None => {
                        ctx.finalize();
                        None
                    }
                }
            });

            let mut built = Response::builder().status(status);
            if let Some(builder_headers) = built.headers_mut() {
                *builder_headers = headers;
            }
            built
                .body(Body::from_stream(scanned.map(Ok::<_, std::io::Error>)))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}

/// The state threaded through the streaming `unfold`: one settlement, performed exactly
/// once when `inner` yields its final `None` (§4.8's one-shot consumption).
struct StreamCtx {
    inner: forward_transport::BodyStream,
    scanner: forward_engine::SseTerminalErrorScanner,
    decision_chain: DecisionChain,
    audits: Vec<SpecialSettingAudit>,
    reservation: Option<RateLimitReservation>,
    request_id: uuid::Uuid,
    session_id: String,
    start: Instant,
    state: AppState,
    provider: Option<forward_core::Provider>,
    finalizer: Arc<forward_engine::StreamingFinalizer>,
    status: u16,
}

impl StreamCtx {
    fn finalize(&mut self) {
        if let Some(provider) = &self.provider {
            self.state.forwarder.finalize_stream(
                &self.finalizer,
                provider,
                self.scanner.saw_terminal_error(),
                &mut self.decision_chain,
            );
        }
        self.reservation.take();
        self.state.audit.record_message_request(MessageRequestRecord {
            request_id: self.request_id,
            session_id: &self.session_id,
            status: self.status,
            duration_ms: self.start.elapsed().as_millis() as u64,
            decision_chain: &self.decision_chain,
            special_settings: &self.audits,
        });
    }
}
