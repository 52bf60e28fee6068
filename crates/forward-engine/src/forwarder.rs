//! The forwarder state machine (C9, §4.7): the outer provider-switching loop wrapping
//! the inner per-provider attempt loop, composing every other component (C1-C8, C10).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;
use forward_breaker::{AllTimeoutsTracker, BreakerRegistry, VendorTypeBreaker, VendorTypeKey};
use forward_classify::{classify_async, ErrorRuleDetector};
use forward_core::{
    CircuitStateSnapshot, ClientError, DecisionChain, DecisionChainEntry, DecisionReason, Endpoint, EndpointId,
    ErrorCategory, ErrorDetails, ForwardError, Key, Provider, ProviderId, RequestKind, Session, TransportError,
    UpstreamError, UpstreamErrorBody,
};
use forward_rectify::{
    is_invalid_thinking_signature_error, is_thinking_budget_too_small_error, rectify, raise_thinking_budget,
    strip_thinking_blocks, SpecialSettingAudit,
};
use forward_route::{pick_endpoints, pick_provider, ResolveRequest};
use forward_transport::{AgentKey, AgentPool, HttpClient, OutboundRequest};
use http::HeaderMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::{clamp_max_attempts, EngineConfig, INNER_LOOP_RETRY_DELAY, MAX_PROVIDER_SWITCHES, TIMEOUT_STATUS};
use crate::response::parse_upstream_error_body;
use crate::streaming::{empty_response_reason, is_streaming_response, DeferredFinalization, StreamingFinalizer};

/// The body of a settled response, ready for the inbound HTTP layer to relay to the
/// client. Streaming responses carry their deferred-finalization handle; the caller must
/// consume it once the client-facing stream ends (see [`Forwarder::finalize_stream`]).
pub enum FinalResponse {
    NonStreaming { status: u16, headers: HeaderMap, body: Bytes },
    Streaming { status: u16, headers: HeaderMap, body: forward_transport::BodyStream, finalizer: Arc<StreamingFinalizer> },
}

pub struct ForwardOutcome {
    pub response: FinalResponse,
    pub decision_chain: DecisionChain,
    pub audits: Vec<SpecialSettingAudit>,
}

/// Everything one `forward` call needs beyond the engine's own process-wide state.
pub struct ForwardInput<'a> {
    pub session: &'a Session,
    pub key: &'a Key,
    pub providers: &'a [Provider],
    pub endpoints: &'a [Endpoint],
    pub client_agent: &'a str,
    pub model: Option<&'a str>,
    pub client_abort: CancellationToken,
}

/// Process-wide engine state (C9), composing C1-C8 and C10-C12. One instance per proxy
/// process; cheap to clone the `Arc<dyn HttpClient>` and registries out for tests.
pub struct Forwarder {
    pub provider_breakers: BreakerRegistry<ProviderId>,
    pub endpoint_breakers: BreakerRegistry<EndpointId>,
    pub vendor_type_breaker: VendorTypeBreaker,
    pub rules: ErrorRuleDetector,
    pub transport: Arc<dyn HttpClient>,
    pub agents: Arc<AgentPool>,
    pub config: EngineConfig,
}

impl Forwarder {
    pub fn new(transport: Arc<dyn HttpClient>, agents: Arc<AgentPool>, config: EngineConfig) -> Self {
        Self {
            provider_breakers: BreakerRegistry::new(),
            endpoint_breakers: BreakerRegistry::new(),
            vendor_type_breaker: VendorTypeBreaker::new(),
            rules: ErrorRuleDetector::with_builtin_rules(),
            transport,
            agents,
            config,
        }
    }

    /// Drives one request end to end (§4.7). Returns the response to relay to the client
    /// on success, or the terminal `ClientError` on failure.
    pub async fn forward(&self, input: ForwardInput<'_>) -> Result<ForwardOutcome, ClientError> {
        let kind = input.session.request.kind;
        let mut decision_chain = DecisionChain::new();
        let mut audits = Vec::new();
        let finalizer = Arc::new(StreamingFinalizer::new());
        let mut exclude: HashSet<ProviderId> = HashSet::new();

        let max_switches = if kind.is_count_tokens() { 1 } else { MAX_PROVIDER_SWITCHES };
        let mut switch_count: u32 = 0;

        while switch_count < max_switches {
            switch_count += 1;

            let resolve_request = ResolveRequest {
                required_type: input.session.request.original_format,
                client_agent: input.client_agent,
                model: input.model,
                exclude: &exclude,
                allow_open_breaker: false,
            };
            let Some(provider_id) =
                pick_provider(input.providers, input.key, &resolve_request, &self.provider_breakers, Instant::now())
            else {
                break;
            };
            let provider = input
                .providers
                .iter()
                .find(|p| p.id == provider_id)
                .expect("resolver returned a provider id not present in the pool");

            let max_attempts =
                clamp_max_attempts(provider.max_retry_attempts, self.config.max_retry_attempts_default);

            let endpoint_ids = pick_endpoints(
                input.endpoints,
                &provider.vendor,
                provider.provider_type,
                max_attempts as usize,
                &self.endpoint_breakers,
                Instant::now(),
            );

            if endpoint_ids.is_empty() && !kind.is_passthrough() {
                decision_chain.append(entry(
                    Some(provider_id.clone()),
                    None,
                    DecisionReason::StrictBlockedLegacyFallback,
                    switch_count,
                    None,
                    None,
                    None,
                ));
                exclude.insert(provider_id);
                continue;
            }

            let vendor_key = VendorTypeKey::new(provider.vendor.clone(), provider.provider_type);
            if !kind.is_passthrough() && self.vendor_type_breaker.is_open(&vendor_key, Instant::now()) {
                decision_chain.append(entry(
                    Some(provider_id.clone()),
                    None,
                    DecisionReason::RetryFailed,
                    switch_count,
                    None,
                    Some("vendor-type breaker open".to_string()),
                    None,
                ));
                exclude.insert(provider_id);
                continue;
            }

            match self
                .run_provider(
                    provider,
                    &endpoint_ids,
                    input.endpoints,
                    input.session,
                    input.key,
                    input.model,
                    kind,
                    max_attempts,
                    &finalizer,
                    &input.client_abort,
                    &mut decision_chain,
                    &mut audits,
                )
                .await
            {
                ProviderOutcome::Success(response) => {
                    return Ok(ForwardOutcome { response, decision_chain, audits });
                }
                ProviderOutcome::Terminal(err) => return Err(err),
                ProviderOutcome::Exhausted { all_timed_out } => {
                    if all_timed_out {
                        self.vendor_type_breaker.trip(vendor_key, self.config.vendor_type_breaker_cooldown, Instant::now());
                    }
                    exclude.insert(provider.id.clone());
                    if kind.is_count_tokens() {
                        return Err(ClientError::ProviderError {
                            status: TIMEOUT_STATUS,
                            message: "count_tokens request failed".to_string(),
                        });
                    }
                }
            }
        }

        Err(ClientError::AllProvidersUnavailable)
    }

    /// Settles a previously-deferred streaming response once the client-facing relay has
    /// observed the upstream stream end (§4.8). `terminal_error_seen` reflects whether
    /// the proxy's SSE scan caught an `event: error` frame before the stream closed.
    /// A no-op if the finalizer was already consumed (or never deferred).
    pub fn finalize_stream(
        &self,
        finalizer: &StreamingFinalizer,
        provider: &Provider,
        terminal_error_seen: bool,
        decision_chain: &mut DecisionChain,
    ) {
        let Some(deferred) = finalizer.consume() else { return };

        if terminal_error_seen {
            decision_chain.append(entry(
                Some(deferred.provider_id.clone()),
                Some(deferred.endpoint_id.clone()),
                DecisionReason::RetryFailed,
                deferred.attempt_number,
                Some(deferred.upstream_status),
                Some("stream ended with a terminal error event".to_string()),
                None,
            ));
            if !deferred.is_probe {
                self.provider_breakers.record_failure(&provider.id, &provider.breaker, false, Instant::now());
            }
        } else {
            let reason = if deferred.attempt_number == 1 { DecisionReason::RequestSuccess } else { DecisionReason::RetrySuccess };
            decision_chain.append(entry(
                Some(deferred.provider_id.clone()),
                Some(deferred.endpoint_id.clone()),
                reason,
                deferred.attempt_number,
                Some(deferred.upstream_status),
                None,
                Some(CircuitStateSnapshot::Closed),
            ));
            if !deferred.is_probe {
                self.provider_breakers.record_success(&provider.id, &provider.breaker, false);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_provider(
        &self,
        provider: &Provider,
        endpoint_ids: &[EndpointId],
        all_endpoints: &[Endpoint],
        session: &Session,
        key: &Key,
        model: Option<&str>,
        kind: RequestKind,
        base_max_attempts: u32,
        finalizer: &Arc<StreamingFinalizer>,
        client_abort: &CancellationToken,
        decision_chain: &mut DecisionChain,
        audits: &mut Vec<SpecialSettingAudit>,
    ) -> ProviderOutcome {
        if endpoint_ids.is_empty() {
            // Passthrough with no configured endpoints: nothing to try, fail over.
            return ProviderOutcome::Exhausted { all_timed_out: false };
        }

        let mut max_attempts = base_max_attempts;
        let mut attempt_count: u32 = 0;
        let mut endpoint_index: usize = 0;
        let mut tracker = AllTimeoutsTracker::new(endpoint_ids.len());
        let mut signature_retry_used = false;
        let mut budget_retry_used = false;
        let mut pending_strip_thinking = false;
        let mut pending_raise_budget = false;

        while attempt_count < max_attempts {
            attempt_count += 1;
            let endpoint_id = &endpoint_ids[endpoint_index.min(endpoint_ids.len() - 1)];
            let endpoint = all_endpoints
                .iter()
                .find(|e| &e.id == endpoint_id)
                .expect("selector returned an endpoint id not present in the pool");

            let mut rectify_outcome = rectify(session, key, provider, model);
            if pending_strip_thinking {
                strip_thinking_blocks(&mut rectify_outcome.body);
                pending_strip_thinking = false;
            }
            if pending_raise_budget {
                raise_thinking_budget(&mut rectify_outcome.body);
                pending_raise_budget = false;
            }
            audits.extend(rectify_outcome.audit.entries().iter().cloned());

            let send_result = self
                .send_attempt(
                    provider,
                    endpoint,
                    &rectify_outcome.body,
                    rectify_outcome.headers.clone(),
                    session,
                    kind,
                    attempt_count,
                    finalizer,
                    client_abort,
                    decision_chain,
                )
                .await;

            let err = match send_result {
                // A streaming response defers its decision-chain entry and breaker update
                // to `finalize_stream` (§4.8) — headers-only success tells us nothing
                // about whether the body will end cleanly.
                Ok(response @ FinalResponse::Streaming { .. }) => {
                    return ProviderOutcome::Success(response);
                }
                Ok(response) => {
                    if !kind.is_probe() {
                        self.provider_breakers.record_success(&provider.id, &provider.breaker, false);
                    }
                    let reason =
                        if attempt_count == 1 { DecisionReason::RequestSuccess } else { DecisionReason::RetrySuccess };
                    decision_chain.append(entry(
                        Some(provider.id.clone()),
                        Some(endpoint.id.clone()),
                        reason,
                        attempt_count,
                        Some(status_of(&response)),
                        None,
                        Some(CircuitStateSnapshot::Closed),
                    ));
                    return ProviderOutcome::Success(response);
                }
                Err(err) => err,
            };

            if kind.is_count_tokens() {
                // §7's "throw immediately, no breaker updates or provider switching" still
                // gets one audit row — an append-only chain with a silent terminal failure
                // would defeat its own purpose.
                decision_chain.append(entry(
                    Some(provider.id.clone()),
                    Some(endpoint.id.clone()),
                    DecisionReason::RetryFailed,
                    attempt_count,
                    upstream_status(&err),
                    upstream_message(&err).map(str::to_string),
                    None,
                ));
                return ProviderOutcome::Terminal(terminal_client_error(&err));
            }

            // §4.5/§4.7 step 5: the thinking rectifiers interject before the normal
            // classify-and-branch, exactly once each, raising this provider's attempt
            // budget by one rather than consuming a normal retry slot.
            if let Some(message) = upstream_message(&err) {
                if !signature_retry_used && is_invalid_thinking_signature_error(message) {
                    signature_retry_used = true;
                    pending_strip_thinking = true;
                    max_attempts += 1;
                    continue;
                }
                if signature_retry_used && is_invalid_thinking_signature_error(message) {
                    decision_chain.append(entry(
                        Some(provider.id.clone()),
                        Some(endpoint.id.clone()),
                        DecisionReason::ClientErrorNonRetryable,
                        attempt_count,
                        upstream_status(&err),
                        Some(message.to_string()),
                        None,
                    ));
                    return ProviderOutcome::Terminal(ClientError::ClientInputError { message: message.to_string() });
                }
                if !budget_retry_used && is_thinking_budget_too_small_error(message) {
                    budget_retry_used = true;
                    pending_raise_budget = true;
                    max_attempts += 1;
                    continue;
                }
            }

            let category = classify_async(&err, &self.rules).await;
            match category {
                ErrorCategory::ClientAbort => {
                    decision_chain.append(entry(
                        Some(provider.id.clone()),
                        Some(endpoint.id.clone()),
                        DecisionReason::SystemError,
                        attempt_count,
                        None,
                        Some("Client aborted".to_string()),
                        None,
                    ));
                    return ProviderOutcome::Terminal(ClientError::ClientAbort);
                }
                ErrorCategory::NonRetryableClient => {
                    decision_chain.append(entry(
                        Some(provider.id.clone()),
                        Some(endpoint.id.clone()),
                        DecisionReason::ClientErrorNonRetryable,
                        attempt_count,
                        upstream_status(&err),
                        upstream_message(&err).map(str::to_string),
                        None,
                    ));
                    return ProviderOutcome::Terminal(terminal_client_error(&err));
                }
                ErrorCategory::ResourceNotFound => {
                    decision_chain.append(entry(
                        Some(provider.id.clone()),
                        Some(endpoint.id.clone()),
                        DecisionReason::ResourceNotFound,
                        attempt_count,
                        Some(404),
                        None,
                        None,
                    ));
                    if attempt_count < max_attempts {
                        tokio::time::sleep(INNER_LOOP_RETRY_DELAY).await;
                        continue;
                    }
                    // §4.7 step 4 treats resource-not-found exhaustion the same as a
                    // provider-error exhaustion: push this provider to exclude and let
                    // the outer loop try the next one (the resource may only be missing
                    // on this provider's vendor). `ClientError::ResourceNotFound` itself
                    // is only ever constructed directly for `count_tokens` requests,
                    // which skip retry/failover entirely (see the short-circuit above).
                    return ProviderOutcome::Exhausted { all_timed_out: false };
                }
                ErrorCategory::ProviderError => {
                    let is_timeout = upstream_status(&err) == Some(TIMEOUT_STATUS);
                    decision_chain.append(entry(
                        Some(provider.id.clone()),
                        Some(endpoint.id.clone()),
                        DecisionReason::RetryFailed,
                        attempt_count,
                        upstream_status(&err),
                        upstream_message(&err).map(str::to_string),
                        None,
                    ));
                    // One call per endpoint outcome so `all_timed_out` reflects whether
                    // every *distinct* endpoint this provider owns timed out, not whether
                    // one endpoint timed out on every retry — tracked independently of
                    // the breakers below, which only record on final exhaustion (§4.7).
                    if is_timeout {
                        tracker.record_timeout();
                    }
                    if attempt_count < max_attempts {
                        // §4.4's stickiness rule keeps a plain provider-error on the same
                        // endpoint; a 524 timeout advances so a provider with several
                        // endpoints actually visits each of them before the vendor-type
                        // breaker's "every endpoint timed out" condition can ever observe
                        // all of them (§8 scenario 6), resolving the open question the
                        // spec itself flags about timeout-specific advancement.
                        if is_timeout {
                            endpoint_index += 1;
                        }
                        tokio::time::sleep(INNER_LOOP_RETRY_DELAY).await;
                        continue;
                    }
                    if !kind.is_probe() {
                        self.provider_breakers.record_failure(&provider.id, &provider.breaker, false, Instant::now());
                        if is_timeout {
                            self.endpoint_breakers.record_failure(
                                &endpoint.id,
                                &provider.breaker.for_endpoint(),
                                false,
                                Instant::now(),
                            );
                        }
                    }
                    return ProviderOutcome::Exhausted { all_timed_out: tracker.all_timed_out() };
                }
                ErrorCategory::SystemError => {
                    decision_chain.append(entry(
                        Some(provider.id.clone()),
                        Some(endpoint.id.clone()),
                        DecisionReason::SystemError,
                        attempt_count,
                        upstream_status(&err),
                        upstream_message(&err).map(str::to_string),
                        None,
                    ));
                    if attempt_count < max_attempts {
                        endpoint_index += 1;
                        tokio::time::sleep(INNER_LOOP_RETRY_DELAY).await;
                        continue;
                    }
                    if self.config.enable_circuit_breaker_on_network_errors && !kind.is_probe() {
                        self.provider_breakers.record_failure(&provider.id, &provider.breaker, false, Instant::now());
                    }
                    if !kind.is_probe() {
                        self.endpoint_breakers.record_failure(
                            &endpoint.id,
                            &provider.breaker.for_endpoint(),
                            false,
                            Instant::now(),
                        );
                    }
                    return ProviderOutcome::Exhausted { all_timed_out: false };
                }
            }
        }

        ProviderOutcome::Exhausted { all_timed_out: tracker.all_timed_out() }
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_attempt(
        &self,
        provider: &Provider,
        endpoint: &Endpoint,
        body: &Value,
        headers: HeaderMap,
        session: &Session,
        kind: RequestKind,
        attempt_number: u32,
        finalizer: &Arc<StreamingFinalizer>,
        client_abort: &CancellationToken,
        decision_chain: &mut DecisionChain,
    ) -> Result<FinalResponse, ForwardError> {
        let wants_streaming = body.get("stream").and_then(Value::as_bool).unwrap_or(false);
        let headers_timeout =
            if wants_streaming { provider.timeouts.first_byte_timeout_streaming } else { provider.timeouts.request_timeout_non_streaming };
        let body_timeout = provider.timeouts.streaming_idle_timeout;

        let url = resolve_url(provider, endpoint, &session.request.path);
        let body_bytes = Bytes::from(serde_json::to_vec(body).unwrap_or_default());
        let http2_enabled = provider.network.http2_enabled && self.config.http2_enabled_globally;
        let origin = origin_of(&url);
        let agent_key = AgentKey::new(origin.clone(), provider.proxy.as_ref().map(|p| p.url.clone()), http2_enabled);

        let response = self
            .send_with_http2_fallback(
                provider,
                endpoint,
                &url,
                &session.request.method,
                &headers,
                &body_bytes,
                agent_key,
                headers_timeout,
                body_timeout,
                client_abort,
                attempt_number,
                decision_chain,
            )
            .await?;

        if wants_streaming && is_streaming_response(response.headers.get(http::header::CONTENT_TYPE).and_then(|v| v.to_str().ok())) {
            finalizer.defer(DeferredFinalization {
                provider_id: provider.id.clone(),
                endpoint_id: endpoint.id.clone(),
                attempt_number,
                upstream_status: response.status,
                is_probe: kind.is_probe(),
            });
            return Ok(FinalResponse::Streaming {
                status: response.status,
                headers: response.headers,
                body: response.body,
                finalizer: finalizer.clone(),
            });
        }

        let collected = collect_body(response.body, body_timeout)
            .await
            .map_err(|_| ForwardError::Upstream(UpstreamError { status: TIMEOUT_STATUS, body: UpstreamErrorBody::default() }))?;

        if response.status == 404 {
            return Err(ForwardError::Upstream(UpstreamError { status: 404, body: parse_upstream_error_body(&collected) }));
        }
        if response.status >= 400 {
            return Err(ForwardError::Upstream(UpstreamError {
                status: response.status,
                body: parse_upstream_error_body(&collected),
            }));
        }

        let content_length = response.headers.get(http::header::CONTENT_LENGTH).and_then(|v| v.to_str().ok()).and_then(|v| v.parse::<u64>().ok());
        let parsed: Option<Value> = serde_json::from_slice(&collected).ok();
        if let Some(reason) = empty_response_reason(content_length, &collected, parsed.as_ref()) {
            return Err(ForwardError::Upstream(UpstreamError {
                status: 0,
                body: UpstreamErrorBody { message: Some(reason.to_string()), error_type: None, raw: None },
            }));
        }

        Ok(FinalResponse::NonStreaming { status: response.status, headers: response.headers, body: collected })
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_with_http2_fallback(
        &self,
        provider: &Provider,
        endpoint: &Endpoint,
        url: &str,
        method: &http::Method,
        headers: &HeaderMap,
        body: &Bytes,
        agent_key: AgentKey,
        headers_timeout: Duration,
        body_timeout: Duration,
        client_abort: &CancellationToken,
        attempt_number: u32,
        decision_chain: &mut DecisionChain,
    ) -> Result<forward_transport::OutboundResponse, ForwardError> {
        let first = self
            .send_once(url, method, headers, body, agent_key.clone(), headers_timeout, body_timeout, client_abort)
            .await;

        match first {
            Err(TransportErrorShape::Http2(_)) if agent_key.http2_enabled => {
                self.agents.mark_unhealthy(&agent_key, "http2 protocol error");
                decision_chain.append(entry(
                    Some(provider.id.clone()),
                    Some(endpoint.id.clone()),
                    DecisionReason::Http2Fallback,
                    attempt_number,
                    None,
                    Some("falling back to HTTP/1".to_string()),
                    None,
                ));
                let fallback_key = agent_key.without_http2();
                self.send_once(url, method, headers, body, fallback_key, headers_timeout, body_timeout, client_abort)
                    .await
                    .map_err(Into::into)
            }
            other => other.map_err(Into::into),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_once(
        &self,
        url: &str,
        method: &http::Method,
        headers: &HeaderMap,
        body: &Bytes,
        agent_key: AgentKey,
        headers_timeout: Duration,
        body_timeout: Duration,
        client_abort: &CancellationToken,
    ) -> Result<forward_transport::OutboundResponse, TransportErrorShape> {
        let cancellation = client_abort.clone();
        let request = OutboundRequest {
            url: url.to_string(),
            method: method.clone(),
            headers: headers.clone(),
            body: body.clone(),
            agent_key,
            headers_timeout,
            body_timeout,
            cancellation,
        };

        match tokio::time::timeout(headers_timeout, self.transport.request(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(transport_error)) => {
                if transport_error.aborted_by_client {
                    Err(TransportErrorShape::ClientAbort(transport_error))
                } else if transport_error.error_name.as_deref() == Some("Http2ProtocolError") {
                    Err(TransportErrorShape::Http2(transport_error))
                } else {
                    Err(TransportErrorShape::System(transport_error))
                }
            }
            Err(_) => Err(TransportErrorShape::Timeout),
        }
    }
}

enum ProviderOutcome {
    Success(FinalResponse),
    Terminal(ClientError),
    Exhausted { all_timed_out: bool },
}

enum TransportErrorShape {
    ClientAbort(TransportError),
    Http2(TransportError),
    System(TransportError),
    Timeout,
}

impl From<TransportErrorShape> for ForwardError {
    fn from(shape: TransportErrorShape) -> Self {
        match shape {
            TransportErrorShape::ClientAbort(_) => ForwardError::ClientAbort,
            TransportErrorShape::Http2(e) | TransportErrorShape::System(e) => ForwardError::Transport(e),
            TransportErrorShape::Timeout => {
                ForwardError::Upstream(UpstreamError { status: TIMEOUT_STATUS, body: UpstreamErrorBody::default() })
            }
        }
    }
}

async fn collect_body(mut body: forward_transport::BodyStream, idle_timeout: Duration) -> Result<Bytes, ()> {
    use futures_util::StreamExt;
    let mut buf = Vec::new();
    loop {
        match tokio::time::timeout(idle_timeout, body.next()).await {
            Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
            Ok(None) => break,
            Err(_) => return Err(()),
        }
    }
    Ok(Bytes::from(buf))
}

fn status_of(response: &FinalResponse) -> u16 {
    match response {
        FinalResponse::NonStreaming { status, .. } => *status,
        FinalResponse::Streaming { status, .. } => *status,
    }
}

fn upstream_message(err: &ForwardError) -> Option<&str> {
    match err {
        ForwardError::Upstream(e) => e.body.message.as_deref(),
        _ => None,
    }
}

fn upstream_status(err: &ForwardError) -> Option<u16> {
    match err {
        ForwardError::Upstream(e) => Some(e.status),
        _ => None,
    }
}

/// Maps a raw forwarding failure to a client-renderable error at the edges (terminal
/// disposition), per §7: non-retryable-client surfaces the upstream's own message.
fn terminal_client_error(err: &ForwardError) -> ClientError {
    match err {
        ForwardError::Upstream(e) if e.is_not_found() => ClientError::ResourceNotFound,
        ForwardError::Upstream(e) if e.is_timeout() => ClientError::TimeoutError,
        ForwardError::Upstream(e) => ClientError::ClientInputError {
            message: e.body.message.clone().unwrap_or_else(|| "request rejected by upstream".to_string()),
        },
        ForwardError::Transport(_) => ClientError::ProviderError { status: 503, message: "transport failure".to_string() },
        ForwardError::ClientAbort => ClientError::ClientAbort,
    }
}

fn resolve_url(provider: &Provider, endpoint: &Endpoint, path: &str) -> String {
    let base = provider.override_url.as_deref().unwrap_or(endpoint.url.as_str());
    format!("{}{}", base.trim_end_matches('/'), path)
}

fn origin_of(url: &str) -> String {
    url.parse::<http::Uri>()
        .ok()
        .and_then(|uri| uri.scheme_str().zip(uri.host()).map(|(s, h)| format!("{s}://{h}")))
        .unwrap_or_else(|| url.to_string())
}

#[allow(clippy::too_many_arguments)]
fn entry(
    provider_id: Option<ProviderId>,
    endpoint_id: Option<EndpointId>,
    reason: DecisionReason,
    attempt_number: u32,
    status_code: Option<u16>,
    error_message: Option<String>,
    circuit_state_snapshot: Option<CircuitStateSnapshot>,
) -> DecisionChainEntry {
    DecisionChainEntry {
        timestamp: Utc::now(),
        provider_id,
        endpoint_id,
        reason,
        attempt_number,
        status_code,
        error_message: error_message.clone(),
        circuit_state_snapshot,
        error_details: ErrorDetails { error_type: None, message: error_message },
    }
}
