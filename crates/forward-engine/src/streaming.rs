//! The streaming finalizer (C10, §4.8): two-phase settlement for server-sent-event
//! responses. A streaming response returns HTTP 200 long before its body is complete and
//! may still carry a terminal error event mid-stream, so the forwarder must not record
//! success, bind the session to the provider, or clear the response-timeout on header
//! receipt alone — that only happens once the stream is observed to end cleanly.

use std::sync::Mutex;

use forward_core::{EndpointId, ProviderId};

/// `content-type` sniff for the SSE case (§4.8).
pub fn is_streaming_response(content_type: Option<&str>) -> bool {
    content_type.map(|v| v.to_ascii_lowercase().contains("text/event-stream")).unwrap_or(false)
}

/// The inline empty-response check for non-streaming responses (§4.8): a `200` whose
/// body is empty, or whose parsed `content`/`choices` array is empty, is promoted to a
/// synthetic provider-error rather than treated as success.
pub fn empty_response_reason(content_length: Option<u64>, body: &[u8], parsed: Option<&serde_json::Value>) -> Option<&'static str> {
    if content_length == Some(0) || body.is_empty() {
        return Some("empty_body");
    }
    if let Some(value) = parsed {
        let content_empty = value.get("content").and_then(serde_json::Value::as_array).map(|a| a.is_empty());
        let choices_empty = value.get("choices").and_then(serde_json::Value::as_array).map(|a| a.is_empty());
        if content_empty == Some(true) || choices_empty == Some(true) {
            return Some("missing_content");
        }
    }
    None
}

/// One deferred settlement: everything the finalizer needs to record success and bind
/// the session once the stream is known to have ended cleanly.
#[derive(Debug, Clone)]
pub struct DeferredFinalization {
    pub provider_id: ProviderId,
    pub endpoint_id: EndpointId,
    pub attempt_number: u32,
    pub upstream_status: u16,
    pub is_probe: bool,
}

/// Holds at most one pending settlement. `consume` is one-shot — the spec's own "a
/// WeakMap or equivalent; re-consumption returns null" — so a response handler that gets
/// invoked twice (a retried close event, a buggy client) can never double-record success.
#[derive(Default)]
pub struct StreamingFinalizer {
    slot: Mutex<Option<DeferredFinalization>>,
}

impl StreamingFinalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defer(&self, record: DeferredFinalization) {
        *self.slot.lock().unwrap() = Some(record);
    }

    /// Consumes and returns the pending settlement, or `None` if there was none, or if
    /// it was already consumed.
    pub fn consume(&self) -> Option<DeferredFinalization> {
        self.slot.lock().unwrap().take()
    }

    /// Reads the pending settlement without consuming it, so a caller that needs to
    /// look up the provider record by id (to later call `finalize_stream`) can do so
    /// before the stream has actually ended.
    pub fn peek(&self) -> Option<DeferredFinalization> {
        self.slot.lock().unwrap().clone()
    }

    pub fn has_pending(&self) -> bool {
        self.slot.lock().unwrap().is_some()
    }
}

/// A small, bounded scanner that inspects SSE chunks as they pass through the proxy,
/// flagging whether a terminal error event was observed — not a full SSE parser, just
/// enough to satisfy §4.8's "observes stream-end without a terminal error" rule. The
/// wire format this looks for is an `event: error` line, which every vendor dialect in
/// scope uses to signal a mid-stream failure.
#[derive(Default)]
pub struct SseTerminalErrorScanner {
    saw_terminal_error: bool,
}

impl SseTerminalErrorScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, chunk: &[u8]) {
        if self.saw_terminal_error {
            return;
        }
        if let Ok(text) = std::str::from_utf8(chunk) {
            if text.contains("event: error") || text.contains("event:error") {
                self.saw_terminal_error = true;
            }
        }
    }

    pub fn saw_terminal_error(&self) -> bool {
        self.saw_terminal_error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn consume_is_one_shot() {
        let finalizer = StreamingFinalizer::new();
        finalizer.defer(DeferredFinalization {
            provider_id: ProviderId::from("p1"),
            endpoint_id: EndpointId::from("e1"),
            attempt_number: 1,
            upstream_status: 200,
            is_probe: false,
        });
        assert!(finalizer.consume().is_some());
        assert!(finalizer.consume().is_none());
    }

    #[test]
    fn peek_does_not_consume() {
        let finalizer = StreamingFinalizer::new();
        finalizer.defer(DeferredFinalization {
            provider_id: ProviderId::from("p1"),
            endpoint_id: EndpointId::from("e1"),
            attempt_number: 1,
            upstream_status: 200,
            is_probe: false,
        });
        assert!(finalizer.peek().is_some());
        assert!(finalizer.peek().is_some());
        assert!(finalizer.consume().is_some());
    }

    #[test]
    fn empty_body_is_flagged_empty() {
        assert_eq!(empty_response_reason(Some(0), b"", None), Some("empty_body"));
        assert_eq!(empty_response_reason(None, b"", None), Some("empty_body"));
    }

    #[test]
    fn empty_content_array_is_flagged_missing_content() {
        let value = json!({"content": []});
        assert_eq!(empty_response_reason(None, b"{}", Some(&value)), Some("missing_content"));
    }

    #[test]
    fn non_empty_body_passes() {
        let value = json!({"content": [{"type": "text", "text": "hi"}]});
        assert_eq!(empty_response_reason(None, b"{...}", Some(&value)), None);
    }

    #[test]
    fn scanner_detects_terminal_error_event_across_chunks() {
        let mut scanner = SseTerminalErrorScanner::new();
        scanner.observe(b"event: ping\ndata: {}\n\n");
        assert!(!scanner.saw_terminal_error());
        scanner.observe(b"event: error\ndata: {\"message\":\"overloaded\"}\n\n");
        assert!(scanner.saw_terminal_error());
    }
}
