//! The error taxonomy and response builder (C12, §7): turns a terminal `ClientError`
//! into the wire-stable envelope, and sniffs an upstream error body into the five
//! documented shapes before any of that reaches `ClientError` construction.

use forward_core::UpstreamErrorBody;
use serde_json::Value;

/// Upstream error bodies are best-effort parsed as JSON, recognizing (in order):
/// `{error:{message,type}}`, `{error:{message}}`, `{message}`, `{error:"..."}`,
/// `{detail:[{msg}]}`. Text bodies are truncated to 500 bytes; JSON bodies are preserved
/// whole via `raw` (§7 "Body extraction").
pub fn parse_upstream_error_body(bytes: &[u8]) -> UpstreamErrorBody {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => parse_json_shape(&value),
        Err(_) => UpstreamErrorBody {
            message: Some(truncate_utf8(bytes, 500)),
            error_type: None,
            raw: None,
        },
    }
}

fn parse_json_shape(value: &Value) -> UpstreamErrorBody {
    let raw = Some(value.to_string());

    if let Some(error) = value.get("error") {
        if let Some(message) = error.get("message").and_then(Value::as_str) {
            let error_type = error.get("type").and_then(Value::as_str).map(str::to_string);
            return UpstreamErrorBody { message: Some(message.to_string()), error_type, raw };
        }
        if let Some(message) = error.as_str() {
            return UpstreamErrorBody { message: Some(message.to_string()), error_type: None, raw };
        }
    }

    if let Some(message) = value.get("message").and_then(Value::as_str) {
        return UpstreamErrorBody { message: Some(message.to_string()), error_type: None, raw };
    }

    if let Some(detail) = value.get("detail").and_then(Value::as_array) {
        if let Some(message) = detail.first().and_then(|entry| entry.get("msg")).and_then(Value::as_str) {
            return UpstreamErrorBody { message: Some(message.to_string()), error_type: None, raw };
        }
    }

    UpstreamErrorBody { message: None, error_type: None, raw }
}

/// Truncates to at most `max_bytes` bytes, backing off to the nearest char boundary so
/// the result is always valid UTF-8 (never splits a multi-byte sequence).
fn truncate_utf8(bytes: &[u8], max_bytes: usize) -> String {
    if bytes.len() <= max_bytes {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let mut end = max_bytes;
    while end > 0 && !bytes.is_char_boundary(end) {
        end -= 1;
    }
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_error_message_and_type_shape() {
        let body = json!({"error": {"message": "boom", "type": "overloaded_error"}}).to_string();
        let parsed = parse_upstream_error_body(body.as_bytes());
        assert_eq!(parsed.message.as_deref(), Some("boom"));
        assert_eq!(parsed.error_type.as_deref(), Some("overloaded_error"));
    }

    #[test]
    fn parses_bare_message_shape() {
        let body = json!({"message": "not found"}).to_string();
        let parsed = parse_upstream_error_body(body.as_bytes());
        assert_eq!(parsed.message.as_deref(), Some("not found"));
    }

    #[test]
    fn parses_error_as_plain_string_shape() {
        let body = json!({"error": "bad request"}).to_string();
        let parsed = parse_upstream_error_body(body.as_bytes());
        assert_eq!(parsed.message.as_deref(), Some("bad request"));
    }

    #[test]
    fn parses_fastapi_style_detail_shape() {
        let body = json!({"detail": [{"msg": "field required", "loc": ["body", "x"]}]}).to_string();
        let parsed = parse_upstream_error_body(body.as_bytes());
        assert_eq!(parsed.message.as_deref(), Some("field required"));
    }

    #[test]
    fn non_json_text_body_is_truncated_to_500_bytes() {
        let body = "x".repeat(600);
        let parsed = parse_upstream_error_body(body.as_bytes());
        assert_eq!(parsed.message.unwrap().len(), 500);
        assert!(parsed.raw.is_none());
    }

    #[test]
    fn unrecognized_json_shape_keeps_raw_body_whole() {
        let body = json!({"unexpected": {"nested": true}}).to_string();
        let parsed = parse_upstream_error_body(body.as_bytes());
        assert!(parsed.message.is_none());
        assert!(parsed.raw.is_some());
    }
}
