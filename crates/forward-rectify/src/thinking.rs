//! Thinking-block rectifiers (§4.5): both are error-triggered, single-retry repairs. This
//! module only knows how to detect the trigger and apply the repair; the retry-once
//! bookkeeping and the reclassify-on-second-failure rule belong to the forwarder (C9),
//! which owns attempt counting.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref INVALID_SIGNATURE: Regex = Regex::new(r"(?i)invalid.*signature.*thinking block").unwrap();
    static ref BUDGET_TOO_SMALL: Regex =
        Regex::new(r"(?i)thinking\.budget_tokens.*(too small|below minimum)|budget.too.small").unwrap();
}

/// The documented minimum `thinking.budget_tokens` value (§4.5).
pub const MIN_THINKING_BUDGET_TOKENS: u64 = 1024;

pub fn is_invalid_thinking_signature_error(message: &str) -> bool {
    INVALID_SIGNATURE.is_match(message)
}

pub fn is_thinking_budget_too_small_error(message: &str) -> bool {
    BUDGET_TOO_SMALL.is_match(message)
}

/// Strips `thinking` and `redacted_thinking` content blocks (and any stray `signature`
/// field) from every message, in place.
pub fn strip_thinking_blocks(body: &mut Value) {
    let Some(messages) = body.get_mut("messages").and_then(Value::as_array_mut) else { return };
    for message in messages {
        let Some(content) = message.get_mut("content").and_then(Value::as_array_mut) else { continue };
        content.retain(|block| {
            !matches!(block.get("type").and_then(Value::as_str), Some("thinking") | Some("redacted_thinking"))
        });
        for block in content.iter_mut() {
            if let Some(map) = block.as_object_mut() {
                map.remove("signature");
            }
        }
    }
}

/// Raises `thinking.budget_tokens` to the documented minimum, in place. Leaves the body
/// untouched if no `thinking` object is present (nothing to rectify).
pub fn raise_thinking_budget(body: &mut Value) -> bool {
    let Some(thinking) = body.get_mut("thinking").and_then(Value::as_object_mut) else { return false };
    let current = thinking.get("budget_tokens").and_then(Value::as_u64).unwrap_or(0);
    if current >= MIN_THINKING_BUDGET_TOKENS {
        return false;
    }
    thinking.insert("budget_tokens".to_string(), Value::from(MIN_THINKING_BUDGET_TOKENS));
    true
}
