//! Cache-TTL override (§4.5): walk `cache_control` blocks of type `ephemeral` and set
//! `ttl` to match the resolved preference, adding the matching beta-flag headers.

use forward_core::CacheTtlPreference;
use http::{HeaderName, HeaderValue};
use serde_json::Value;

const EXTENDED_TTL_BETA: &str = "extended-cache-ttl-2025-04-11";
const PROMPT_CACHING_BETA: &str = "prompt-caching-2024-07-31";

pub fn ttl_label(preference: CacheTtlPreference) -> Option<&'static str> {
    match preference {
        CacheTtlPreference::FiveMinutes => Some("5m"),
        CacheTtlPreference::OneHour => Some("1h"),
        CacheTtlPreference::Inherit => None,
    }
}

/// Applies the override to every `ephemeral` `cache_control` block found anywhere in
/// `body`, in place. Returns whether any block was actually rewritten, so the caller
/// knows whether to record a special-setting audit entry.
pub fn apply_cache_ttl_override(body: &mut Value, preference: CacheTtlPreference) -> bool {
    let Some(ttl) = ttl_label(preference) else { return false };
    let mut rewrote = false;
    walk_cache_control_blocks(body, &mut |block| {
        if block.get("type").and_then(Value::as_str) == Some("ephemeral") {
            block.insert("ttl".to_string(), Value::String(ttl.to_string()));
            rewrote = true;
        }
    });
    rewrote
}

fn walk_cache_control_blocks(value: &mut Value, visit: &mut impl FnMut(&mut serde_json::Map<String, Value>)) {
    match value {
        Value::Object(map) => {
            if let Some(Value::Object(block)) = map.get_mut("cache_control") {
                visit(block);
            }
            for (key, val) in map.iter_mut() {
                if key != "cache_control" {
                    walk_cache_control_blocks(val, visit);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                walk_cache_control_blocks(item, visit);
            }
        }
        _ => {}
    }
}

/// Adds the beta-flag headers required for the 1h TTL case (§4.5).
pub fn apply_beta_headers(headers: &mut http::HeaderMap, preference: CacheTtlPreference) {
    if preference == CacheTtlPreference::OneHour {
        append_beta(headers, EXTENDED_TTL_BETA);
        append_beta(headers, PROMPT_CACHING_BETA);
    }
}

fn append_beta(headers: &mut http::HeaderMap, flag: &str) {
    let name = HeaderName::from_static("anthropic-beta");
    let existing = headers
        .get(&name)
        .and_then(|v| v.to_str().ok())
        .map(|v| format!("{v},{flag}"))
        .unwrap_or_else(|| flag.to_string());
    if let Ok(value) = HeaderValue::from_str(&existing) {
        headers.insert(name, value);
    }
}
