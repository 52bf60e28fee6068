//! Provider-level overrides (§4.5, last bullet): per-provider strong preferences beat
//! client-supplied values whenever the preference is set (not left at its provider
//! default of `None`).

use forward_core::ProviderOverrides;
use serde_json::Value;

/// Applies every set field in `overrides` to `body`, in place. Returns the field names
/// that were actually overridden, for the special-setting audit entry.
pub fn apply_provider_overrides(body: &mut Value, overrides: &ProviderOverrides) -> Vec<&'static str> {
    let Some(map) = body.as_object_mut() else { return Vec::new() };
    let mut applied = Vec::new();

    if let Some(max_tokens) = overrides.max_tokens {
        map.insert("max_tokens".to_string(), Value::from(max_tokens));
        applied.push("max_tokens");
    }
    if let Some(budget) = overrides.thinking_budget {
        let thinking = map.entry("thinking").or_insert_with(|| Value::Object(Default::default()));
        if let Some(thinking) = thinking.as_object_mut() {
            thinking.insert("budget_tokens".to_string(), Value::from(budget));
        }
        applied.push("thinking_budget");
    }
    if let Some(effort) = &overrides.reasoning_effort {
        map.insert("reasoning_effort".to_string(), Value::String(effort.clone()));
        applied.push("reasoning_effort");
    }
    if let Some(summary) = &overrides.reasoning_summary {
        map.insert("reasoning_summary".to_string(), Value::String(summary.clone()));
        applied.push("reasoning_summary");
    }
    if let Some(verbosity) = &overrides.text_verbosity {
        map.insert("text_verbosity".to_string(), Value::String(verbosity.clone()));
        applied.push("text_verbosity");
    }
    if let Some(parallel) = overrides.parallel_tool_calls {
        map.insert("parallel_tool_calls".to_string(), Value::Bool(parallel));
        applied.push("parallel_tool_calls");
    }
    if let Some(google_search) = overrides.google_search_enabled {
        let tools = map.entry("tools").or_insert_with(|| Value::Array(Vec::new()));
        if let Some(tools) = tools.as_array_mut() {
            tools.retain(|t| t.get("type").and_then(Value::as_str) != Some("google_search"));
            if google_search {
                tools.push(serde_json::json!({ "type": "google_search" }));
            }
        }
        applied.push("google_search_enabled");
    }

    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overrides_client_supplied_max_tokens() {
        let mut body = json!({"max_tokens": 256});
        let overrides = ProviderOverrides { max_tokens: Some(4096), ..Default::default() };
        let applied = apply_provider_overrides(&mut body, &overrides);
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(applied, vec!["max_tokens"]);
    }

    #[test]
    fn unset_overrides_leave_body_untouched() {
        let mut body = json!({"max_tokens": 256});
        let applied = apply_provider_overrides(&mut body, &ProviderOverrides::default());
        assert_eq!(body["max_tokens"], 256);
        assert!(applied.is_empty());
    }

    #[test]
    fn google_search_disabled_removes_existing_tool() {
        let mut body = json!({"tools": [{"type": "google_search"}, {"type": "other"}]});
        let overrides = ProviderOverrides { google_search_enabled: Some(false), ..Default::default() };
        apply_provider_overrides(&mut body, &overrides);
        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["type"], "other");
    }
}
