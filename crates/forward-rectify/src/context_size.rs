//! Context-1m override (§4.5): for supported Anthropic-family models, resolve the
//! context-size preference and add the 1m-context beta flag when it applies.

use forward_core::ContextSizePreference;
use http::{HeaderName, HeaderValue};

const CONTEXT_1M_BETA: &str = "context-1m-2025-08-07";

/// Models documented to support the extended context window. Matched by prefix so
/// dated/versioned model ids (`claude-sonnet-4-5-20250929`) still qualify.
const SUPPORTED_MODEL_PREFIXES: [&str; 2] = ["claude-sonnet-4", "claude-opus-4"];

pub fn model_supports_context_1m(model: &str) -> bool {
    SUPPORTED_MODEL_PREFIXES.iter().any(|prefix| model.starts_with(prefix))
}

/// Resolves whether the 1m beta flag should be added, given the caller's preference and
/// model support. `Inherit` defers to the model's own default (no flag added here; the
/// provider serves its default window).
pub fn should_enable_context_1m(preference: ContextSizePreference, model: &str) -> bool {
    if !model_supports_context_1m(model) {
        return false;
    }
    matches!(preference, ContextSizePreference::ForceEnable)
}

/// Adds the beta header if `should_enable_context_1m` would return true. Returns whether
/// it was added, so the caller can record a special-setting audit entry.
pub fn apply_context_1m(headers: &mut http::HeaderMap, preference: ContextSizePreference, model: &str) -> bool {
    if preference == ContextSizePreference::Disabled || !should_enable_context_1m(preference, model) {
        return false;
    }
    let name = HeaderName::from_static("anthropic-beta");
    let existing = headers
        .get(&name)
        .and_then(|v| v.to_str().ok())
        .map(|v| format!("{v},{CONTEXT_1M_BETA}"))
        .unwrap_or_else(|| CONTEXT_1M_BETA.to_string());
    if let Ok(value) = HeaderValue::from_str(&existing) {
        headers.insert(name, value);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_enable_on_supported_model_adds_flag() {
        let mut headers = http::HeaderMap::new();
        assert!(apply_context_1m(&mut headers, ContextSizePreference::ForceEnable, "claude-sonnet-4-5-20250929"));
        assert_eq!(headers.get("anthropic-beta").unwrap(), CONTEXT_1M_BETA);
    }

    #[test]
    fn force_enable_on_unsupported_model_is_a_no_op() {
        let mut headers = http::HeaderMap::new();
        assert!(!apply_context_1m(&mut headers, ContextSizePreference::ForceEnable, "claude-haiku-3-5"));
        assert!(headers.is_empty());
    }

    #[test]
    fn inherit_never_adds_the_flag() {
        let mut headers = http::HeaderMap::new();
        assert!(!apply_context_1m(&mut headers, ContextSizePreference::Inherit, "claude-sonnet-4-5-20250929"));
    }

    #[test]
    fn disabled_never_adds_the_flag_even_on_supported_model() {
        let mut headers = http::HeaderMap::new();
        assert!(!apply_context_1m(&mut headers, ContextSizePreference::Disabled, "claude-opus-4-1"));
    }
}
