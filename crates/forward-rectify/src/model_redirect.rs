//! Per-provider model redirects (§4.5): a provider may declare that requests for model
//! `A` should actually be sent upstream as model `B` (e.g. an alias that a vendor renamed
//! or never shipped under the client-facing name).

use std::collections::HashMap;

use serde_json::Value;

/// Rewrites `body.model` to its redirect target, if one is configured for the model the
/// client asked for. Returns the new model id when a rewrite happened.
pub fn apply_model_redirect(body: &mut Value, redirects: &HashMap<String, String>) -> Option<String> {
    let current = body.get("model")?.as_str()?.to_string();
    let target = redirects.get(&current)?;
    if *target == current {
        return None;
    }
    body.as_object_mut()?.insert("model".to_string(), Value::String(target.clone()));
    Some(target.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn redirects() -> HashMap<String, String> {
        HashMap::from([("claude-old-alias".to_string(), "claude-sonnet-4-5".to_string())])
    }

    #[test]
    fn rewrites_model_when_redirect_configured() {
        let mut body = json!({"model": "claude-old-alias"});
        let new_model = apply_model_redirect(&mut body, &redirects());
        assert_eq!(new_model.as_deref(), Some("claude-sonnet-4-5"));
        assert_eq!(body["model"], "claude-sonnet-4-5");
    }

    #[test]
    fn leaves_unredirected_model_untouched() {
        let mut body = json!({"model": "claude-sonnet-4-5"});
        assert!(apply_model_redirect(&mut body, &redirects()).is_none());
        assert_eq!(body["model"], "claude-sonnet-4-5");
    }

    #[test]
    fn missing_model_field_is_a_no_op() {
        let mut body = json!({});
        assert!(apply_model_redirect(&mut body, &redirects()).is_none());
    }

    proptest::proptest! {
        #[test]
        fn applying_redirect_to_its_own_target_is_idempotent(model in "[a-z-]{1,20}") {
            let mut redirects = HashMap::new();
            redirects.insert(model.clone(), model.clone());
            let mut body = json!({"model": model});
            let result = apply_model_redirect(&mut body, &redirects);
            prop_assert!(result.is_none());
            prop_assert_eq!(body["model"].as_str().unwrap(), model.as_str());
        }
    }
}
