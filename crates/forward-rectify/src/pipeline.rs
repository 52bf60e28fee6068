//! The rectifier entry point (C7): composes the always-on mutations with every
//! conditional, audited rewrite into one pass over a request.

use forward_core::{ContextSizePreference, Key, Provider, ProviderType, Session};
use http::{HeaderMap, Uri};
use serde_json::Value;

use crate::audit::{RectifierAudit, SpecialSetting};
use crate::cache_ttl::{apply_beta_headers, apply_cache_ttl_override};
use crate::context_size::apply_context_1m;
use crate::headers::apply_always_on;
use crate::metadata::inject_user_id;
use crate::model_redirect::apply_model_redirect;
use crate::overrides::apply_provider_overrides;
use crate::strip::strip_private_fields;

pub struct RectifyOutcome {
    pub body: Value,
    pub headers: HeaderMap,
    pub audit: RectifierAudit,
}

/// Runs the full rectification pass for one attempt against `provider`. `model` is the
/// client-requested model id, used by the context-1m check.
pub fn rectify(session: &Session, key: &Key, provider: &Provider, model: Option<&str>) -> RectifyOutcome {
    let mut body = strip_private_fields(&session.request.body);
    let mut headers = session.request.headers.clone();
    let mut audit = RectifierAudit::new();

    if apply_model_redirect(&mut body, &provider.body_prefs.model_redirects).is_some() {
        audit.record(SpecialSetting::ModelRedirect, model.unwrap_or("").to_string());
    }

    let provider_host = provider_host(provider);
    let uses_anthropic_headers = provider.provider_type == ProviderType::AnthropicLike;
    apply_always_on(&mut headers, &provider.credential, &provider_host, uses_anthropic_headers);

    if uses_anthropic_headers {
        apply_anthropic_specific(&mut body, &mut headers, &mut audit, session, key, model);
    }

    for field in apply_provider_overrides(&mut body, &provider.body_prefs.overrides) {
        audit.record(SpecialSetting::ProviderOverride { field: field.to_string() }, field.to_string());
    }

    RectifyOutcome { body, headers, audit }
}

fn apply_anthropic_specific(
    body: &mut Value,
    headers: &mut HeaderMap,
    audit: &mut RectifierAudit,
    session: &Session,
    key: &Key,
    model: Option<&str>,
) {
    let cache_preference = session.cache_ttl_resolved.unwrap_or(key.cache_ttl_preference);
    if apply_cache_ttl_override(body, cache_preference) {
        apply_beta_headers(headers, cache_preference);
        audit.record(SpecialSetting::CacheTtlOverride, format!("{cache_preference:?}"));
    }

    if let Some(model) = model {
        let context_preference = session.context_flag_resolved.unwrap_or(ContextSizePreference::Inherit);
        if apply_context_1m(headers, context_preference, model) {
            audit.record(SpecialSetting::Context1m, model.to_string());
        }
    }

    if let Some(user_id) = inject_user_id(body, session.key_id.as_str(), &session.session_id) {
        audit.record(SpecialSetting::MetadataUserIdInjected, user_id);
    }
}

fn provider_host(provider: &Provider) -> String {
    let url = provider.override_url.as_deref().unwrap_or("");
    url.parse::<Uri>().ok().and_then(|uri| uri.host().map(str::to_string)).unwrap_or_default()
}
