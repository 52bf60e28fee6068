//! Metadata user-id injection (§4.5): for Anthropic requests missing `metadata.user_id`,
//! synthesize one from the key id and session id so upstream abuse tooling can still
//! correlate requests without us forwarding the tenant's raw identifiers.

use sha2::{Digest, Sha256};
use serde_json::Value;

/// Returns the synthesized id, or `None` if `metadata.user_id` was already present.
pub fn inject_user_id(body: &mut Value, key_id: &str, session_id: &str) -> Option<String> {
    let metadata = body.as_object_mut()?.entry("metadata").or_insert_with(|| Value::Object(Default::default()));
    let metadata = metadata.as_object_mut()?;

    if metadata.get("user_id").and_then(Value::as_str).is_some() {
        return None;
    }

    let hash = hex::encode(Sha256::digest(format!("claude_user_{key_id}").as_bytes()));
    let synthesized = format!("user_{hash}_account__session_{session_id}");
    metadata.insert("user_id".to_string(), Value::String(synthesized.clone()));
    Some(synthesized)
}
