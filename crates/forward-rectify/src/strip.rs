//! Private-field stripping (§4.5 "always-on mutations", §8 round-trip law): recursively
//! drop every object key beginning with `_` from a request body.

use serde_json::Value;

/// `strip(B)` of §8: `strip(strip(B)) = strip(B)` and the result contains no key
/// beginning with `_`, at any depth.
pub fn strip_private_fields(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !key.starts_with('_'))
                .map(|(key, val)| (key.clone(), strip_private_fields(val)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_private_fields).collect()),
        other => other.clone(),
    }
}
