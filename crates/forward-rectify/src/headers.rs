//! Always-on header rewrites (§4.5): strip hop-by-hop/client-computed headers, force
//! identity encoding so the gzip fallback in the transport layer owns decompression, set
//! the outbound credential headers, and retarget `host` to the provider's URL.

use http::{HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};

const STRIPPED: [&str; 2] = ["content-length", "connection"];

/// Applies the always-on rewrites in place. `provider_host` is the provider URL's host;
/// `x_api_key` is set only when the provider dialect uses it (Anthropic-family).
pub fn apply_always_on(headers: &mut HeaderMap, credential: &SecretString, provider_host: &str, set_x_api_key: bool) {
    for name in STRIPPED {
        headers.remove(name);
    }

    headers.insert(
        HeaderName::from_static("accept-encoding"),
        HeaderValue::from_static("identity"),
    );

    let bearer = format!("Bearer {}", credential.expose_secret());
    if let Ok(value) = HeaderValue::from_str(&bearer) {
        headers.insert(http::header::AUTHORIZATION, value);
    }

    if set_x_api_key {
        if let Ok(value) = HeaderValue::from_str(credential.expose_secret()) {
            headers.insert(HeaderName::from_static("x-api-key"), value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(provider_host) {
        headers.insert(http::header::HOST, value);
    }

    // user-agent is retained unless the caller already overrode it upstream of this call.
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_content_length_and_connection() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_LENGTH, HeaderValue::from_static("42"));
        headers.insert(HeaderName::from_static("connection"), HeaderValue::from_static("keep-alive"));
        apply_always_on(&mut headers, &SecretString::from("sk-test".to_string()), "api.example.invalid", false);
        assert!(!headers.contains_key(http::header::CONTENT_LENGTH));
        assert!(!headers.contains_key("connection"));
    }

    #[test]
    fn sets_bearer_and_host() {
        let mut headers = HeaderMap::new();
        apply_always_on(&mut headers, &SecretString::from("sk-test".to_string()), "api.example.invalid", false);
        assert_eq!(headers.get(http::header::AUTHORIZATION).unwrap(), "Bearer sk-test");
        assert_eq!(headers.get(http::header::HOST).unwrap(), "api.example.invalid");
        assert!(!headers.contains_key("x-api-key"));
    }

    #[test]
    fn sets_x_api_key_when_requested() {
        let mut headers = HeaderMap::new();
        apply_always_on(&mut headers, &SecretString::from("sk-test".to_string()), "api.example.invalid", true);
        assert_eq!(headers.get("x-api-key").unwrap(), "sk-test");
    }
}
