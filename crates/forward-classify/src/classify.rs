//! `classify_async` (C1, §4.1): the single classification path. There is deliberately no
//! synchronous variant — a caller that classified synchronously could read the rule
//! registry mid-reload and miss a just-pushed rule; one async path removes that race by
//! construction instead of documenting around it.

use forward_core::{ErrorCategory, ForwardError};

use crate::rules::ErrorRuleDetector;

const ABORT_MESSAGES: [&str; 2] = ["This operation was aborted", "The user aborted a request"];
const ABORT_ERROR_NAMES: [&str; 2] = ["AbortError", "ResponseAborted"];

/// Classifies a raw forwarding failure into one of the five §4.1 categories, querying
/// `rules` for the non-retryable-client check.
pub async fn classify_async(err: &ForwardError, rules: &ErrorRuleDetector) -> ErrorCategory {
    if is_client_abort(err) {
        return ErrorCategory::ClientAbort;
    }

    if let Some(message) = upstream_message(err) {
        if rules.matching_reason(message).await.is_some() {
            return ErrorCategory::NonRetryableClient;
        }
    }

    match err {
        ForwardError::Upstream(upstream) if upstream.is_not_found() => ErrorCategory::ResourceNotFound,
        // Any other 4xx/5xx, the empty-response sentinel, or a synthesized 524 timeout.
        ForwardError::Upstream(_) => ErrorCategory::ProviderError,
        ForwardError::Transport(_) => ErrorCategory::SystemError,
        ForwardError::ClientAbort => ErrorCategory::ClientAbort,
    }
}

fn is_client_abort(err: &ForwardError) -> bool {
    match err {
        ForwardError::ClientAbort => true,
        ForwardError::Upstream(upstream) => upstream.status == 499,
        ForwardError::Transport(transport) => {
            transport.aborted_by_client
                || transport
                    .error_name
                    .as_deref()
                    .map(|name| ABORT_ERROR_NAMES.contains(&name))
                    .unwrap_or(false)
                || ABORT_MESSAGES.contains(&transport.message.as_str())
                || transport.message.contains("aborted")
        }
    }
}

fn upstream_message(err: &ForwardError) -> Option<&str> {
    match err {
        ForwardError::Upstream(upstream) => upstream.body.message.as_deref(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forward_core::{TransportError, UpstreamError, UpstreamErrorBody};

    fn detector() -> ErrorRuleDetector {
        ErrorRuleDetector::with_builtin_rules()
    }

    #[tokio::test]
    async fn transport_error_with_abort_name_classifies_as_client_abort() {
        let err = ForwardError::Transport(TransportError {
            message: "request failed".into(),
            aborted_by_client: false,
            error_name: Some("AbortError".into()),
        });
        assert_eq!(classify_async(&err, &detector()).await, ErrorCategory::ClientAbort);
    }

    #[tokio::test]
    async fn upstream_499_classifies_as_client_abort_before_rule_check() {
        let err = ForwardError::Upstream(UpstreamError {
            status: 499,
            body: UpstreamErrorBody { message: Some("prompt is too long".into()), ..Default::default() },
        });
        assert_eq!(classify_async(&err, &detector()).await, ErrorCategory::ClientAbort);
    }

    #[tokio::test]
    async fn non_retryable_rule_match_takes_priority_over_provider_error_status() {
        let err = ForwardError::Upstream(UpstreamError {
            status: 400,
            body: UpstreamErrorBody { message: Some("prompt is too long for this model".into()), ..Default::default() },
        });
        assert_eq!(classify_async(&err, &detector()).await, ErrorCategory::NonRetryableClient);
    }

    #[tokio::test]
    async fn upstream_404_classifies_as_resource_not_found() {
        let err = ForwardError::Upstream(UpstreamError {
            status: 404,
            body: UpstreamErrorBody::default(),
        });
        assert_eq!(classify_async(&err, &detector()).await, ErrorCategory::ResourceNotFound);
    }

    #[tokio::test]
    async fn synthesized_524_timeout_classifies_as_provider_error() {
        let err = ForwardError::Upstream(UpstreamError {
            status: 524,
            body: UpstreamErrorBody::default(),
        });
        assert_eq!(classify_async(&err, &detector()).await, ErrorCategory::ProviderError);
    }

    #[tokio::test]
    async fn empty_response_classifies_as_provider_error() {
        let err = ForwardError::Upstream(UpstreamError { status: 0, body: UpstreamErrorBody::default() });
        assert_eq!(classify_async(&err, &detector()).await, ErrorCategory::ProviderError);
    }

    #[tokio::test]
    async fn plain_transport_failure_classifies_as_system_error() {
        let err = ForwardError::Transport(TransportError {
            message: "connection refused".into(),
            aborted_by_client: false,
            error_name: None,
        });
        assert_eq!(classify_async(&err, &detector()).await, ErrorCategory::SystemError);
    }
}
