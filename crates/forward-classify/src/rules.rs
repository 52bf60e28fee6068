//! The non-retryable-client rule registry (§4.1 category 2): a live set of (regex,
//! reason) pairs matched against the upstream error message. "Live" because an operator
//! can push new rules (a newly observed upstream rejection phrase) without a restart;
//! readers always go through the async path so a reload never races a half-updated list.

use std::sync::Arc;

use regex::Regex;
use tokio::sync::RwLock;

/// A named, compiled non-retryable-client rule.
#[derive(Debug, Clone)]
pub struct ClientErrorRule {
    pub reason: &'static str,
    pattern: Regex,
}

impl ClientErrorRule {
    pub fn new(reason: &'static str, pattern: &str) -> Self {
        Self {
            reason,
            pattern: Regex::new(pattern).expect("built-in rule pattern must compile"),
        }
    }

    pub fn matches(&self, message: &str) -> bool {
        self.pattern.is_match(message)
    }
}

/// The six built-in rule categories named in §4.1: prompt-too-long, content-filter,
/// PDF-page-limit, thinking-block-format, missing-required-field, illegal-request.
fn builtin_rules() -> Vec<ClientErrorRule> {
    vec![
        ClientErrorRule::new("prompt_too_long", r"(?i)prompt is too long|maximum context length|too many tokens"),
        ClientErrorRule::new("content_filter", r"(?i)content management policy|content filter|flagged by our safety system"),
        ClientErrorRule::new("pdf_page_limit", r"(?i)PDF.*(page limit|too many pages)"),
        ClientErrorRule::new("thinking_block_format", r"(?i)thinking block.*(must|required|format)"),
        ClientErrorRule::new("missing_required_field", r"(?i)missing (the )?required (field|parameter)"),
        ClientErrorRule::new("illegal_request", r"(?i)invalid request|request not allowed|illegal request"),
    ]
}

/// A hot-loadable set of rules, queried only through the async path (§4.1: "the registry
/// must be queried via the async path to honor late-loaded rules").
#[derive(Clone)]
pub struct ErrorRuleDetector {
    rules: Arc<RwLock<Vec<ClientErrorRule>>>,
}

impl ErrorRuleDetector {
    pub fn with_builtin_rules() -> Self {
        Self { rules: Arc::new(RwLock::new(builtin_rules())) }
    }

    pub fn empty() -> Self {
        Self { rules: Arc::new(RwLock::new(Vec::new())) }
    }

    /// Replaces the whole rule set. Safe to call concurrently with `matching_reason`: a
    /// reader sees either the old or the new set, never a partial one.
    pub async fn reload(&self, rules: Vec<ClientErrorRule>) {
        *self.rules.write().await = rules;
    }

    pub async fn push_rule(&self, rule: ClientErrorRule) {
        self.rules.write().await.push(rule);
    }

    /// Returns the reason of the first rule that matches `message`, if any.
    pub async fn matching_reason(&self, message: &str) -> Option<&'static str> {
        let rules = self.rules.read().await;
        rules.iter().find(|rule| rule.matches(message)).map(|rule| rule.reason)
    }
}

impl Default for ErrorRuleDetector {
    fn default() -> Self {
        Self::with_builtin_rules()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builtin_prompt_too_long_rule_matches() {
        let detector = ErrorRuleDetector::with_builtin_rules();
        let reason = detector.matching_reason("Error: prompt is too long for this model").await;
        assert_eq!(reason, Some("prompt_too_long"));
    }

    #[tokio::test]
    async fn unmatched_message_returns_none() {
        let detector = ErrorRuleDetector::with_builtin_rules();
        assert_eq!(detector.matching_reason("completely unrelated failure").await, None);
    }

    #[tokio::test]
    async fn reload_replaces_rules_atomically_for_subsequent_reads() {
        let detector = ErrorRuleDetector::empty();
        assert_eq!(detector.matching_reason("custom upstream rejection").await, None);
        detector
            .reload(vec![ClientErrorRule::new("custom", "custom upstream rejection")])
            .await;
        assert_eq!(detector.matching_reason("custom upstream rejection").await, Some("custom"));
    }
}
