//! The error classifier (C1, §4.1): a five-category priority chain, queried only through
//! the async path so the hot-loadable non-retryable-client rule registry never races a
//! reload.

mod classify;
mod rules;

pub use classify::classify_async;
pub use rules::{ClientErrorRule, ErrorRuleDetector};
