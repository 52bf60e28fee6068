//! The forwarding engine: the outer/inner attempt loop (C9), streaming finalization
//! (C10), decision-chain entries (C11, re-exported from `forward_core`), and the error
//! taxonomy / response builder (C12) that together drive one request to completion.
//!
//! Everything else in the workspace (`forward-breaker`, `forward-classify`,
//! `forward-route`, `forward-rectify`, `forward-transport`) is a pure component this
//! crate composes; this is the only crate that knows the end-to-end request shape.

mod config;
mod forwarder;
mod response;
mod streaming;

pub use config::{clamp_max_attempts, EngineConfig, INNER_LOOP_RETRY_DELAY, MAX_PROVIDER_SWITCHES, TIMEOUT_STATUS};
pub use forwarder::{FinalResponse, ForwardInput, ForwardOutcome, Forwarder};
pub use response::parse_upstream_error_body;
pub use streaming::{
    empty_response_reason, is_streaming_response, DeferredFinalization, SseTerminalErrorScanner, StreamingFinalizer,
};
