//! The outbound transport layer the core requires of its HTTP client (§6), the agent
//! pool (C8), and the two adapters §6 calls out by name: a fault-tolerant manual gzip
//! decoder and a pull-based stream wrapper that turns upstream read errors into a
//! graceful close instead of a thrown exception.

mod agent_pool;
mod client;
mod degraded_probe;
mod gzip;
mod reqwest_client;

pub use agent_pool::{AgentKey, AgentPool};
pub use client::{BodyStream, HttpClient, OutboundRequest, OutboundResponse};
pub use degraded_probe::DegradedFeatureProbe;
pub use gzip::decode_gzip_body;
pub use reqwest_client::{is_http2_protocol_error, ReqwestHttpClient};
