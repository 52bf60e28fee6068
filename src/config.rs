//! The binary's own configuration: CLI flags (port, log level, tenant config path) via
//! `clap`, matching the teacher's `axum-resilient-kv-store` example, layered on top of
//! `forward_engine::EngineConfig`'s environment-driven knobs (§6).

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "forward-proxy", about = "Multi-tenant LLM API reverse proxy")]
pub struct CliArgs {
    /// Port the inbound HTTP surface listens on.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// `tracing-subscriber` env-filter directive, e.g. `info` or `forward_engine=debug`.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Path to a JSON tenant config (providers/endpoints/keys/users). Falls back to a
    /// small built-in demo tenant when unset.
    #[arg(long, env = "TENANTS_CONFIG")]
    pub tenants_config: Option<PathBuf>,
}
