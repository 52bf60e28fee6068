//! `forward-proxy`: the multi-tenant LLM API reverse proxy binary. Wires the engine
//! (`forward-engine`), the rate-limit guard (`forward-ratelimit`), the transport layer
//! (`forward-transport`), and the tenant registry into an axum service, in the shape of
//! the teacher's own `axum-resilient-kv-store` example.

mod audit;
mod config;
mod handlers;
mod registry;
mod state;

use std::sync::Arc;

use axum::routing::post;
use axum::Router;
use clap::Parser;
use forward_engine::{EngineConfig, Forwarder};
use forward_ratelimit::RateLimitGuard;
use forward_transport::{AgentPool, ReqwestHttpClient};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::audit::TracingAuditSink;
use crate::config::CliArgs;
use crate::registry::TenantRegistry;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let registry = TenantRegistry::load(args.tenants_config.as_deref()).expect("failed to load tenant config");
    tracing::info!(
        providers = registry.providers().len(),
        endpoints = registry.endpoints().len(),
        "tenant registry loaded"
    );

    let agents = Arc::new(AgentPool::new());
    let transport = Arc::new(ReqwestHttpClient::new(agents.clone()));
    let forwarder = Arc::new(Forwarder::new(transport, agents, EngineConfig::from_env()));
    let guard = Arc::new(RateLimitGuard::new());

    let state = AppState { forwarder, guard, registry: Arc::new(registry), audit: Arc::new(TracingAuditSink) };

    let app = router(state);

    let listener = TcpListener::bind(("0.0.0.0", args.port)).await.expect("bind error");
    tracing::info!(port = args.port, "forward-proxy listening");
    axum::serve(listener, app.into_make_service()).await.expect("server error");
}

/// The small, fixed set of standard vendor-facing paths (§6) plus a catch-all fallback
/// for MCP passthrough — everything dispatches to the same handler, which tells them
/// apart by path and headers.
fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/messages", post(handlers::handle_request))
        .route("/v1/messages/count_tokens", post(handlers::handle_request))
        .route("/v1/responses", post(handlers::handle_request))
        .route("/v1/chat/completions", post(handlers::handle_request))
        .route("/v1/models", post(handlers::handle_request).get(handlers::handle_request))
        .fallback(handlers::handle_request)
        .with_state(state)
}
