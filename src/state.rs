//! Process-wide service state: the forwarder (composing C1-C3, C5-C12), the rate-limit
//! guard (C4), and the tenant registry, shared across every inbound connection.

use std::sync::Arc;

use forward_engine::Forwarder;
use forward_ratelimit::RateLimitGuard;

use crate::audit::AuditSink;
use crate::registry::TenantRegistry;

#[derive(Clone)]
pub struct AppState {
    pub forwarder: Arc<Forwarder>,
    pub guard: Arc<RateLimitGuard>,
    pub registry: Arc<TenantRegistry>,
    pub audit: Arc<dyn AuditSink>,
}
