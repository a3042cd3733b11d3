//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::service::GatewayService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Gateway service for routing, auth and forwarding.
    pub gateway: Arc<GatewayService>,
}
