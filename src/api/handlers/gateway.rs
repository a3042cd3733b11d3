//! Fallback handler forwarding everything else to registered services.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::response::Response;

use crate::app_state::AppState;
use crate::error::GatewayError;

/// Dispatches a request that matched no control endpoint.
///
/// # Errors
///
/// Returns [`GatewayError`] when no route matches, auth denies the
/// request, or the upstream fails.
pub async fn dispatch(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, GatewayError> {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    state.gateway.dispatch(request, client).await
}
