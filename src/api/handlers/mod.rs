//! Control endpoint handlers organized by resource, plus the gateway
//! fallback.

pub mod gateway;
pub mod routes;
pub mod services;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all control routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(system::routes())
        .merge(services::routes())
        .merge(routes::routes())
}
