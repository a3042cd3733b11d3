//! System endpoints: health check, liveness string, service names.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use crate::api::dto::HealthResponse;
use crate::app_state::AppState;

/// Body returned by `GET /test`.
pub const TEST_MESSAGE: &str = "Polyglot Gateway is working!";

/// `GET /health` — Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns gateway health status, version, current timestamp and the number of registered services.",
    responses(
        (status = 200, description = "Gateway is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            services: state.gateway.registry().len().await,
        }),
    )
}

/// `GET /test` — Fixed confirmation string.
#[utoipa::path(
    get,
    path = "/test",
    tag = "System",
    summary = "Liveness string",
    responses(
        (status = 200, description = "Gateway is answering", body = String, content_type = "text/plain"),
    )
)]
pub async fn test_handler() -> &'static str {
    TEST_MESSAGE
}

/// `GET /endpoints` — Registered service names.
#[utoipa::path(
    get,
    path = "/endpoints",
    tag = "System",
    summary = "List registered service names",
    description = "Returns the names of all registered services, sorted alphabetically.",
    responses(
        (status = 200, description = "Service names", body = Vec<String>),
    )
)]
pub async fn endpoints_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.gateway.endpoints().await)
}

/// System routes mounted at the root level.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/test", get(test_handler))
        .route("/endpoints", get(endpoints_handler))
}
