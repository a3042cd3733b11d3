//! Route table handlers: inspect and rebuild.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::RouteTableResponse;
use crate::app_state::AppState;

/// `GET /routes` — The active route table.
#[utoipa::path(
    get,
    path = "/routes",
    tag = "Routes",
    summary = "List routes",
    description = "Returns the published route table in assignment order.",
    responses(
        (status = 200, description = "Active routes", body = RouteTableResponse),
    )
)]
pub async fn list_routes(State(state): State<AppState>) -> impl IntoResponse {
    Json(RouteTableResponse::from(state.gateway.route_entries().await))
}

/// `POST /routes/rebuild` — Rebuild routes from the current registry.
#[utoipa::path(
    post,
    path = "/routes/rebuild",
    tag = "Routes",
    summary = "Rebuild routes",
    description = "Recomputes the route table from a fresh registry snapshot and swaps it in atomically.",
    responses(
        (status = 200, description = "Rebuilt routes", body = RouteTableResponse),
    )
)]
pub async fn rebuild_routes(State(state): State<AppState>) -> impl IntoResponse {
    let table = state.gateway.rebuild_routes().await;
    Json(RouteTableResponse::from(table.entries().to_vec()))
}

/// Route table routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/routes", get(list_routes))
        .route("/routes/rebuild", post(rebuild_routes))
}
