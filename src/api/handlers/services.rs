//! Service inspection handlers: list and get.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{ServiceListResponse, ServiceSummaryDto};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};

/// `GET /services` — All registered services with their process status.
#[utoipa::path(
    get,
    path = "/services",
    tag = "Services",
    summary = "List services",
    description = "Returns every registered service in registration order, including services whose setup or start command failed.",
    responses(
        (status = 200, description = "Service list", body = ServiceListResponse),
    )
)]
pub async fn list_services(State(state): State<AppState>) -> impl IntoResponse {
    let services: Vec<ServiceSummaryDto> = state
        .gateway
        .summaries()
        .await
        .into_iter()
        .map(ServiceSummaryDto::from)
        .collect();
    Json(ServiceListResponse {
        total: services.len(),
        services,
    })
}

/// `GET /services/{name}` — One registered service.
///
/// # Errors
///
/// Returns [`GatewayError::ServiceNotFound`] if no service has that name.
#[utoipa::path(
    get,
    path = "/services/{name}",
    tag = "Services",
    summary = "Get service",
    params(("name" = String, Path, description = "Service name")),
    responses(
        (status = 200, description = "Service summary", body = ServiceSummaryDto),
        (status = 404, description = "Service not found", body = ErrorResponse),
    )
)]
pub async fn get_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let summary = state.gateway.summary(&name).await?;
    Ok(Json(ServiceSummaryDto::from(summary)))
}

/// Service routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/services", get(list_services))
        .route("/services/{name}", get(get_service))
}
