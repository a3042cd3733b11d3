//! OpenAPI document for the control endpoints.

use utoipa::OpenApi;

use crate::api::dto::{HealthResponse, RouteTableResponse, ServiceListResponse, ServiceSummaryDto};
use crate::api::handlers::{routes, services, system};
use crate::domain::{RouteEntry, ServiceState};
use crate::error::{ErrorBody, ErrorResponse};

/// Generated OpenAPI specification.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "polyglot-gateway",
        description = "Control endpoints of the polyglot API gateway. Every other path is routed to a registered service."
    ),
    paths(
        system::health_handler,
        system::test_handler,
        system::endpoints_handler,
        services::list_services,
        services::get_service,
        routes::list_routes,
        routes::rebuild_routes,
    ),
    components(schemas(
        HealthResponse,
        ServiceListResponse,
        ServiceSummaryDto,
        ServiceState,
        RouteTableResponse,
        RouteEntry,
        ErrorResponse,
        ErrorBody,
    )),
    tags(
        (name = "System", description = "Health and liveness"),
        (name = "Services", description = "Registered services and their processes"),
        (name = "Routes", description = "Active route table"),
    )
)]
pub struct ApiDoc;
