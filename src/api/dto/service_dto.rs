//! Service, route and health DTOs for the control endpoints.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{RouteEntry, ServiceState};
use crate::service::ServiceSummary;

/// One service as shown by `GET /services`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ServiceSummaryDto {
    /// Service name.
    pub name: String,
    /// Declared language.
    pub language: String,
    /// Directory the service was discovered in.
    pub base_path: String,
    /// Assigned route, absent until the next rebuild for late registrations.
    pub route: Option<String>,
    /// Lifecycle state.
    pub state: ServiceState,
    /// OS process id while the start command runs.
    pub pid: Option<u32>,
    /// Exit code of the last start-command process.
    pub exit_code: Option<i32>,
    /// When the start command was launched.
    pub started_at: Option<DateTime<Utc>>,
    /// Reason for the last failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Whether the manifest declares an `auth` block.
    pub auth_configured: bool,
    /// When the service was registered.
    pub registered_at: DateTime<Utc>,
}

impl From<ServiceSummary> for ServiceSummaryDto {
    fn from(summary: ServiceSummary) -> Self {
        Self {
            name: summary.name,
            language: summary.language,
            base_path: summary.base_path.display().to_string(),
            route: summary.route,
            state: summary.status.state,
            pid: summary.status.pid,
            exit_code: summary.status.exit_code,
            started_at: summary.status.started_at,
            last_error: summary.status.last_error,
            auth_configured: summary.auth_configured,
            registered_at: summary.registered_at,
        }
    }
}

/// Response body for `GET /services`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceListResponse {
    /// Services in registration order.
    pub services: Vec<ServiceSummaryDto>,
    /// Number of services.
    pub total: usize,
}

/// Response body for `GET /routes` and `POST /routes/rebuild`.
#[derive(Debug, Serialize, ToSchema)]
pub struct RouteTableResponse {
    /// Routes in assignment order.
    pub routes: Vec<RouteEntry>,
    /// Number of routes.
    pub total: usize,
}

impl From<Vec<RouteEntry>> for RouteTableResponse {
    fn from(routes: Vec<RouteEntry>) -> Self {
        Self {
            total: routes.len(),
            routes,
        }
    }
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Always `"healthy"` while the server answers.
    pub status: String,
    /// Current server time, RFC 3339.
    pub timestamp: String,
    /// Crate version.
    pub version: String,
    /// Number of registered services.
    pub services: usize,
}
