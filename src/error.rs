//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the request-path error type: each variant maps to a
//! specific HTTP status code and structured JSON error response. The
//! startup-side errors ([`ManifestError`], [`SupervisorError`],
//! [`DiscoveryError`]) never reach a client; they are logged and isolate
//! the failing service.

use std::path::PathBuf;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "no service routed for path: /unknown",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges on [`GatewayError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Request-path error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                |
/// |-----------|-----------------|----------------------------|
/// | 1000–1999 | Validation      | 400 / 401 / 413            |
/// | 2000–2999 | Not Found       | 404 Not Found              |
/// | 3000–3999 | Server          | 500 Internal Server Error  |
/// | 5000–5999 | Upstream        | 502 Bad Gateway / 504      |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No route prefix matches the request path.
    #[error("no service routed for path: {0}")]
    RouteNotFound(String),

    /// No registered service with the given name.
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    /// The authentication pipeline denied the request.
    #[error("unauthorized")]
    Unauthorized,

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The request body exceeds the configured buffer limit.
    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    /// The upstream service could not be reached.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The upstream service did not answer in time.
    #[error("upstream timed out")]
    UpstreamTimeout,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::PayloadTooLarge(_) => 1413,
            Self::Unauthorized => 1401,
            Self::RouteNotFound(_) => 2001,
            Self::ServiceNotFound(_) => 2002,
            Self::Internal(_) => 3000,
            Self::UpstreamUnavailable(_) => 5002,
            Self::UpstreamTimeout => 5004,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RouteNotFound(_) | Self::ServiceNotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::UpstreamTimeout
        } else {
            Self::UpstreamUnavailable(err.to_string())
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        if status == StatusCode::UNAUTHORIZED
            && let Ok(value) = "Bearer".parse()
        {
            response.headers_mut().insert("WWW-Authenticate", value);
        }
        response
    }
}

/// Failure to load one service manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("cannot read manifest {path}: {source}")]
    Read {
        /// Manifest path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest is not valid JSON for the manifest schema.
    #[error("malformed manifest {path}: {source}")]
    Parse {
        /// Manifest path.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The manifest parsed but violates a field constraint.
    #[error("invalid manifest {path}: {reason}")]
    Invalid {
        /// Manifest path.
        path: PathBuf,
        /// Which constraint failed.
        reason: String,
    },
}

/// Failure while bringing a service process up.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// A declared setup script does not exist.
    #[error("missing setup script {0}")]
    SetupMissing(PathBuf),

    /// The setup script exists but is not executable.
    #[error("setup script {0} is not executable")]
    SetupNotExecutable(PathBuf),

    /// The setup script ran and exited unsuccessfully.
    #[error("setup for {service} exited with {code:?}")]
    SetupFailed {
        /// Service name.
        service: String,
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
    },

    /// The setup script exceeded the configured timeout and was killed.
    #[error("setup for {service} timed out after {timeout:?}")]
    SetupTimedOut {
        /// Service name.
        service: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// A process could not be spawned at all.
    #[error("failed to spawn {what} for {service}: {source}")]
    Spawn {
        /// Service name.
        service: String,
        /// `"setup"` or `"start command"`.
        what: &'static str,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Failure scanning the services root.
#[derive(Debug, thiserror::Error)]
#[error("cannot scan services root {path}: {source}")]
pub struct DiscoveryError {
    /// Directory being scanned.
    pub path: PathBuf,
    /// Underlying I/O error.
    #[source]
    pub source: std::io::Error,
}
