//! Gateway service: routes, authenticates and forwards inbound requests.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::response::Response;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tracing::Instrument;
use uuid::Uuid;

use super::proxy::UpstreamProxy;
use crate::auth::{AuthEngine, AuthRequest};
use crate::domain::{
    ProcessStatus, RouteEntry, RouteTable, ServiceDescriptor, ServiceRegistry, SharedRouteTable,
};
use crate::error::GatewayError;

/// Point-in-time view of one registered service.
#[derive(Debug, Clone)]
pub struct ServiceSummary {
    /// Service name.
    pub name: String,
    /// Declared language.
    pub language: String,
    /// Directory the service was discovered in.
    pub base_path: PathBuf,
    /// Route currently assigned, if any.
    pub route: Option<String>,
    /// Whether the manifest has an `auth` block.
    pub auth_configured: bool,
    /// When the service was registered.
    pub registered_at: DateTime<Utc>,
    /// Process status.
    pub status: ProcessStatus,
}

/// Request-path coordinator.
///
/// Owns the published [`SharedRouteTable`] and reads the
/// [`ServiceRegistry`]; every dispatched request resolves its route,
/// passes through the [`AuthEngine`] and, if authorized, is forwarded by
/// the [`UpstreamProxy`].
#[derive(Debug)]
pub struct GatewayService {
    registry: Arc<ServiceRegistry>,
    routes: SharedRouteTable,
    auth: AuthEngine,
    proxy: UpstreamProxy,
    max_body_bytes: usize,
}

impl GatewayService {
    /// Creates the service and builds the initial route table from the
    /// registry's current contents.
    pub async fn new(
        registry: Arc<ServiceRegistry>,
        auth: AuthEngine,
        proxy: UpstreamProxy,
        max_body_bytes: usize,
    ) -> Self {
        let services = registry.list().await;
        let table = RouteTable::build(services.iter().map(Arc::as_ref));
        tracing::info!(routes = table.len(), "route table built");
        Self {
            registry,
            routes: SharedRouteTable::new(table),
            auth,
            proxy,
            max_body_bytes,
        }
    }

    /// Returns a reference to the inner [`ServiceRegistry`].
    #[must_use]
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Handles one request that matched no control endpoint.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::RouteNotFound`] if no route prefix matches; auth
    ///   does not run.
    /// - [`GatewayError::Unauthorized`] if the auth pipeline denies it.
    /// - [`GatewayError::PayloadTooLarge`] if the body exceeds the limit.
    /// - [`GatewayError::InvalidRequest`] if the body cannot be read or the
    ///   token cannot be forwarded.
    /// - Upstream errors from [`UpstreamProxy::forward`].
    pub async fn dispatch(
        &self,
        request: Request,
        client: Option<SocketAddr>,
    ) -> Result<Response, GatewayError> {
        let span = tracing::info_span!(
            "dispatch",
            request_id = %Uuid::new_v4(),
            method = %request.method(),
            path = %request.uri().path(),
        );
        self.dispatch_inner(request, client).instrument(span).await
    }

    async fn dispatch_inner(
        &self,
        request: Request,
        client: Option<SocketAddr>,
    ) -> Result<Response, GatewayError> {
        let (parts, body) = request.into_parts();
        let path = parts.uri.path();
        let table = self.routes.snapshot().await;

        let Some(matched) = table.resolve(path) else {
            tracing::debug!("no route matched");
            return Err(GatewayError::RouteNotFound(path.to_string()));
        };

        let service = self.registry.get(matched.service).await;
        let decision = self.auth.authorize(
            service.as_deref(),
            &AuthRequest {
                headers: &parts.headers,
                uri: &parts.uri,
                client,
                route: matched.prefix,
            },
        );
        let (true, Some(service)) = (decision.authorized, service) else {
            return Err(GatewayError::Unauthorized);
        };

        let body = read_body(body, self.max_body_bytes).await?;
        let response = self
            .proxy
            .forward(
                &service,
                matched.remainder,
                &parts,
                body,
                decision.enriched_header_value.as_deref(),
            )
            .await;

        match &response {
            Ok(resp) => tracing::info!(
                service = service.name(),
                status = resp.status().as_u16(),
                "request forwarded"
            ),
            Err(err) => tracing::warn!(service = service.name(), error = %err, "forwarding failed"),
        }
        response
    }

    /// Rebuilds the route table from a fresh registry snapshot and
    /// publishes it atomically.
    pub async fn rebuild_routes(&self) -> Arc<RouteTable> {
        let services = self.registry.list().await;
        let table = RouteTable::build(services.iter().map(Arc::as_ref));
        let _ = self.routes.swap(table).await;
        let current = self.routes.snapshot().await;
        tracing::info!(routes = current.len(), "route table rebuilt");
        current
    }

    /// Active route entries in assignment order.
    pub async fn route_entries(&self) -> Vec<RouteEntry> {
        self.routes.snapshot().await.entries().to_vec()
    }

    /// Registered service names, sorted.
    pub async fn endpoints(&self) -> Vec<String> {
        self.registry.names().await
    }

    /// Summaries of every registered service in registration order.
    pub async fn summaries(&self) -> Vec<ServiceSummary> {
        let table = self.routes.snapshot().await;
        let mut out = Vec::new();
        for descriptor in self.registry.list().await {
            out.push(summarize(&descriptor, &table).await);
        }
        out
    }

    /// Summary of the service registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ServiceNotFound`] if no such service exists.
    pub async fn summary(&self, name: &str) -> Result<ServiceSummary, GatewayError> {
        let descriptor = self
            .registry
            .get(name)
            .await
            .ok_or_else(|| GatewayError::ServiceNotFound(name.to_string()))?;
        let table = self.routes.snapshot().await;
        Ok(summarize(&descriptor, &table).await)
    }
}

async fn summarize(descriptor: &ServiceDescriptor, table: &RouteTable) -> ServiceSummary {
    let config = descriptor.config();
    ServiceSummary {
        name: descriptor.name().to_string(),
        language: config.language.clone(),
        base_path: config.base_path.clone(),
        route: table.route_for(descriptor.name()).map(str::to_string),
        auth_configured: descriptor.auth().is_some(),
        registered_at: descriptor.registered_at(),
        status: descriptor.status().await,
    }
}

/// Buffers `body`, refusing anything longer than `limit` bytes.
async fn read_body(body: Body, limit: usize) -> Result<Bytes, GatewayError> {
    let mut stream = body.into_data_stream();
    let mut buffered: Vec<u8> = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| GatewayError::InvalidRequest(format!("reading request body: {e}")))?;
        if buffered.len().saturating_add(chunk.len()) > limit {
            return Err(GatewayError::PayloadTooLarge(limit));
        }
        buffered.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buffered))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::auth::{AuthConfig, ExtractionMethod, ValidationStrategy};
    use crate::domain::{ServiceConfig, ServiceState};

    fn descriptor(name: &str, route: &str, auth: Option<AuthConfig>) -> Arc<ServiceDescriptor> {
        Arc::new(ServiceDescriptor::new(ServiceConfig {
            name: name.to_string(),
            language: "python".to_string(),
            route: Some(route.to_string()),
            // Nothing listens here; forwarding must fail if it is attempted.
            upstream: Some("http://127.0.0.1:9".to_string()),
            auth,
            ..ServiceConfig::default()
        }))
    }

    async fn gateway(services: Vec<Arc<ServiceDescriptor>>) -> GatewayService {
        let registry = Arc::new(ServiceRegistry::new());
        for service in services {
            let _ = registry.register(service).await;
        }
        let Ok(proxy) = UpstreamProxy::new("http://127.0.0.1:9", Duration::from_secs(2)) else {
            panic!("client must build");
        };
        GatewayService::new(registry, AuthEngine::default(), proxy, 1024).await
    }

    fn request(uri: &str) -> Request {
        let Ok(req) = axum::http::Request::builder().uri(uri).body(Body::empty()) else {
            panic!("valid request");
        };
        req
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let gw = gateway(vec![descriptor("billing", "/billing", None)]).await;
        let Err(err) = gw.dispatch(request("/shipping/x"), None).await else {
            panic!("expected an error");
        };
        assert!(matches!(err, GatewayError::RouteNotFound(_)));
    }

    #[tokio::test]
    async fn service_without_auth_is_denied_by_default() {
        let gw = gateway(vec![descriptor("billing", "/billing", None)]).await;
        let Err(err) = gw.dispatch(request("/billing/invoices"), None).await else {
            panic!("expected an error");
        };
        assert!(matches!(err, GatewayError::Unauthorized));
    }

    #[tokio::test]
    async fn authorized_request_reaches_forwarding() {
        let auth = AuthConfig {
            supported_extraction_methods: vec![ExtractionMethod::PathSegment],
            validation_strategy: ValidationStrategy::Prefix,
            expected_token: "tok_".to_string(),
            token_regex: String::new(),
        };
        let gw = gateway(vec![descriptor("billing", "/billing", Some(auth))]).await;
        let Err(err) = gw.dispatch(request("/billing/token/tok_1/x"), None).await else {
            panic!("expected an upstream error");
        };
        assert!(matches!(
            err,
            GatewayError::UpstreamUnavailable(_) | GatewayError::UpstreamTimeout
        ));
    }

    #[tokio::test]
    async fn rebuild_picks_up_new_registrations() {
        let gw = gateway(vec![descriptor("a", "/shared", None)]).await;
        let _ = gw
            .registry()
            .register(descriptor("b", "/shared", None))
            .await;
        assert_eq!(gw.route_entries().await.len(), 1);

        let table = gw.rebuild_routes().await;
        assert_eq!(table.route_for("b"), Some("/shared-1"));
        assert_eq!(gw.route_entries().await.len(), 2);
    }

    #[tokio::test]
    async fn summaries_report_route_and_state() {
        let gw = gateway(vec![descriptor("billing", "/pay", None)]).await;
        let Ok(summary) = gw.summary("billing").await else {
            panic!("service must exist");
        };
        assert_eq!(summary.route.as_deref(), Some("/pay"));
        assert_eq!(summary.status.state, ServiceState::Starting);
        assert!(!summary.auth_configured);
        assert!(summary.registered_at <= Utc::now());
        assert_eq!(gw.summaries().await.len(), 1);
        assert!(matches!(
            gw.summary("nope").await,
            Err(GatewayError::ServiceNotFound(_))
        ));
        assert_eq!(gw.endpoints().await, vec!["billing"]);
    }

    #[tokio::test]
    async fn body_within_limit_is_buffered() {
        let Ok(bytes) = read_body(Body::from("hello"), 5).await else {
            panic!("body fits the limit");
        };
        assert_eq!(bytes.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn body_over_limit_is_too_large() {
        let chunks = futures_util::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"def")),
        ]);
        let result = read_body(Body::from_stream(chunks), 4).await;
        assert!(matches!(result, Err(GatewayError::PayloadTooLarge(4))));
    }

    #[tokio::test]
    async fn broken_body_stream_is_a_bad_request() {
        let chunks = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Err(std::io::Error::other("connection reset")),
        ]);
        let result = read_body(Body::from_stream(chunks), 1024).await;
        assert!(matches!(result, Err(GatewayError::InvalidRequest(_))));
    }
}
