//! HTTP layer: control endpoint handlers, DTOs, and router composition.
//!
//! Control endpoints are mounted at the root. Every other request falls
//! through to [`handlers::gateway::dispatch`].

pub mod dto;
pub mod handlers;
pub mod openapi;

use axum::Router;

use crate::app_state::AppState;

/// Builds the complete router: control endpoints, Swagger UI, and the
/// gateway fallback.
pub fn build_router() -> Router<AppState> {
    let router = Router::new().merge(handlers::routes());

    #[cfg(feature = "swagger-ui")]
    let router = {
        use utoipa::OpenApi;
        use utoipa_swagger_ui::SwaggerUi;
        router.merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
    };

    router.fallback(handlers::gateway::dispatch)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::body::Body;
    use axum::extract::State;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    use super::*;
    use crate::auth::{AuthConfig, AuthEngine, ExtractionMethod, INTERNAL_AUTH_HEADER, ValidationStrategy};
    use crate::domain::{ServiceConfig, ServiceDescriptor, ServiceRegistry};
    use crate::service::{GatewayService, UpstreamProxy};

    /// Local upstream echoing `path query internal-token`, counting hits.
    async fn spawn_upstream() -> (SocketAddr, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .fallback(|State(hits): State<Arc<AtomicUsize>>, req: Request<Body>| async move {
                hits.fetch_add(1, Ordering::SeqCst);
                let token = req
                    .headers()
                    .get(INTERNAL_AUTH_HEADER)
                    .map_or_else(|| "-".to_string(), |v| String::from_utf8_lossy(v.as_bytes()).into_owned());
                format!(
                    "{} {} {token}",
                    req.uri().path(),
                    req.uri().query().unwrap_or("-")
                )
            })
            .with_state(Arc::clone(&hits));

        let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind upstream");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("upstream address");
        };
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (addr, hits)
    }

    fn service(name: &str, route: &str, upstream: SocketAddr) -> Arc<ServiceDescriptor> {
        guarded_service(name, route, upstream, ValidationStrategy::ExactMatch, "secret")
    }

    fn guarded_service(
        name: &str,
        route: &str,
        upstream: SocketAddr,
        strategy: ValidationStrategy,
        expected: &str,
    ) -> Arc<ServiceDescriptor> {
        Arc::new(ServiceDescriptor::new(ServiceConfig {
            name: name.to_string(),
            route: Some(route.to_string()),
            upstream: Some(format!("http://{upstream}")),
            auth: Some(AuthConfig {
                supported_extraction_methods: vec![
                    ExtractionMethod::HeaderBearer,
                    ExtractionMethod::QueryParam,
                ],
                validation_strategy: strategy,
                expected_token: expected.to_string(),
                token_regex: String::new(),
            }),
            ..ServiceConfig::default()
        }))
    }

    async fn app(services: Vec<Arc<ServiceDescriptor>>) -> Router {
        let registry = Arc::new(ServiceRegistry::new());
        for s in services {
            let _ = registry.register(s).await;
        }
        let Ok(proxy) = UpstreamProxy::new("http://127.0.0.1:9", Duration::from_secs(5)) else {
            panic!("client must build");
        };
        let gateway = GatewayService::new(registry, AuthEngine::default(), proxy, 64).await;
        build_router().with_state(AppState {
            gateway: Arc::new(gateway),
        })
    }

    fn get(uri: &str) -> axum::http::request::Builder {
        Request::builder().method("GET").uri(uri)
    }

    async fn send(router: &Router, request: axum::http::request::Builder, body: Body) -> Response {
        let Ok(request) = request.body(body) else {
            panic!("valid request");
        };
        let Ok(response) = router.clone().oneshot(request).await else {
            panic!("router is infallible");
        };
        response
    }

    async fn text(response: Response) -> String {
        let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
            panic!("readable body");
        };
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[tokio::test]
    async fn forwards_with_gateway_token_and_stripped_prefix() {
        let (addr, hits) = spawn_upstream().await;
        let router = app(vec![service("billing", "/billing", addr)]).await;

        let request = get("/billing/invoices/7?page=2")
            .header("authorization", "Bearer secret")
            .header(INTERNAL_AUTH_HEADER, "forged");
        let response = send(&router, request, Body::empty()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text(response).await, "/invoices/7 page=2 secret");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_token_is_rejected_before_upstream() {
        let (addr, hits) = spawn_upstream().await;
        let router = app(vec![service("billing", "/billing", addr)]).await;

        let response = send(
            &router,
            get("/billing?auth_token=wrong"),
            Body::empty(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn token_with_control_characters_is_never_forwarded() {
        let (addr, hits) = spawn_upstream().await;
        let router = app(vec![guarded_service(
            "b",
            "/b",
            addr,
            ValidationStrategy::Prefix,
            "sec",
        )])
        .await;

        let response = send(&router, get("/b/x?auth_token=sec%0Aret"), Body::empty()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let response = send(&router, get("/b/x?auth_token=sec%C3%A9"), Body::empty()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text(response).await, "/x auth_token=sec%C3%A9 sec\u{e9}");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unmatched_path_is_not_found() {
        let (addr, hits) = spawn_upstream().await;
        let router = app(vec![service("billing", "/billing", addr)]).await;

        let response = send(
            &router,
            get("/shipping").header("authorization", "Bearer secret"),
            Body::empty(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let (addr, hits) = spawn_upstream().await;
        let router = app(vec![service("billing", "/billing", addr)]).await;

        let request = Request::builder()
            .method("POST")
            .uri("/billing/upload")
            .header("authorization", "Bearer secret");
        let response = send(&router, request, Body::from(vec![b'x'; 128])).await;

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn control_endpoints_answer() {
        let (addr, _) = spawn_upstream().await;
        let router = app(vec![
            service("zeta", "/zeta", addr),
            service("alpha", "/alpha", addr),
        ])
        .await;

        let response = send(&router, get("/test"), Body::empty()).await;
        assert_eq!(text(response).await, "Polyglot Gateway is working!");

        let response = send(&router, get("/endpoints"), Body::empty()).await;
        let Ok(names) = serde_json::from_str::<Vec<String>>(&text(response).await) else {
            panic!("endpoints must be a JSON array");
        };
        assert_eq!(names, vec!["alpha", "zeta"]);

        let response = send(&router, get("/services/nope"), Body::empty()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn reserved_path_stays_with_the_gateway() {
        let (addr, hits) = spawn_upstream().await;
        let router = app(vec![service("health", "/health", addr)]).await;

        let response = send(&router, get("/health"), Body::empty()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(text(response).await.contains("healthy"));

        let request = get("/health-1/status").header("authorization", "Bearer secret");
        let response = send(&router, request, Body::empty()).await;
        assert_eq!(text(response).await, "/status - secret");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rebuild_returns_route_table() {
        let (addr, _) = spawn_upstream().await;
        let router = app(vec![service("billing", "/billing", addr)]).await;

        let request = Request::builder().method("POST").uri("/routes/rebuild");
        let response = send(&router, request, Body::empty()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let Ok(json) = serde_json::from_str::<serde_json::Value>(&text(response).await) else {
            panic!("rebuild must return JSON");
        };
        assert_eq!(json.get("total").and_then(serde_json::Value::as_u64), Some(1));
        assert_eq!(
            json.pointer("/routes/0/prefix").and_then(serde_json::Value::as_str),
            Some("/billing")
        );
    }
}
