//! polyglot-gateway server entry point.
//!
//! Discovers and launches services, then serves the gateway over HTTP
//! until Ctrl-C or SIGTERM, stopping every child process on the way out.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use polyglot_gateway::api;
use polyglot_gateway::app_state::AppState;
use polyglot_gateway::auth::AuthEngine;
use polyglot_gateway::config::{GatewayConfig, LogFormat};
use polyglot_gateway::domain::ServiceRegistry;
use polyglot_gateway::service::{
    DiscoverySettings, GatewayService, ProcessSupervisor, ServiceDiscovery, SupervisorSettings,
    UpstreamProxy,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = GatewayConfig::from_env().map_err(|e| anyhow::anyhow!("configuration: {e}"))?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, root = %config.services_root.display(), "starting polyglot-gateway");

    // Discover, set up and launch services
    let registry = Arc::new(ServiceRegistry::new());
    let supervisor = Arc::new(ProcessSupervisor::new(SupervisorSettings::from(&config)));
    let discovery = ServiceDiscovery::new(
        DiscoverySettings::from(&config),
        Arc::clone(&registry),
        Arc::clone(&supervisor),
    );
    let report = discovery.run().await;
    tracing::info!(
        registered = report.registered.len(),
        failed = report.failed.len(),
        conflicts = report.conflicts.len(),
        "service discovery finished"
    );

    // Build service layer
    let proxy = UpstreamProxy::new(&config.default_upstream, config.proxy_timeout)?;
    let gateway = Arc::new(
        GatewayService::new(
            registry,
            AuthEngine::new(config.unauthenticated_policy),
            proxy,
            config.max_body_bytes,
        )
        .await,
    );

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(
            config.proxy_timeout.saturating_add(Duration::from_secs(5)),
        ))
        .with_state(AppState { gateway });

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    tracing::info!("stopping supervised services");
    supervisor.stop_all().await;

    served.context("server error")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                let _ = signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
