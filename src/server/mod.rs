//! HTTP service around the clustering engine (feature `server`).
//!
//! # API Endpoints
//!
//! Public:
//!
//! - `GET /` - API information
//! - `GET /health` - Liveness probe
//! - `GET /metrics` - Prometheus metrics
//!
//! Protected when `server.api_keys` is non-empty:
//!
//! - `GET /v1/clusters` - Persisted clusters
//! - `POST /v1/recluster` - Run both passes over the posted items
//! - `POST /v1/clusters/label` - Retry naming only

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod telemetry;

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::observer::set_run_metrics;

pub use error::{ServerError, ServerResult};
pub use state::ServerState;

use middleware::{api_key_auth, log_requests, request_id};
use routes::{api_info, clusters, health, not_found};

/// Build the router with all routes and middleware.
pub fn build_router(state: Arc<ServerState>) -> Router {
    let public_routes = Router::new()
        .route("/", get(api_info))
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics));

    let protected_routes = Router::new()
        .route("/v1/clusters", get(clusters::list_clusters))
        .route("/v1/recluster", post(clusters::recluster))
        .route("/v1/clusters/label", post(clusters::label))
        .layer(from_fn_with_state(state.clone(), api_key_auth));

    let server_cfg = &state.config.server;
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(request_id))
        .layer(from_fn(log_requests))
        // Body limit must wrap the timeout: `Timeout` needs a `Default`
        // response body, which `RequestBodyLimit`'s body wrapper lacks.
        .layer(RequestBodyLimitLayer::new(server_cfg.max_body_size()))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            server_cfg.timeout(),
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(not_found)
        .layer(middleware)
        .with_state(state)
}

/// Start the HTTP server and block until SIGTERM or Ctrl+C.
pub async fn start_server(config: AppConfig) -> anyhow::Result<()> {
    telemetry::init_tracing(&config.server.log_level);
    health::mark_started();

    let prometheus = if config.server.metrics_enabled {
        let handle = telemetry::install_prometheus()?;
        set_run_metrics(Some(Arc::new(telemetry::PrometheusRunMetrics)));
        Some(handle)
    } else {
        None
    };

    let addr = config.server.socket_addr()?;
    let state = Arc::new(ServerState::from_config(config, prometheus)?);

    tracing::info!(
        %addr,
        api_keys = state.config.server.api_keys.len(),
        storage = ?state.config.storage.backend,
        labeler = ?state.config.naming.labeler,
        naming_policy = ?state.config.naming.policy,
        "starting artclust server"
    );

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
