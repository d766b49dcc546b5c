use std::sync::{Arc, OnceLock};
use std::time::SystemTime;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde_json::json;

use crate::server::error::{ServerError, ServerResult};
use crate::server::state::ServerState;

fn start_time() -> &'static SystemTime {
    static SERVER_START_TIME: OnceLock<SystemTime> = OnceLock::new();
    SERVER_START_TIME.get_or_init(SystemTime::now)
}

pub(crate) fn mark_started() {
    start_time();
}

fn uptime_secs() -> u64 {
    start_time().elapsed().map(|d| d.as_secs()).unwrap_or(0)
}

/// Liveness probe
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "artclust",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_secs(),
    }))
}

/// Prometheus text exposition; 404 when metrics are disabled.
pub async fn metrics(State(state): State<Arc<ServerState>>) -> ServerResult<String> {
    state
        .prometheus
        .as_ref()
        .map(|handle| handle.render())
        .ok_or(ServerError::NotFound)
}
