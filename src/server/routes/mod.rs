//! API route handlers
//!
//! - `health`: liveness and Prometheus metrics
//! - `clusters`: listing, reclustering and naming

pub mod clusters;
pub mod health;

use axum::Json;
use axum::extract::FromRequest;
use axum::response::IntoResponse;
use serde_json::json;

use super::error::ServerError;

/// JSON body extractor whose rejections use the `ServerError` body.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ServerError))]
pub struct ApiJson<T>(pub T);

/// API version and base info
pub async fn api_info() -> impl IntoResponse {
    Json(json!({
        "name": "artclust",
        "version": env!("CARGO_PKG_VERSION"),
        "api_version": "v1",
        "endpoints": [
            "/v1/clusters",
            "/v1/recluster",
            "/v1/clusters/label",
            "/health",
            "/metrics"
        ]
    }))
}

/// 404 Not Found handler
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
