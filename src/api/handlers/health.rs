use axum::{http::StatusCode, Json};
use serde_json::{json, Value};

/// Health check endpoint. The mediator holds no persistent state; health is
/// process liveness plus build metadata.
pub async fn health_check() -> (StatusCode, Json<Value>) {
    tracing::debug!("Health check passed");
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Liveness check endpoint.
pub async fn liveness_check() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "alive"
        })),
    )
}
