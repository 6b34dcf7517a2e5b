//! Liveness endpoint.

use axum::Json;

use crate::models::HealthResponse;

/// `GET /health` — process is up and serving.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: gatekeep_core::version().into(),
    })
}
