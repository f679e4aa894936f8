//! Health check handler.

use axum::Json;
use serde::Serialize;

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service name.
    pub service: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Always "ok" when the service can respond.
    pub status: &'static str,
}

/// Health check.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        service: "aiorreal-quota-service",
        version: env!("CARGO_PKG_VERSION"),
        status: "ok",
    })
}
