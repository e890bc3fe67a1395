use axum::{response::IntoResponse, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

/// Liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        service: "urna",
    })
}
