//! Unauthenticated system endpoints.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Prometheus text exposition of every registered metric.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.export_prometheus()
}
