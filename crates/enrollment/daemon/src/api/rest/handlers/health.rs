//! Health check handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::rest::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
    pub active_chains: usize,
}

/// Liveness plus the number of in-flight chains
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
        active_chains: state.orchestrator.get_stats().active,
    })
}
