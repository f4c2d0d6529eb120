//! Chain introspection handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use enrollment_engine::DependencyMap;
use enrollment_types::{Chain, ChainId, ChainStats, EventKind};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};

/// Query parameters for history
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

fn parse_chain_id(id: &str) -> ApiResult<ChainId> {
    id.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid chain id: {}", id)))
}

/// Current snapshot of a running or retained chain
pub async fn get_chain(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Chain>> {
    let chain_id = parse_chain_id(&id)?;
    state
        .orchestrator
        .get_chain_status(&chain_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Chain {} not found", chain_id)))
}

/// Re-run the unsuccessful steps of a terminal chain
pub async fn rerun_chain(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Chain>> {
    let chain_id = parse_chain_id(&id)?;
    let chain = state.orchestrator.rerun_failed_steps(&chain_id)?;
    info!(original = %chain_id, chain_id = %chain.id, "Re-run requested");
    Ok(Json(chain))
}

/// Most recent terminal chains, newest first
pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<Chain>> {
    Json(state.orchestrator.get_chain_history(query.limit))
}

pub async fn get_stats(State(state): State<AppState>) -> Json<ChainStats> {
    Json(state.orchestrator.get_stats())
}

pub async fn get_dependencies(
    State(state): State<AppState>,
) -> Json<BTreeMap<EventKind, DependencyMap>> {
    Json(state.orchestrator.get_dependency_map())
}
