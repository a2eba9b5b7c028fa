//! Retention scheduler routes (C6)

use axum::{
    extract::{Query, State},
    Json,
};
use plexmcp_compliance::retention::RetentionManager;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_policies(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let manager = RetentionManager::new(&state.pool, state.dispatcher.as_ref());
    Ok(Json(serde_json::json!(manager.list_policies().await?)))
}

#[derive(Debug, Deserialize)]
pub struct CleanupQuery {
    #[serde(default)]
    pub dry_run: bool,
}

/// Runs every active policy. `dry_run=true` reports what would happen
/// without touching any row — used both ad hoc and as the supplemented
/// cleanup-preview endpoint.
pub async fn run_cleanup(
    State(state): State<AppState>,
    Query(q): Query<CleanupQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let manager = RetentionManager::new(&state.pool, state.dispatcher.as_ref());
    let outcomes = manager.run_cleanup(q.dry_run).await?;
    Ok(Json(serde_json::json!({ "dry_run": q.dry_run, "outcomes": outcomes })))
}

pub async fn preview_cleanup(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let manager = RetentionManager::new(&state.pool, state.dispatcher.as_ref());
    let outcomes = manager.run_cleanup(true).await?;
    Ok(Json(serde_json::json!({ "outcomes": outcomes })))
}
