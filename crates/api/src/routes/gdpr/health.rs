//! GDPR subsystem health and compliance-summary endpoints.

use axum::{extract::State, http::StatusCode, Json};
use plexmcp_compliance::consent::ConsentManager;
use plexmcp_compliance::request_engine::RequestEngine;
use plexmcp_compliance::restriction::RestrictionManager;
use plexmcp_compliance::retention::RetentionManager;
use serde::Serialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Serialize)]
pub struct GdprHealth {
    pub database: String,
}

/// `GET /api/v1/gdpr/health`: pings the database the same way the
/// top-level health route does, scoped to this subsystem's own prefix.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<GdprHealth>) {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => (StatusCode::OK, Json(GdprHealth { database: "healthy".into() })),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(GdprHealth { database: "unhealthy".into() }),
        ),
    }
}

#[derive(Serialize)]
pub struct ComplianceSummary {
    pub pending_requests: usize,
    pub overdue_requests: usize,
    pub active_restrictions: usize,
    pub active_consents: i64,
    pub retention_policies: i64,
}

/// Dashboard rollup across C3/C5/C6/C7 — not part of the original
/// interface surface, added because an operator-facing engine needs a
/// single place to see its own backlog at a glance.
pub async fn summary(State(state): State<AppState>) -> ApiResult<Json<ComplianceSummary>> {
    let requests = RequestEngine::new(&state.pool, state.dispatcher.as_ref(), state.config.export_dir.clone());
    let restrictions = RestrictionManager::new(&state.pool, state.dispatcher.as_ref());
    let consents = ConsentManager::new(&state.pool, state.dispatcher.as_ref());
    let retention = RetentionManager::new(&state.pool, state.dispatcher.as_ref());

    let pending = requests.pending().await?;
    let overdue = requests.overdue().await?;
    let active_restrictions = restrictions.get_active_restrictions(None).await?;

    Ok(Json(ComplianceSummary {
        pending_requests: pending.len(),
        overdue_requests: overdue.len(),
        active_restrictions: active_restrictions.len(),
        active_consents: consents.count_active().await?,
        retention_policies: retention.count_policies().await?,
    }))
}
