//! Processing restriction routes (C5, Article 18)

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use plexmcp_compliance::restriction::RestrictionManager;
use plexmcp_compliance::types::RestrictionReason;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::OperatorIdentity;
use crate::error::ApiResult;
use crate::routes::extract_client_ip;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RequestRestrictionBody {
    pub subject_email: String,
    pub reason: RestrictionReason,
    pub reason_details: Option<String>,
    pub restricted_operations: Option<Vec<String>>,
    pub restricted_tables: Option<Vec<String>>,
    pub expires_in_days: Option<i64>,
    pub request_id: Option<Uuid>,
}

pub async fn request_restriction(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(req): Json<RequestRestrictionBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let manager = RestrictionManager::new(&state.pool, state.dispatcher.as_ref());
    let ip = extract_client_ip(&headers);
    let ua = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let restriction = manager
        .request_restriction(
            &req.subject_email,
            req.reason,
            req.reason_details,
            req.restricted_operations,
            req.restricted_tables,
            req.expires_in_days,
            ip,
            ua,
            req.request_id,
        )
        .await?;
    Ok(Json(serde_json::json!(restriction)))
}

#[derive(Debug, Deserialize)]
pub struct LiftRestrictionBody {
    pub lift_reason: String,
}

pub async fn lift(
    State(state): State<AppState>,
    Extension(identity): Extension<OperatorIdentity>,
    Path(restriction_id): Path<Uuid>,
    Json(body): Json<LiftRestrictionBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let manager = RestrictionManager::new(&state.pool, state.dispatcher.as_ref());
    let restriction = manager
        .lift_restriction(restriction_id, &identity.0, &body.lift_reason)
        .await?;
    Ok(Json(serde_json::json!(restriction)))
}

#[derive(Debug, Deserialize)]
pub struct ActiveQuery {
    pub subject_email: Option<String>,
}

pub async fn active(
    State(state): State<AppState>,
    Query(q): Query<ActiveQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let manager = RestrictionManager::new(&state.pool, state.dispatcher.as_ref());
    let rows = manager.get_active_restrictions(q.subject_email.as_deref()).await?;
    Ok(Json(serde_json::json!(rows)))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub subject_email: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let manager = RestrictionManager::new(&state.pool, state.dispatcher.as_ref());
    let rows = manager.get_restriction_history(&q.subject_email, q.limit).await?;
    Ok(Json(serde_json::json!(rows)))
}

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    pub subject_email: String,
    pub operation: Option<String>,
    pub table: Option<String>,
}

pub async fn check(
    State(state): State<AppState>,
    Query(q): Query<CheckQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let manager = RestrictionManager::new(&state.pool, state.dispatcher.as_ref());
    let restricted = manager
        .check_restriction(&q.subject_email, q.operation.as_deref(), q.table.as_deref())
        .await?;
    Ok(Json(serde_json::json!({ "restricted": restricted })))
}
