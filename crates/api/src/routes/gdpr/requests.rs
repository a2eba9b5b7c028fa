//! Request-engine routes (C7)

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use plexmcp_compliance::request_engine::RequestEngine;
use plexmcp_compliance::types::RequestType;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::OperatorIdentity;
use crate::error::ApiResult;
use crate::routes::extract_client_ip;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub subject_email: String,
    pub request_type: RequestType,
}

pub async fn create(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(req): Json<CreateRequestBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let engine = RequestEngine::new(&state.pool, state.dispatcher.as_ref(), state.config.export_dir.clone());
    let ip = extract_client_ip(&headers);
    let ua = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let request = engine.create(&req.subject_email, req.request_type, ip, ua).await?;
    state.notifier().notify_request_created(&request).await;
    Ok(Json(serde_json::json!(request)))
}

pub async fn get(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let engine = RequestEngine::new(&state.pool, state.dispatcher.as_ref(), state.config.export_dir.clone());
    let request = engine.get(request_id).await?;
    Ok(Json(serde_json::json!(request)))
}

pub async fn process(
    State(state): State<AppState>,
    Extension(identity): Extension<OperatorIdentity>,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let engine = RequestEngine::new(&state.pool, state.dispatcher.as_ref(), state.config.export_dir.clone());
    let outcome = engine.process(request_id, Some(identity.0)).await?;
    if outcome.status == plexmcp_compliance::types::RequestStatus::Completed {
        let request = engine.get(request_id).await?;
        state.notifier().notify_request_completed(&request).await;
    }
    Ok(Json(serde_json::json!(outcome)))
}

#[derive(Debug, Deserialize)]
pub struct RejectRequestBody {
    pub reason: String,
}

pub async fn reject(
    State(state): State<AppState>,
    Extension(identity): Extension<OperatorIdentity>,
    Path(request_id): Path<Uuid>,
    Json(body): Json<RejectRequestBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let engine = RequestEngine::new(&state.pool, state.dispatcher.as_ref(), state.config.export_dir.clone());
    let request = engine.reject(request_id, &body.reason, Some(identity.0)).await?;
    state.notifier().notify_request_rejected(&request, &body.reason).await;
    Ok(Json(serde_json::json!(request)))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let engine = RequestEngine::new(&state.pool, state.dispatcher.as_ref(), state.config.export_dir.clone());
    let request = engine.cancel(request_id).await?;
    Ok(Json(serde_json::json!(request)))
}

pub async fn pending(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let engine = RequestEngine::new(&state.pool, state.dispatcher.as_ref(), state.config.export_dir.clone());
    Ok(Json(serde_json::json!(engine.pending().await?)))
}

pub async fn overdue(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let engine = RequestEngine::new(&state.pool, state.dispatcher.as_ref(), state.config.export_dir.clone());
    Ok(Json(serde_json::json!(engine.overdue().await?)))
}
