//! Data operator routes (C4): export, erasure, rectification.

use std::collections::HashMap;

use axum::{
    extract::{Extension, Query, State},
    Json,
};
use plexmcp_compliance::data_operator::DataOperator;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::OperatorIdentity;
use crate::error::ApiResult;
use crate::routes::extract_client_ip;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubjectEmailQuery {
    pub subject_email: String,
}

pub async fn preview_export(
    State(state): State<AppState>,
    Query(q): Query<SubjectEmailQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let operator = DataOperator::new(&state.pool, state.dispatcher.as_ref(), state.config.export_dir.clone());
    Ok(Json(serde_json::json!(operator.preview_export(&q.subject_email).await?)))
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub subject_email: String,
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "json".to_string()
}

pub async fn export(
    State(state): State<AppState>,
    Extension(identity): Extension<OperatorIdentity>,
    Json(req): Json<ExportRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let operator = DataOperator::new(&state.pool, state.dispatcher.as_ref(), state.config.export_dir.clone());
    let result = operator
        .export_data(&req.subject_email, &req.format, None, Some(identity.0))
        .await?;
    Ok(Json(serde_json::json!(result)))
}

pub async fn preview_erasure(
    State(state): State<AppState>,
    Query(q): Query<SubjectEmailQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let operator = DataOperator::new(&state.pool, state.dispatcher.as_ref(), state.config.export_dir.clone());
    Ok(Json(serde_json::json!(operator.preview_erasure(&q.subject_email).await?)))
}

#[derive(Debug, Deserialize)]
pub struct EraseRequest {
    pub subject_email: String,
    #[serde(default)]
    pub dry_run: bool,
}

pub async fn erase(
    State(state): State<AppState>,
    Extension(identity): Extension<OperatorIdentity>,
    Json(req): Json<EraseRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let operator = DataOperator::new(&state.pool, state.dispatcher.as_ref(), state.config.export_dir.clone());
    let result = operator
        .erase_data(&req.subject_email, req.dry_run, None, Some(identity.0))
        .await?;
    Ok(Json(serde_json::json!(result)))
}

pub async fn rectifiable_fields(
    State(state): State<AppState>,
    Query(q): Query<SubjectEmailQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let operator = DataOperator::new(&state.pool, state.dispatcher.as_ref(), state.config.export_dir.clone());
    Ok(Json(serde_json::json!(operator.get_rectifiable_fields(&q.subject_email).await?)))
}

#[derive(Debug, Deserialize)]
pub struct RectifyRequest {
    pub subject_email: String,
    pub rectifications: HashMap<String, HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub dry_run: bool,
    pub request_id: Option<Uuid>,
}

pub async fn rectify(
    State(state): State<AppState>,
    Extension(identity): Extension<OperatorIdentity>,
    headers: axum::http::HeaderMap,
    Json(req): Json<RectifyRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let operator = DataOperator::new(&state.pool, state.dispatcher.as_ref(), state.config.export_dir.clone());
    let ip = extract_client_ip(&headers);
    let result = operator
        .rectify_data(
            &req.subject_email,
            &req.rectifications,
            Some(identity.0),
            ip,
            req.request_id,
            req.dry_run,
        )
        .await?;
    Ok(Json(serde_json::json!(result)))
}

#[derive(Debug, Deserialize)]
pub struct RectifyEmailRequest {
    pub old_email: String,
    pub new_email: String,
}

pub async fn rectify_email(
    State(state): State<AppState>,
    Extension(identity): Extension<OperatorIdentity>,
    Json(req): Json<RectifyEmailRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let operator = DataOperator::new(&state.pool, state.dispatcher.as_ref(), state.config.export_dir.clone());
    let updated = operator
        .rectify_email(&req.old_email, &req.new_email, Some(identity.0))
        .await?;
    Ok(Json(serde_json::json!({ "tables_updated": updated })))
}
