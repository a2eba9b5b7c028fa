//! Consent routes (C3)

use axum::{
    extract::{Query, State},
    Json,
};
use plexmcp_compliance::consent::ConsentManager;
use plexmcp_compliance::types::ConsentType;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::routes::extract_client_ip;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GrantConsentRequest {
    pub subject_email: String,
    pub consent_type: ConsentType,
    pub expires_in_days: Option<i64>,
    pub consent_version: Option<String>,
    pub consent_text: Option<String>,
}

pub async fn grant(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(req): Json<GrantConsentRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let manager = ConsentManager::new(&state.pool, state.dispatcher.as_ref());
    let ip = extract_client_ip(&headers);
    let consent = manager
        .grant_consent(
            &req.subject_email,
            req.consent_type,
            req.expires_in_days,
            ip,
            None,
            req.consent_version,
            req.consent_text,
        )
        .await?;
    Ok(Json(serde_json::json!(consent)))
}

#[derive(Debug, Deserialize)]
pub struct WithdrawConsentRequest {
    pub subject_email: String,
    pub consent_type: ConsentType,
}

pub async fn withdraw(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(req): Json<WithdrawConsentRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let manager = ConsentManager::new(&state.pool, state.dispatcher.as_ref());
    let ip = extract_client_ip(&headers);
    let consent = manager
        .withdraw_consent(&req.subject_email, req.consent_type, ip)
        .await?;
    Ok(Json(serde_json::json!(consent)))
}

#[derive(Debug, Deserialize)]
pub struct WithdrawAllRequest {
    pub subject_email: String,
}

pub async fn withdraw_all(
    State(state): State<AppState>,
    Json(req): Json<WithdrawAllRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let manager = ConsentManager::new(&state.pool, state.dispatcher.as_ref());
    let count = manager.withdraw_all(&req.subject_email).await?;
    Ok(Json(serde_json::json!({ "withdrawn_count": count })))
}

#[derive(Debug, Deserialize)]
pub struct SubjectEmailQuery {
    pub subject_email: String,
}

pub async fn status(
    State(state): State<AppState>,
    Query(q): Query<SubjectEmailQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let manager = ConsentManager::new(&state.pool, state.dispatcher.as_ref());
    let status = manager.status(&q.subject_email).await?;
    Ok(Json(serde_json::json!(status)))
}

pub async fn history(
    State(state): State<AppState>,
    Query(q): Query<SubjectEmailQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let manager = ConsentManager::new(&state.pool, state.dispatcher.as_ref());
    let consents = manager.get_current_consents(&q.subject_email).await?;
    Ok(Json(serde_json::json!(consents)))
}

#[derive(Debug, Deserialize)]
pub struct ExpiringSoonQuery {
    #[serde(default = "default_days_before")]
    pub days_before: i64,
}

fn default_days_before() -> i64 {
    30
}

pub async fn expiring_soon(
    State(state): State<AppState>,
    Query(q): Query<ExpiringSoonQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let manager = ConsentManager::new(&state.pool, state.dispatcher.as_ref());
    let consents = manager.expiring_soon(q.days_before).await?;
    Ok(Json(serde_json::json!(consents)))
}
