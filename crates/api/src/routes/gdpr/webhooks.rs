//! Webhook subscription and delivery-log routes (C8)

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub name: String,
    pub url: String,
    pub secret: String,
    pub events: Vec<String>,
    pub headers: Option<serde_json::Value>,
    #[serde(default = "default_retry_count")]
    pub retry_count: i32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: i32,
}

fn default_retry_count() -> i32 {
    3
}

fn default_timeout_seconds() -> i32 {
    10
}

pub async fn subscribe(
    State(state): State<AppState>,
    Json(req): Json<SubscribeRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let subscription = state
        .dispatcher
        .subscribe(
            &req.name,
            &req.url,
            &req.secret,
            req.events,
            req.headers,
            req.retry_count,
            req.timeout_seconds,
        )
        .await?;
    Ok(Json(serde_json::json!(subscription)))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.dispatcher.unsubscribe(subscription_id).await?;
    Ok(Json(serde_json::json!({ "unsubscribed": subscription_id })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSubscriptionBody {
    pub is_active: Option<bool>,
    pub events: Option<Vec<String>>,
    pub url: Option<String>,
}

pub async fn update_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
    Json(body): Json<UpdateSubscriptionBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let subscription = state
        .dispatcher
        .update_subscription(subscription_id, body.is_active, body.events, body.url)
        .await?;
    Ok(Json(serde_json::json!(subscription)))
}

pub async fn list_subscriptions(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    Ok(Json(serde_json::json!(state.dispatcher.list_subscriptions().await?)))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub subscription_id: Option<Uuid>,
    pub event_type: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn logs(
    State(state): State<AppState>,
    Query(q): Query<LogsQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let rows = state
        .dispatcher
        .get_delivery_logs(q.subscription_id, q.event_type.as_deref(), q.limit)
        .await?;
    Ok(Json(serde_json::json!(rows)))
}
