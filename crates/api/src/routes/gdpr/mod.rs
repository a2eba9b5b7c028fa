//! GDPR compliance engine routes, mounted under `/api/v1/gdpr`.
//!
//! One submodule per compliance component (C3-C10); wiring into axum's
//! `Router` happens in [`router`], which `routes::create_router` nests
//! behind the [`crate::auth::require_operator`] middleware.

pub mod consent;
pub mod data;
pub mod health;
pub mod requests;
pub mod restriction;
pub mod retention;
pub mod webhooks;

use axum::{
    routing::{delete, get, patch, post},
    Router,
};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/summary", get(health::summary))
        // Consent (C3)
        .route("/consent/grant", post(consent::grant))
        .route("/consent/withdraw", post(consent::withdraw))
        .route("/consent/withdraw-all", post(consent::withdraw_all))
        .route("/consent/status", get(consent::status))
        .route("/consent/history", get(consent::history))
        .route("/consent/expiring-soon", get(consent::expiring_soon))
        // Request engine (C7)
        .route("/requests", post(requests::create))
        .route("/requests/pending", get(requests::pending))
        .route("/requests/overdue", get(requests::overdue))
        .route("/requests/:request_id", get(requests::get))
        .route("/requests/:request_id/process", post(requests::process))
        .route("/requests/:request_id/reject", post(requests::reject))
        .route("/requests/:request_id/cancel", post(requests::cancel))
        // Data operator (C4)
        .route("/data/export/preview", get(data::preview_export))
        .route("/data/export", post(data::export))
        .route("/data/erasure/preview", get(data::preview_erasure))
        .route("/data/erasure", post(data::erase))
        .route("/data/rectification/fields", get(data::rectifiable_fields))
        .route("/data/rectification", post(data::rectify))
        .route("/data/rectification/email", post(data::rectify_email))
        // Processing restriction (C5)
        .route("/restriction", post(restriction::request_restriction))
        .route("/restriction/:restriction_id/lift", post(restriction::lift))
        .route("/restriction/active", get(restriction::active))
        .route("/restriction/history", get(restriction::history))
        .route("/restriction/check", get(restriction::check))
        // Retention scheduler (C6)
        .route("/retention/policies", get(retention::list_policies))
        .route("/retention/cleanup", post(retention::run_cleanup))
        .route("/retention/cleanup/preview", get(retention::preview_cleanup))
        // Webhook dispatcher (C8)
        .route("/webhooks/subscriptions", get(webhooks::list_subscriptions))
        .route("/webhooks/subscriptions", post(webhooks::subscribe))
        .route("/webhooks/subscriptions/:subscription_id", patch(webhooks::update_subscription))
        .route("/webhooks/subscriptions/:subscription_id", delete(webhooks::unsubscribe))
        .route("/webhooks/logs", get(webhooks::logs))
}
