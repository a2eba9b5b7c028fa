//! API routes

pub mod gdpr;
pub mod health;

use axum::{extract::DefaultBodyLimit, http::HeaderMap, middleware, routing::get, Router};

use crate::{auth::require_operator, state::AppState};

/// Extract client IP address from request headers.
/// Checks common proxy headers in order of preference.
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("cf-connecting-ip") // Cloudflare
        .or_else(|| headers.get("x-real-ip"))
        .or_else(|| headers.get("x-forwarded-for"))
        .and_then(|h| h.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
}

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring, no auth)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // GDPR routes sit behind the operator shared-secret: everything here
    // acts on a data subject's behalf, never a caller's own data.
    let gdpr_routes = gdpr::router()
        .layer(middleware::from_fn_with_state(state.clone(), require_operator));

    let api_v1_routes = Router::new().nest("/gdpr", gdpr_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024)) // 10MB global limit
        .with_state(state)
}
