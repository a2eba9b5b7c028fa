//! Shared-secret operator authentication.
//!
//! The compliance engine trusts whatever `performed_by` its caller passes in
//! and records it verbatim in the audit log — authenticating that caller is
//! this transport's job, not the engine's. Every GDPR route sits behind a
//! single shared bearer secret (`AUTH_SHARED_SECRET`); the caller additionally
//! names itself via an `X-Operator` header, which becomes `performed_by`.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::state::AppState;

/// Identity of the caller, threaded through request extensions by
/// [`require_operator`]. Route handlers pull this out instead of trusting a
/// raw header directly.
#[derive(Debug, Clone)]
pub struct OperatorIdentity(pub String);

impl OperatorIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing Authorization header")]
    Missing,
    #[error("invalid credentials")]
    Invalid,
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Axum middleware gating every `/api/v1/gdpr/*` route behind
/// `Authorization: Bearer <AUTH_SHARED_SECRET>`.
pub async fn require_operator(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = header_value else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    if !constant_time_eq(token, &state.config.auth_shared_secret) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let operator = request
        .headers()
        .get("x-operator")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("system")
        .to_string();

    request
        .extensions_mut()
        .insert(OperatorIdentity(operator));

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_identical_strings() {
        assert!(constant_time_eq("abc123", "abc123"));
    }

    #[test]
    fn constant_time_eq_rejects_mismatch() {
        assert!(!constant_time_eq("abc123", "abc124"));
        assert!(!constant_time_eq("abc123", "abc1234"));
    }
}
