//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Validation errors
    #[error("Invalid request: {0}")]
    BadRequest(String),

    // Resource errors
    #[error("Resource not found")]
    NotFound,
    #[error("Resource already exists")]
    Conflict(String),

    // Internal errors
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal server error")]
    Internal,

    // GDPR compliance engine
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("delivery failure: {0}")]
    DeliveryFailure(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR", "Database error".to_string()),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", self.to_string()),
            ApiError::PreconditionFailed(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "PRECONDITION_FAILED", msg.clone()),
            ApiError::DeliveryFailure(msg) => (StatusCode::BAD_GATEWAY, "DELIVERY_FAILURE", msg.clone()),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound,
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    // PostgreSQL unique violation
                    if code == "23505" {
                        return ApiError::Conflict("Resource already exists".to_string());
                    }
                }
                ApiError::Database(db_err.to_string())
            }
            _ => ApiError::Database(err.to_string()),
        }
    }
}

impl From<plexmcp_compliance::ComplianceError> for ApiError {
    fn from(err: plexmcp_compliance::ComplianceError) -> Self {
        use plexmcp_compliance::ComplianceError as CE;
        match err {
            CE::InvalidArgument(msg) => ApiError::BadRequest(msg),
            CE::NotFound(msg) => {
                tracing::info!(%msg, "gdpr resource not found");
                ApiError::NotFound
            }
            CE::PreconditionFailed(msg) => ApiError::PreconditionFailed(msg),
            CE::Conflict(msg) => ApiError::Conflict(msg),
            CE::IntegrityFailure(msg) => {
                tracing::error!(%msg, "gdpr integrity failure");
                ApiError::Internal
            }
            CE::DeliveryFailure(msg) => ApiError::DeliveryFailure(msg),
            CE::Internal(msg) => {
                tracing::error!(%msg, "gdpr internal error");
                ApiError::Internal
            }
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
