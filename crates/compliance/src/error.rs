//! Error kinds for the compliance engine
//!
//! Mirrors the seven error kinds named in the compliance spec: callers at
//! the HTTP boundary map each variant to a stable status code independent
//! of this crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComplianceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("integrity failure: {0}")]
    IntegrityFailure(String),

    #[error("delivery failure: {0}")]
    DeliveryFailure(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for ComplianceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ComplianceError::NotFound("row not found".into()),
            sqlx::Error::Database(db_err) => {
                if db_err.code().as_deref() == Some("23505") {
                    ComplianceError::Conflict(db_err.to_string())
                } else {
                    ComplianceError::Internal(db_err.to_string())
                }
            }
            other => ComplianceError::Internal(other.to_string()),
        }
    }
}

pub type ComplianceResult<T> = Result<T, ComplianceError>;
