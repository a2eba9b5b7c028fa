//! Request engine (C7)
//!
//! The state machine orchestrating C3–C5 behind a single Article 15–20
//! entry point: `PENDING -> IN_PROGRESS -> COMPLETED/REJECTED/CANCELLED`,
//! with `IN_PROGRESS` reverting to `PENDING` on a processing failure so a
//! retry is always possible rather than leaving the request stuck.

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::audit::AuditLogger;
use crate::data_operator::DataOperator;
use crate::error::{ComplianceError, ComplianceResult};
use crate::types::{RequestStatus, RequestType, WebhookEvent};
use crate::webhooks::EventPublisher;

/// Statutory window between `create` and the legal deadline. Immutable
/// once set — nothing in this module ever writes to `deadline_at` again.
pub const REQUEST_DEADLINE_DAYS: i64 = 30;

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct GdprRequest {
    pub id: Uuid,
    pub subject_email: String,
    pub request_type: RequestType,
    pub status: RequestStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub deadline_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    pub processed_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub result_file_url: Option<String>,
    pub result_file_size: Option<i64>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl GdprRequest {
    /// `status ∈ {PENDING, IN_PROGRESS} ∧ deadline_at < now`.
    pub fn is_overdue(&self) -> bool {
        matches!(self.status, RequestStatus::Pending | RequestStatus::InProgress)
            && self.deadline_at < OffsetDateTime::now_utc()
    }

    /// `max(0, floor((deadline_at - now).days))`.
    pub fn days_remaining(&self) -> i64 {
        (self.deadline_at - OffsetDateTime::now_utc()).whole_days().max(0)
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            RequestStatus::Completed | RequestStatus::Rejected | RequestStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ProcessOutcome {
    pub request_id: Uuid,
    pub status: RequestStatus,
    pub result: serde_json::Value,
}

pub struct RequestEngine<'a> {
    pool: &'a PgPool,
    publisher: &'a dyn EventPublisher,
    export_dir: std::path::PathBuf,
}

impl<'a> RequestEngine<'a> {
    pub fn new(
        pool: &'a PgPool,
        publisher: &'a dyn EventPublisher,
        export_dir: impl Into<std::path::PathBuf>,
    ) -> Self {
        Self { pool, publisher, export_dir: export_dir.into() }
    }

    /// Refuses if a non-terminal request of the same `(email, type)`
    /// already exists.
    pub async fn create(
        &self,
        email: &str,
        request_type: RequestType,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> ComplianceResult<GdprRequest> {
        let email = email.to_lowercase();

        let existing: Option<GdprRequest> = sqlx::query_as(
            r#"
            SELECT * FROM gdpr_requests
            WHERE subject_email = $1 AND request_type = $2
              AND status IN ('pending', 'in_progress')
            "#,
        )
        .bind(&email)
        .bind(request_type)
        .fetch_optional(self.pool)
        .await?;

        if let Some(existing) = existing {
            return Err(ComplianceError::Conflict(format!(
                "a non-terminal {request_type} request already exists: {}",
                existing.id
            )));
        }

        let deadline_at = OffsetDateTime::now_utc() + time::Duration::days(REQUEST_DEADLINE_DAYS);

        let request = sqlx::query_as::<_, GdprRequest>(
            r#"
            INSERT INTO gdpr_requests (
                id, subject_email, request_type, status, created_at,
                deadline_at, ip_address, user_agent
            )
            VALUES ($1, $2, $3, 'pending', NOW(), $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&email)
        .bind(request_type)
        .bind(deadline_at)
        .bind(&ip_address)
        .bind(&user_agent)
        .fetch_one(self.pool)
        .await?;

        AuditLogger::new(self.pool)
            .log_request_created(&email, request.id, &request_type.to_string())
            .await?;

        self.publisher
            .publish(
                WebhookEvent::RequestCreated,
                serde_json::json!({
                    "request_id": request.id,
                    "subject_email": email,
                    "request_type": request_type,
                    "deadline_at": request.deadline_at,
                }),
            )
            .await;

        Ok(request)
    }

    pub async fn get(&self, request_id: Uuid) -> ComplianceResult<GdprRequest> {
        sqlx::query_as::<_, GdprRequest>("SELECT * FROM gdpr_requests WHERE id = $1")
            .bind(request_id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| ComplianceError::NotFound(format!("request {request_id} not found")))
    }

    /// Only legal from PENDING/IN_PROGRESS. Flips to IN_PROGRESS, routes by
    /// request type, and on success marks COMPLETED; on failure reverts to
    /// PENDING so the request can be retried rather than getting stuck.
    /// `DataRectification`/`ProcessingRestriction` remain IN_PROGRESS
    /// indefinitely — they are closed by their own dedicated endpoints, not
    /// by this method, matching the source's `manual_processing_required`
    /// fallthrough.
    pub async fn process(
        &self,
        request_id: Uuid,
        performed_by: Option<String>,
    ) -> ComplianceResult<ProcessOutcome> {
        let mut request = self.get(request_id).await?;

        if !matches!(request.status, RequestStatus::Pending | RequestStatus::InProgress) {
            return Err(ComplianceError::PreconditionFailed(format!(
                "request already processed: {}",
                request.status
            )));
        }

        sqlx::query(
            "UPDATE gdpr_requests SET status = 'in_progress', processed_by = $2 WHERE id = $1",
        )
        .bind(request_id)
        .bind(&performed_by)
        .execute(self.pool)
        .await?;
        request.status = RequestStatus::InProgress;
        request.processed_by = performed_by.clone();

        self.publisher
            .publish(
                WebhookEvent::RequestProcessing,
                serde_json::json!({ "request_id": request_id, "subject_email": request.subject_email }),
            )
            .await;

        let operator = DataOperator::new(self.pool, self.publisher, self.export_dir.clone());

        let outcome = match request.request_type {
            RequestType::DataExport | RequestType::DataAccess | RequestType::DataPortability => {
                operator
                    .export_data(&request.subject_email, "json", Some(request_id), request.processed_by.clone())
                    .await
                    .map(|r| {
                        serde_json::json!({
                            "file_path": r.file_path,
                            "file_size": r.file_size,
                            "total_records": r.total_records,
                            "tables_exported": r.tables_exported,
                        })
                    })
            }
            RequestType::DataErasure => operator
                .erase_data(&request.subject_email, false, Some(request_id), request.processed_by.clone())
                .await
                .map(|r| {
                    serde_json::json!({
                        "tables_affected": r.tables_affected,
                        "total_records": r.total_records,
                    })
                }),
            RequestType::DataRectification | RequestType::ProcessingRestriction => {
                Ok(serde_json::json!({ "status": "manual_processing_required" }))
            }
        };

        match outcome {
            Ok(result) => {
                let manual = request.request_type == RequestType::DataRectification
                    || request.request_type == RequestType::ProcessingRestriction;

                if manual {
                    return Ok(ProcessOutcome { request_id, status: RequestStatus::InProgress, result });
                }

                let file_url = result.get("file_path").and_then(|v| v.as_str());
                let file_size = result.get("file_size").and_then(|v| v.as_i64());

                sqlx::query(
                    r#"
                    UPDATE gdpr_requests
                    SET status = 'completed', completed_at = NOW(),
                        result_file_url = COALESCE($2, result_file_url),
                        result_file_size = COALESCE($3, result_file_size)
                    WHERE id = $1
                    "#,
                )
                .bind(request_id)
                .bind(file_url)
                .bind(file_size)
                .execute(self.pool)
                .await?;

                AuditLogger::new(self.pool)
                    .log_request_completed(&request.subject_email, request_id, request.processed_by.clone())
                    .await?;

                self.publisher
                    .publish(
                        WebhookEvent::RequestCompleted,
                        serde_json::json!({ "request_id": request_id, "subject_email": request.subject_email, "result": result }),
                    )
                    .await;

                Ok(ProcessOutcome { request_id, status: RequestStatus::Completed, result })
            }
            Err(e) => {
                sqlx::query("UPDATE gdpr_requests SET status = 'pending', processed_by = NULL WHERE id = $1")
                    .bind(request_id)
                    .execute(self.pool)
                    .await?;

                tracing::error!(request_id = %request_id, error = %e, "gdpr_request_processing_error");

                Ok(ProcessOutcome {
                    request_id,
                    status: RequestStatus::Pending,
                    result: serde_json::json!({ "error": e.to_string() }),
                })
            }
        }
    }

    /// Only legal from PENDING/IN_PROGRESS. Writes `REQUEST_REJECTED`
    /// unconditionally, regardless of `reason`.
    pub async fn reject(
        &self,
        request_id: Uuid,
        reason: &str,
        performed_by: Option<String>,
    ) -> ComplianceResult<GdprRequest> {
        let request = self.get(request_id).await?;
        if request.is_terminal() {
            return Err(ComplianceError::PreconditionFailed(format!(
                "request already terminal: {}",
                request.status
            )));
        }

        let request = sqlx::query_as::<_, GdprRequest>(
            r#"
            UPDATE gdpr_requests
            SET status = 'rejected', rejection_reason = $2, processed_by = $3, completed_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(request_id)
        .bind(reason)
        .bind(&performed_by)
        .fetch_one(self.pool)
        .await?;

        AuditLogger::new(self.pool)
            .log_request_rejected(&request.subject_email, request_id, performed_by, reason)
            .await?;

        self.publisher
            .publish(
                WebhookEvent::RequestRejected,
                serde_json::json!({ "request_id": request_id, "subject_email": request.subject_email, "reason": reason }),
            )
            .await;

        Ok(request)
    }

    /// `cancel()`: only legal while non-terminal; the subject (or an admin
    /// acting on their behalf) withdraws the request before it completes.
    pub async fn cancel(&self, request_id: Uuid) -> ComplianceResult<GdprRequest> {
        let request = self.get(request_id).await?;
        if request.is_terminal() {
            return Err(ComplianceError::PreconditionFailed(format!(
                "request already terminal: {}",
                request.status
            )));
        }

        sqlx::query_as::<_, GdprRequest>(
            "UPDATE gdpr_requests SET status = 'cancelled', completed_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(request_id)
        .fetch_one(self.pool)
        .await
        .map_err(ComplianceError::from)
    }

    /// Non-terminal requests ordered by deadline, ascending.
    pub async fn pending(&self) -> ComplianceResult<Vec<GdprRequest>> {
        let rows = sqlx::query_as::<_, GdprRequest>(
            r#"
            SELECT * FROM gdpr_requests
            WHERE status IN ('pending', 'in_progress')
            ORDER BY deadline_at ASC
            "#,
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Non-terminal requests with `deadline_at < now`, ordered by deadline.
    pub async fn overdue(&self) -> ComplianceResult<Vec<GdprRequest>> {
        let rows = sqlx::query_as::<_, GdprRequest>(
            r#"
            SELECT * FROM gdpr_requests
            WHERE status IN ('pending', 'in_progress') AND deadline_at < NOW()
            ORDER BY deadline_at ASC
            "#,
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;

    fn sample(status: RequestStatus, deadline_at: OffsetDateTime) -> GdprRequest {
        GdprRequest {
            id: Uuid::new_v4(),
            subject_email: "a@example.com".into(),
            request_type: RequestType::DataExport,
            status,
            created_at: OffsetDateTime::now_utc(),
            deadline_at,
            completed_at: None,
            processed_by: None,
            rejection_reason: None,
            result_file_url: None,
            result_file_size: None,
            ip_address: None,
            user_agent: None,
        }
    }

    #[test]
    fn is_overdue_requires_non_terminal_and_past_deadline() {
        let past = OffsetDateTime::now_utc() - time::Duration::days(1);
        let future = OffsetDateTime::now_utc() + time::Duration::days(1);

        assert!(sample(RequestStatus::Pending, past).is_overdue());
        assert!(sample(RequestStatus::InProgress, past).is_overdue());
        assert!(!sample(RequestStatus::Pending, future).is_overdue());
        assert!(!sample(RequestStatus::Completed, past).is_overdue());
        assert!(!sample(RequestStatus::Rejected, past).is_overdue());
    }

    #[test]
    fn days_remaining_floors_and_never_goes_negative() {
        let thirty_days = OffsetDateTime::now_utc() + time::Duration::days(30);
        assert_eq!(sample(RequestStatus::Pending, thirty_days).days_remaining(), 29);

        let past = OffsetDateTime::now_utc() - time::Duration::days(5);
        assert_eq!(sample(RequestStatus::Pending, past).days_remaining(), 0);
    }

    #[test]
    fn terminal_statuses_are_recognized() {
        let future = OffsetDateTime::now_utc() + time::Duration::days(1);
        assert!(sample(RequestStatus::Completed, future).is_terminal());
        assert!(sample(RequestStatus::Rejected, future).is_terminal());
        assert!(sample(RequestStatus::Cancelled, future).is_terminal());
        assert!(!sample(RequestStatus::Pending, future).is_terminal());
        assert!(!sample(RequestStatus::InProgress, future).is_terminal());
    }
}
