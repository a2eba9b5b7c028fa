//! Audit log (C2)
//!
//! Every write goes to both the `gdpr_audit_log` table and a structured
//! `tracing` event, matching the double-logging behavior of the system
//! this was grounded on: a DB row for query/reporting, a log line for
//! real-time observability pipelines.

use serde_json::Value as Json;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ComplianceResult;
use crate::types::AuditAction;

#[derive(Debug, Clone, Default)]
pub struct AuditEntry {
    pub subject_email: Option<String>,
    pub affected_tables: Vec<String>,
    pub affected_records_count: i64,
    pub performed_by: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<Uuid>,
    pub details: Json,
}

pub struct AuditLogger<'a> {
    pool: &'a PgPool,
}

impl<'a> AuditLogger<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn log(&self, action: AuditAction, entry: AuditEntry) -> ComplianceResult<Uuid> {
        let performed_by = entry.performed_by.unwrap_or_else(|| "system".to_string());
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO gdpr_audit_log (
                id, action, subject_email, affected_tables, affected_records_count,
                performed_by, ip_address, user_agent, request_id, details, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(id)
        .bind(action)
        .bind(&entry.subject_email)
        .bind(&entry.affected_tables)
        .bind(entry.affected_records_count)
        .bind(&performed_by)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(entry.request_id)
        .bind(&entry.details)
        .bind(OffsetDateTime::now_utc())
        .execute(self.pool)
        .await?;

        tracing::info!(
            target: "gdpr_audit",
            audit_id = %id,
            action = %action,
            subject_email = ?entry.subject_email,
            affected_tables = ?entry.affected_tables,
            affected_records_count = entry.affected_records_count,
            performed_by = %performed_by,
            request_id = ?entry.request_id,
            "gdpr_audit_event"
        );

        Ok(id)
    }

    pub async fn log_consent_granted(
        &self,
        subject_email: &str,
        consent_type: &str,
        performed_by: Option<String>,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> ComplianceResult<Uuid> {
        self.log(
            AuditAction::ConsentGranted,
            AuditEntry {
                subject_email: Some(subject_email.to_string()),
                affected_tables: vec!["gdpr_consents".to_string()],
                affected_records_count: 1,
                performed_by,
                ip_address,
                user_agent,
                details: serde_json::json!({ "consent_type": consent_type }),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn log_consent_withdrawn(
        &self,
        subject_email: &str,
        consent_type: &str,
        performed_by: Option<String>,
        ip_address: Option<String>,
    ) -> ComplianceResult<Uuid> {
        self.log(
            AuditAction::ConsentWithdrawn,
            AuditEntry {
                subject_email: Some(subject_email.to_string()),
                affected_tables: vec!["gdpr_consents".to_string()],
                affected_records_count: 1,
                performed_by,
                ip_address,
                details: serde_json::json!({ "consent_type": consent_type }),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn log_data_exported(
        &self,
        subject_email: &str,
        tables: Vec<String>,
        total_records: i64,
        file_url: &str,
        performed_by: Option<String>,
        request_id: Option<Uuid>,
    ) -> ComplianceResult<Uuid> {
        self.log(
            AuditAction::DataExported,
            AuditEntry {
                subject_email: Some(subject_email.to_string()),
                affected_tables: tables,
                affected_records_count: total_records,
                performed_by,
                request_id,
                details: serde_json::json!({ "file_url": file_url }),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn log_data_deleted(
        &self,
        subject_email: &str,
        tables: Vec<String>,
        total_records: i64,
        performed_by: Option<String>,
        request_id: Option<Uuid>,
    ) -> ComplianceResult<Uuid> {
        self.log(
            AuditAction::DataDeleted,
            AuditEntry {
                subject_email: Some(subject_email.to_string()),
                affected_tables: tables,
                affected_records_count: total_records,
                performed_by,
                request_id,
                ..Default::default()
            },
        )
        .await
    }

    pub async fn log_data_anonymized(
        &self,
        subject_email: &str,
        tables: Vec<String>,
        total_records: i64,
        performed_by: Option<String>,
        request_id: Option<Uuid>,
    ) -> ComplianceResult<Uuid> {
        self.log(
            AuditAction::DataAnonymized,
            AuditEntry {
                subject_email: Some(subject_email.to_string()),
                affected_tables: tables,
                affected_records_count: total_records,
                performed_by,
                request_id,
                ..Default::default()
            },
        )
        .await
    }

    pub async fn log_request_created(
        &self,
        subject_email: &str,
        request_id: Uuid,
        request_type: &str,
    ) -> ComplianceResult<Uuid> {
        self.log(
            AuditAction::RequestCreated,
            AuditEntry {
                subject_email: Some(subject_email.to_string()),
                affected_tables: vec!["gdpr_requests".to_string()],
                affected_records_count: 1,
                request_id: Some(request_id),
                details: serde_json::json!({ "request_type": request_type }),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn log_request_completed(
        &self,
        subject_email: &str,
        request_id: Uuid,
        performed_by: Option<String>,
    ) -> ComplianceResult<Uuid> {
        self.log(
            AuditAction::RequestCompleted,
            AuditEntry {
                subject_email: Some(subject_email.to_string()),
                affected_tables: vec!["gdpr_requests".to_string()],
                affected_records_count: 1,
                performed_by,
                request_id: Some(request_id),
                ..Default::default()
            },
        )
        .await
    }

    /// Written unconditionally on every rejection, regardless of reason —
    /// a request being turned down is as much a part of the compliance
    /// record as one being fulfilled.
    pub async fn log_request_rejected(
        &self,
        subject_email: &str,
        request_id: Uuid,
        performed_by: Option<String>,
        rejection_reason: &str,
    ) -> ComplianceResult<Uuid> {
        self.log(
            AuditAction::RequestRejected,
            AuditEntry {
                subject_email: Some(subject_email.to_string()),
                affected_tables: vec!["gdpr_requests".to_string()],
                affected_records_count: 1,
                performed_by,
                request_id: Some(request_id),
                details: serde_json::json!({ "rejection_reason": rejection_reason }),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn log_retention_cleanup(
        &self,
        table: &str,
        action: &str,
        rows_affected: i64,
    ) -> ComplianceResult<Uuid> {
        self.log(
            AuditAction::RetentionCleanup,
            AuditEntry {
                affected_tables: vec![table.to_string()],
                affected_records_count: rows_affected,
                performed_by: Some("system".to_string()),
                details: serde_json::json!({ "action": action }),
                ..Default::default()
            },
        )
        .await
    }
}
