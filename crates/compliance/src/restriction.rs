//! Processing restriction manager (C5)

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditLogger};
use crate::error::{ComplianceError, ComplianceResult};
use crate::types::{AuditAction, RestrictionReason, WebhookEvent, PERSONAL_DATA_TABLES, RESTRICTABLE_OPERATIONS};
use crate::webhooks::EventPublisher;

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct Restriction {
    pub id: Uuid,
    pub subject_email: String,
    pub reason: RestrictionReason,
    pub reason_details: Option<String>,
    pub is_active: bool,
    pub restricted_operations: Vec<String>,
    pub restricted_tables: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub requested_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub lifted_at: Option<OffsetDateTime>,
    pub lifted_by: Option<String>,
    pub lift_reason: Option<String>,
    pub request_id: Option<Uuid>,
}

impl Restriction {
    pub fn is_currently_active(&self) -> bool {
        self.is_active
            && self.expires_at.map_or(true, |exp| exp >= OffsetDateTime::now_utc())
    }
}

pub struct RestrictionManager<'a> {
    pool: &'a PgPool,
    publisher: &'a dyn EventPublisher,
}

impl<'a> RestrictionManager<'a> {
    pub fn new(pool: &'a PgPool, publisher: &'a dyn EventPublisher) -> Self {
        Self { pool, publisher }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn request_restriction(
        &self,
        subject_email: &str,
        reason: RestrictionReason,
        reason_details: Option<String>,
        restricted_operations: Option<Vec<String>>,
        restricted_tables: Option<Vec<String>>,
        expires_in_days: Option<i64>,
        ip_address: Option<String>,
        user_agent: Option<String>,
        request_id: Option<Uuid>,
    ) -> ComplianceResult<Restriction> {
        let email = subject_email.to_lowercase();

        let operations = restricted_operations.unwrap_or_else(|| vec!["all".to_string()]);
        for op in &operations {
            if op != "all" && !RESTRICTABLE_OPERATIONS.contains(&op.as_str()) {
                return Err(ComplianceError::InvalidArgument(format!(
                    "unrecognized restricted operation: {op}"
                )));
            }
        }

        let tables = restricted_tables.unwrap_or_else(|| vec!["all".to_string()]);
        for t in &tables {
            if t != "all" && !PERSONAL_DATA_TABLES.contains(&t.as_str()) {
                return Err(ComplianceError::InvalidArgument(format!(
                    "unrecognized restricted table: {t}"
                )));
            }
        }

        if let Some(existing) = self.active_restriction_for(&email).await? {
            return Err(ComplianceError::Conflict(format!(
                "active restriction already exists: {}",
                existing.id
            )));
        }

        let expires_at = expires_in_days.map(|d| OffsetDateTime::now_utc() + time::Duration::days(d));

        let restriction = sqlx::query_as::<_, Restriction>(
            r#"
            INSERT INTO gdpr_processing_restrictions (
                id, subject_email, reason, reason_details, is_active,
                restricted_operations, restricted_tables, requested_at, expires_at,
                ip_address, user_agent, request_id
            )
            VALUES ($1, $2, $3, $4, true, $5, $6, NOW(), $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&email)
        .bind(reason)
        .bind(&reason_details)
        .bind(&operations)
        .bind(&tables)
        .bind(expires_at)
        .bind(&ip_address)
        .bind(&user_agent)
        .bind(request_id)
        .fetch_one(self.pool)
        .await?;

        let audited_tables = if tables.len() == 1 && tables[0] == "all" {
            PERSONAL_DATA_TABLES.iter().map(|s| s.to_string()).collect()
        } else {
            tables.clone()
        };

        AuditLogger::new(self.pool)
            .log(
                AuditAction::PolicyUpdated,
                AuditEntry {
                    subject_email: Some(email),
                    affected_tables: audited_tables,
                    affected_records_count: 1,
                    ip_address,
                    user_agent,
                    request_id,
                    details: serde_json::json!({ "operation": "processing_restriction_requested" }),
                    ..Default::default()
                },
            )
            .await?;

        self.publisher
            .publish(
                WebhookEvent::DataRestricted,
                serde_json::json!({
                    "subject_email": restriction.subject_email,
                    "reason": restriction.reason,
                    "restricted_operations": restriction.restricted_operations,
                    "restricted_tables": restriction.restricted_tables,
                }),
            )
            .await;

        Ok(restriction)
    }

    pub async fn lift_restriction(
        &self,
        restriction_id: Uuid,
        lifted_by: &str,
        lift_reason: &str,
    ) -> ComplianceResult<Restriction> {
        let existing = sqlx::query_as::<_, Restriction>(
            "SELECT * FROM gdpr_processing_restrictions WHERE id = $1",
        )
        .bind(restriction_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| ComplianceError::NotFound(format!("restriction {restriction_id} not found")))?;

        if !existing.is_active {
            return Err(ComplianceError::PreconditionFailed(
                "restriction is already inactive".to_string(),
            ));
        }

        let restriction = sqlx::query_as::<_, Restriction>(
            r#"
            UPDATE gdpr_processing_restrictions
            SET is_active = false, lifted_at = NOW(), lifted_by = $2, lift_reason = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(restriction_id)
        .bind(lifted_by)
        .bind(lift_reason)
        .fetch_one(self.pool)
        .await?;

        AuditLogger::new(self.pool)
            .log(
                AuditAction::PolicyUpdated,
                AuditEntry {
                    subject_email: Some(restriction.subject_email.clone()),
                    affected_tables: restriction.restricted_tables.clone(),
                    affected_records_count: 1,
                    performed_by: Some(lifted_by.to_string()),
                    details: serde_json::json!({ "operation": "processing_restriction_lifted" }),
                    ..Default::default()
                },
            )
            .await?;

        Ok(restriction)
    }

    async fn active_restriction_for(&self, email: &str) -> ComplianceResult<Option<Restriction>> {
        let candidates: Vec<Restriction> = sqlx::query_as(
            "SELECT * FROM gdpr_processing_restrictions WHERE subject_email = $1 AND is_active = true",
        )
        .bind(email)
        .fetch_all(self.pool)
        .await?;
        Ok(candidates.into_iter().find(|r| r.is_currently_active()))
    }

    /// `check_restriction`: is `operation`/`table` blocked for `email`?
    /// Defaults `operation`/`table` to "matches everything" when omitted,
    /// matching the original's `is_restricted` AND-of-dimensions semantics.
    pub async fn check_restriction(
        &self,
        email: &str,
        operation: Option<&str>,
        table: Option<&str>,
    ) -> ComplianceResult<bool> {
        let email = email.to_lowercase();
        let restriction = match self.active_restriction_for(&email).await? {
            Some(r) => r,
            None => return Ok(false),
        };

        let op_restricted = operation.map_or(true, |op| {
            restriction.restricted_operations.iter().any(|r| r == "all" || r == op)
        });
        let table_restricted = table.map_or(true, |t| {
            restriction.restricted_tables.iter().any(|r| r == "all" || r == t)
        });

        Ok(op_restricted && table_restricted)
    }

    /// The literal `is_processing_allowed` predicate: the inverse of
    /// `check_restriction`. Callers in the data operator consult this
    /// before any mutating operation except erasure driven by a
    /// `DataErasure` request (spec-level carve-out; the original source
    /// has no equivalent check there).
    pub async fn is_processing_allowed(
        &self,
        email: &str,
        operation: &str,
        table: &str,
    ) -> ComplianceResult<bool> {
        Ok(!self.check_restriction(email, Some(operation), Some(table)).await?)
    }

    pub async fn get_active_restrictions(&self, email: Option<&str>) -> ComplianceResult<Vec<Restriction>> {
        let rows: Vec<Restriction> = match email {
            Some(email) => {
                sqlx::query_as(
                    "SELECT * FROM gdpr_processing_restrictions WHERE subject_email = $1 AND is_active = true",
                )
                .bind(email.to_lowercase())
                .fetch_all(self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM gdpr_processing_restrictions WHERE is_active = true")
                    .fetch_all(self.pool)
                    .await?
            }
        };
        Ok(rows.into_iter().filter(|r| r.is_currently_active()).collect())
    }

    pub async fn get_restriction_history(&self, email: &str, limit: i64) -> ComplianceResult<Vec<Restriction>> {
        let rows = sqlx::query_as::<_, Restriction>(
            r#"
            SELECT * FROM gdpr_processing_restrictions
            WHERE subject_email = $1
            ORDER BY requested_at DESC
            LIMIT $2
            "#,
        )
        .bind(email.to_lowercase())
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Sweeps restrictions past their `expires_at`, lifting each with
    /// `lifted_by = "system"` and auditing individually, matching the
    /// original's `expire_old_restrictions`.
    pub async fn expire_old_restrictions(&self) -> ComplianceResult<i64> {
        let expired: Vec<Restriction> = sqlx::query_as(
            r#"
            UPDATE gdpr_processing_restrictions
            SET is_active = false, lifted_at = NOW(), lifted_by = 'system',
                lift_reason = 'Automatic expiration'
            WHERE is_active = true AND expires_at IS NOT NULL AND expires_at < NOW()
            RETURNING *
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        let count = expired.len() as i64;
        let audit = AuditLogger::new(self.pool);
        for r in expired {
            audit
                .log(
                    AuditAction::PolicyUpdated,
                    AuditEntry {
                        subject_email: Some(r.subject_email),
                        affected_tables: r.restricted_tables,
                        affected_records_count: 1,
                        performed_by: Some("system".to_string()),
                        details: serde_json::json!({ "operation": "processing_restriction_expired" }),
                        ..Default::default()
                    },
                )
                .await?;
        }
        Ok(count)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;

    fn sample(is_active: bool, expires_at: Option<OffsetDateTime>) -> Restriction {
        Restriction {
            id: Uuid::new_v4(),
            subject_email: "a@example.com".into(),
            reason: RestrictionReason::AccuracyContested,
            reason_details: None,
            is_active,
            restricted_operations: vec!["all".into()],
            restricted_tables: vec!["all".into()],
            requested_at: OffsetDateTime::now_utc(),
            expires_at,
            lifted_at: None,
            lifted_by: None,
            lift_reason: None,
            request_id: None,
        }
    }

    #[test]
    fn currently_active_requires_is_active_and_not_expired() {
        assert!(sample(true, None).is_currently_active());
        assert!(!sample(false, None).is_currently_active());
        let past = OffsetDateTime::now_utc() - time::Duration::days(1);
        assert!(!sample(true, Some(past)).is_currently_active());
        let future = OffsetDateTime::now_utc() + time::Duration::days(1);
        assert!(sample(true, Some(future)).is_currently_active());
    }
}
