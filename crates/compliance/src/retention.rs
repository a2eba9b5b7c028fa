//! Retention manager (C6)
//!
//! Policy rows name a table and an age threshold; `run_cleanup` sweeps
//! every active policy. Table/column identifiers are never taken from a
//! policy row without being checked against the schema map first — they
//! are config values set by an administrator, not request input, but the
//! dynamic-SQL design note still applies: only whitelisted identifiers are
//! ever interpolated into a query string, and only after being validated
//! against the compile-time schema map.

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::audit::AuditLogger;
use crate::error::{ComplianceError, ComplianceResult};
use crate::schema_map::schema_map;
use crate::types::{RetentionAction, WebhookEvent};
use crate::webhooks::EventPublisher;

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct RetentionPolicy {
    pub id: Uuid,
    pub table_name: String,
    pub retention_days: i32,
    pub action: RetentionAction,
    pub condition_column: Option<String>,
    pub condition_value: Option<String>,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_run_at: Option<OffsetDateTime>,
    pub last_run_count: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CleanupOutcome {
    pub table_name: String,
    pub action: RetentionAction,
    pub rows_affected: i64,
}

pub struct RetentionManager<'a> {
    pool: &'a PgPool,
    publisher: &'a dyn EventPublisher,
}

impl<'a> RetentionManager<'a> {
    pub fn new(pool: &'a PgPool, publisher: &'a dyn EventPublisher) -> Self {
        Self { pool, publisher }
    }

    pub async fn list_policies(&self) -> ComplianceResult<Vec<RetentionPolicy>> {
        let rows = sqlx::query_as::<_, RetentionPolicy>(
            "SELECT * FROM data_retention_policies WHERE is_active = true ORDER BY table_name",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn count_policies(&self) -> ComplianceResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM data_retention_policies WHERE is_active = true",
        )
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }

    /// Runs every active policy. `dry_run = true` returns the row counts
    /// that *would* be affected without mutating anything.
    pub async fn run_cleanup(&self, dry_run: bool) -> ComplianceResult<Vec<CleanupOutcome>> {
        let policies = self.list_policies().await?;
        let mut outcomes = Vec::with_capacity(policies.len());

        for policy in policies {
            let outcome = self.apply_policy(&policy, dry_run).await?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn apply_policy(&self, policy: &RetentionPolicy, dry_run: bool) -> ComplianceResult<CleanupOutcome> {
        validate_identifier(&policy.table_name)?;
        if !schema_map().contains_key(policy.table_name.as_str()) {
            return Err(ComplianceError::InvalidArgument(format!(
                "retention policy names an unknown table: {}",
                policy.table_name
            )));
        }
        if let Some(col) = &policy.condition_column {
            validate_identifier(col)?;
        }
        if policy.retention_days < 0 {
            return Err(ComplianceError::InvalidArgument(
                "retention_days must not be negative".to_string(),
            ));
        }

        let mut where_clause = format!(
            "created_at < NOW() - INTERVAL '{} days'",
            policy.retention_days
        );
        let condition_value = policy.condition_value.as_deref();
        if let (Some(col), Some(_)) = (&policy.condition_column, condition_value) {
            where_clause.push_str(&format!(" AND \"{col}\" = $1"));
        }

        let rows_affected = if dry_run {
            let sql = format!(
                "SELECT COUNT(*) FROM \"{}\" WHERE {where_clause}",
                policy.table_name
            );
            let mut query = sqlx::query_scalar::<_, i64>(&sql);
            if let Some(val) = condition_value {
                query = query.bind(val);
            }
            query.fetch_one(self.pool).await?
        } else {
            let affected = match policy.action {
                RetentionAction::Delete => {
                    let sql = format!("DELETE FROM \"{}\" WHERE {where_clause}", policy.table_name);
                    let mut query = sqlx::query(&sql);
                    if let Some(val) = condition_value {
                        query = query.bind(val);
                    }
                    query.execute(self.pool).await?.rows_affected() as i64
                }
                RetentionAction::Anonymize => {
                    let sql = self.anonymize_sql(&policy.table_name, &where_clause)?;
                    let mut query = sqlx::query(&sql);
                    if let Some(val) = condition_value {
                        query = query.bind(val);
                    }
                    query.execute(self.pool).await?.rows_affected() as i64
                }
                RetentionAction::Archive => {
                    self.archive_rows(&policy.table_name, &where_clause, condition_value).await?
                }
            };

            sqlx::query(
                "UPDATE data_retention_policies SET last_run_at = NOW(), last_run_count = $2 WHERE id = $1",
            )
            .bind(policy.id)
            .bind(affected)
            .execute(self.pool)
            .await?;

            if affected > 0 {
                AuditLogger::new(self.pool)
                    .log_retention_cleanup(&policy.table_name, &policy.action.to_string(), affected)
                    .await?;
                self.publisher
                    .publish(
                        WebhookEvent::ComplianceRetentionCleanup,
                        serde_json::json!({
                            "table": policy.table_name,
                            "action": policy.action,
                            "rows_affected": affected,
                        }),
                    )
                    .await;
            }

            affected
        };

        Ok(CleanupOutcome {
            table_name: policy.table_name.clone(),
            action: policy.action,
            rows_affected,
        })
    }

    fn anonymize_sql(&self, table: &str, where_clause: &str) -> ComplianceResult<String> {
        let descriptor = schema_map().get(table).ok_or_else(|| {
            ComplianceError::InvalidArgument(format!("no schema descriptor for table {table}"))
        })?;
        if descriptor.anonymize_fields.is_empty() {
            return Err(ComplianceError::InvalidArgument(format!(
                "table {table} has no anonymize_fields configured"
            )));
        }
        let assignments: Vec<String> = descriptor
            .anonymize_fields
            .iter()
            .map(|f| match f.value {
                Some(v) => format!("\"{}\" = '{}'", f.column, v.replace('\'', "''")),
                None => format!("\"{}\" = NULL", f.column),
            })
            .collect();
        Ok(format!(
            "UPDATE \"{table}\" SET {} WHERE {where_clause}",
            assignments.join(", ")
        ))
    }

    /// Ensures `"<table>_archive"` exists (created empty from the source's
    /// own column set on first run), copies matching rows into it with an
    /// `archived_at` stamp, then deletes them from the source. Both
    /// statements run inside one transaction so a copy is never left
    /// without its matching delete.
    async fn archive_rows(
        &self,
        table: &str,
        where_clause: &str,
        condition_value: Option<&str>,
    ) -> ComplianceResult<i64> {
        let archive_table = format!("{table}_archive");
        validate_identifier(&archive_table)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS \"{archive_table}\" AS \
             SELECT *, NOW() AS archived_at FROM \"{table}\" WHERE false"
        ))
        .execute(&mut *tx)
        .await?;

        let insert_sql = format!(
            "INSERT INTO \"{archive_table}\" \
             SELECT *, NOW() AS archived_at FROM \"{table}\" WHERE {where_clause}"
        );
        let mut insert = sqlx::query(&insert_sql);
        if let Some(val) = condition_value {
            insert = insert.bind(val);
        }
        insert.execute(&mut *tx).await?;

        let delete_sql = format!("DELETE FROM \"{table}\" WHERE {where_clause}");
        let mut delete = sqlx::query(&delete_sql);
        if let Some(val) = condition_value {
            delete = delete.bind(val);
        }
        let affected = delete.execute(&mut *tx).await?.rows_affected() as i64;

        tx.commit().await?;
        Ok(affected)
    }
}

/// Table/column identifiers are only ever sourced from admin-configured
/// policy rows or the compile-time schema map, never from request input —
/// this check exists as a last line of defense against a malformed policy
/// row being interpolated into SQL text.
fn validate_identifier(ident: &str) -> ComplianceResult<()> {
    let ok = !ident.is_empty()
        && ident.chars().next().map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
        && ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(ComplianceError::InvalidArgument(format!(
            "unsafe identifier in retention policy: {ident}"
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;

    #[test]
    fn validate_identifier_rejects_injection_attempts() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("created_at").is_ok());
        assert!(validate_identifier("users; DROP TABLE users;--").is_err());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1table").is_err());
    }
}
