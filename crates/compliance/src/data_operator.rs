//! Data operator (C4): export, erase, rectify
//!
//! Every operation here resolves its target rows through the schema map
//! (`crate::schema_map`) and never accepts a table/column name from the
//! caller directly — the caller supplies a subject email and, for
//! rectification, a `table -> {field -> value}` map that is validated
//! against the whitelist before a single query runs.

use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::Value as Json;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditLogger};
use crate::error::{ComplianceError, ComplianceResult};
use crate::restriction::RestrictionManager;
use crate::schema_map::{
    email_local_part, rectifiable_fields, schema_map, sort_by_declaration_order,
    tables_for_erasure, tables_for_export, SubjectMatch,
};
use crate::types::{AuditAction, WebhookEvent};
use crate::webhooks::EventPublisher;

pub struct DataOperator<'a> {
    pool: &'a PgPool,
    publisher: &'a dyn EventPublisher,
    export_dir: PathBuf,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ExportResult {
    pub email: String,
    pub format: String,
    pub file_path: String,
    pub file_size: u64,
    pub total_records: i64,
    pub tables_exported: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub export_timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, serde::Serialize, Default)]
pub struct ErasureResult {
    pub email: String,
    pub tables_affected: Vec<String>,
    pub total_records: i64,
    pub dry_run: bool,
    pub per_table: HashMap<String, i64>,
}

#[derive(Debug, Clone, serde::Serialize, Default)]
pub struct RectificationResult {
    pub total_fields_updated: i64,
    pub dry_run: bool,
    pub per_table: HashMap<String, Json>,
    pub errors: Vec<String>,
}

impl<'a> DataOperator<'a> {
    pub fn new(pool: &'a PgPool, publisher: &'a dyn EventPublisher, export_dir: impl Into<PathBuf>) -> Self {
        Self { pool, publisher, export_dir: export_dir.into() }
    }

    // ------------------------------------------------------------------
    // Export (Article 15)
    // ------------------------------------------------------------------

    /// Queries every exportable table for rows matching `email`, without
    /// writing a file. Used both by `preview_export` and as the shared
    /// core of `export_data`.
    async fn collect_export_rows(&self, email: &str) -> ComplianceResult<(HashMap<String, Vec<Json>>, i64)> {
        let mut data = HashMap::new();
        let mut total = 0i64;

        for (table, descriptor) in tables_for_export() {
            let Some(subject_match) = descriptor.subject_match else {
                continue;
            };
            let Some(columns) = descriptor.export_columns else {
                continue;
            };
            let projection = columns.join(", ");

            let rows = match subject_match {
                SubjectMatch::EmailColumn(col) => {
                    let sql = format!(
                        "SELECT {projection} FROM \"{table}\" WHERE LOWER(\"{col}\") = LOWER($1)"
                    );
                    sqlx::query(&sql).bind(email).fetch_all(self.pool).await?
                }
                SubjectMatch::AuthorNameLike(col) => {
                    let username = email_local_part(email);
                    let sql = format!(
                        "SELECT {projection} FROM \"{table}\" WHERE LOWER(\"{col}\") LIKE LOWER($1)"
                    );
                    sqlx::query(&sql)
                        .bind(format!("%{username}%"))
                        .fetch_all(self.pool)
                        .await?
                }
            };

            let records: Vec<Json> = rows.iter().map(|row| row_to_json(row, columns)).collect();
            total += records.len() as i64;
            if !records.is_empty() {
                data.insert(table.to_string(), records);
            }
        }

        Ok((data, total))
    }

    pub async fn preview_export(&self, email: &str) -> ComplianceResult<HashMap<String, Json>> {
        let email = email.to_lowercase();
        let (data, _) = self.collect_export_rows(&email).await?;
        Ok(data
            .into_iter()
            .map(|(table, rows)| {
                let sample: Vec<Json> = rows.iter().take(3).cloned().collect();
                (
                    table,
                    serde_json::json!({ "record_count": rows.len(), "sample": sample }),
                )
            })
            .collect())
    }

    pub async fn export_data(
        &self,
        email: &str,
        format: &str,
        request_id: Option<Uuid>,
        performed_by: Option<String>,
    ) -> ComplianceResult<ExportResult> {
        let email = email.to_lowercase();

        if RestrictionManager::new(self.pool, self.publisher)
            .check_restriction(&email, Some("export"), None)
            .await?
        {
            return Err(ComplianceError::PreconditionFailed(format!(
                "an active processing restriction blocks export for {email}"
            )));
        }

        let (data, total_records) = self.collect_export_rows(&email).await?;
        let mut tables_exported: Vec<String> = data.keys().cloned().collect();
        sort_by_declaration_order(&mut tables_exported);

        std::fs::create_dir_all(&self.export_dir)
            .map_err(|e| ComplianceError::Internal(format!("failed to create export dir: {e}")))?;

        let email_hash = hex::encode(&Sha256::digest(email.as_bytes())[..6]); // 12 hex chars
        let timestamp = OffsetDateTime::now_utc();
        let stamp = format!(
            "{:04}{:02}{:02}_{:02}{:02}{:02}",
            timestamp.year(),
            u8::from(timestamp.month()),
            timestamp.day(),
            timestamp.hour(),
            timestamp.minute(),
            timestamp.second(),
        );
        let ext = if format == "csv" { "csv" } else { "json" };
        let filename = format!("gdpr_export_{email_hash}_{stamp}.{ext}");
        let file_path = self.export_dir.join(&filename);

        let iso_timestamp = timestamp
            .format(&time::format_description::well_known::Rfc3339)
            .map_err(|e| ComplianceError::Internal(e.to_string()))?;

        if format == "csv" {
            let csv = render_csv(&email, &iso_timestamp, &data);
            std::fs::write(&file_path, csv)
                .map_err(|e| ComplianceError::Internal(format!("failed to write export: {e}")))?;
        } else {
            let export_envelope = serde_json::json!({
                "subject_email": email,
                "export_timestamp": iso_timestamp,
                "format": "json",
                "data": data,
            });
            let body = serde_json::to_string_pretty(&export_envelope)
                .map_err(|e| ComplianceError::Internal(e.to_string()))?;
            std::fs::write(&file_path, body)
                .map_err(|e| ComplianceError::Internal(format!("failed to write export: {e}")))?;
        }

        let file_size = std::fs::metadata(&file_path)
            .map_err(|e| ComplianceError::Internal(e.to_string()))?
            .len();

        AuditLogger::new(self.pool)
            .log_data_exported(
                &email,
                tables_exported.clone(),
                total_records,
                &file_path.to_string_lossy(),
                performed_by,
                request_id,
            )
            .await?;

        self.publisher
            .publish(
                WebhookEvent::DataExported,
                serde_json::json!({
                    "subject_email": email,
                    "tables_exported": tables_exported,
                    "total_records": total_records,
                }),
            )
            .await;

        Ok(ExportResult {
            email,
            format: format.to_string(),
            file_path: file_path.to_string_lossy().to_string(),
            file_size,
            total_records,
            tables_exported,
            export_timestamp: timestamp,
        })
    }

    /// Deletes export files older than `days` (default 7 in the caller),
    /// matching the original's `cleanup_old_exports`.
    pub fn cleanup_old_exports(&self, days: u64) -> ComplianceResult<u64> {
        let threshold = std::time::SystemTime::now()
            .checked_sub(std::time::Duration::from_secs(days * 86_400))
            .ok_or_else(|| ComplianceError::Internal("invalid retention window".to_string()))?;

        let mut removed = 0u64;
        let entries = match std::fs::read_dir(&self.export_dir) {
            Ok(e) => e,
            Err(_) => return Ok(0),
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with("gdpr_export_") {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                if let Ok(modified) = meta.modified() {
                    if modified < threshold {
                        if std::fs::remove_file(entry.path()).is_ok() {
                            removed += 1;
                        }
                    }
                }
            }
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Erasure (Article 17)
    // ------------------------------------------------------------------

    pub async fn preview_erasure(&self, email: &str) -> ComplianceResult<ErasureResult> {
        self.erase_data(email, true, None, None).await
    }

    /// Erasure deliberately does not consult the restriction manager: a
    /// `DataErasure` request is the legal basis for its own processing and
    /// overrides a standing restriction, per the carve-out this engine
    /// adds over the simpler source implementation.
    pub async fn erase_data(
        &self,
        email: &str,
        dry_run: bool,
        request_id: Option<Uuid>,
        performed_by: Option<String>,
    ) -> ComplianceResult<ErasureResult> {
        let email = email.to_lowercase();
        let mut result = ErasureResult { email: email.clone(), dry_run, ..Default::default() };

        for (table, descriptor) in tables_for_erasure() {
            let Some(subject_match) = descriptor.subject_match else { continue };

            let affected = if descriptor.can_delete {
                self.erase_table(table, subject_match, &email, dry_run).await?
            } else if !descriptor.anonymize_fields.is_empty() {
                self.anonymize_table(table, descriptor, subject_match, &email, dry_run)
                    .await?
            } else {
                0
            };

            if affected > 0 {
                result.tables_affected.push(table.to_string());
                result.total_records += affected;
                result.per_table.insert(table.to_string(), affected);
            }
        }

        if !dry_run && result.total_records > 0 {
            let audit = AuditLogger::new(self.pool);
            let hard_deleted: Vec<String> = result
                .tables_affected
                .iter()
                .filter(|t| {
                    schema_map().get(t.as_str()).map_or(false, |d| d.can_delete)
                })
                .cloned()
                .collect();
            let anonymized: Vec<String> = result
                .tables_affected
                .iter()
                .filter(|t| !hard_deleted.contains(t))
                .cloned()
                .collect();

            if !hard_deleted.is_empty() {
                let deleted_count: i64 = hard_deleted.iter().filter_map(|t| result.per_table.get(t)).sum();
                audit
                    .log_data_deleted(&email, hard_deleted, deleted_count, performed_by.clone(), request_id)
                    .await?;
            }
            if !anonymized.is_empty() {
                let anonymized_count: i64 = anonymized.iter().filter_map(|t| result.per_table.get(t)).sum();
                audit
                    .log_data_anonymized(&email, anonymized, anonymized_count, performed_by, request_id)
                    .await?;
            }

            self.publisher
                .publish(
                    WebhookEvent::DataErased,
                    serde_json::json!({
                        "subject_email": email,
                        "tables_affected": result.tables_affected,
                        "total_records": result.total_records,
                    }),
                )
                .await;
        }

        Ok(result)
    }

    async fn erase_table(
        &self,
        table: &str,
        subject_match: SubjectMatch,
        email: &str,
        dry_run: bool,
    ) -> ComplianceResult<i64> {
        let where_clause = match subject_match {
            SubjectMatch::EmailColumn(col) => format!("LOWER(\"{col}\") = LOWER($1)"),
            SubjectMatch::AuthorNameLike(col) => format!("LOWER(\"{col}\") LIKE LOWER($1)"),
        };
        let bind_value = match subject_match {
            SubjectMatch::EmailColumn(_) => email.to_string(),
            SubjectMatch::AuthorNameLike(_) => format!("%{}%", email_local_part(email)),
        };

        if dry_run {
            let sql = format!("SELECT COUNT(*) FROM \"{table}\" WHERE {where_clause}");
            let count: i64 = sqlx::query_scalar(&sql).bind(bind_value).fetch_one(self.pool).await?;
            Ok(count)
        } else {
            let sql = format!("DELETE FROM \"{table}\" WHERE {where_clause}");
            let affected = sqlx::query(&sql).bind(bind_value).execute(self.pool).await?.rows_affected();
            Ok(affected as i64)
        }
    }

    async fn anonymize_table(
        &self,
        table: &str,
        descriptor: &crate::schema_map::TableDescriptor,
        subject_match: SubjectMatch,
        email: &str,
        dry_run: bool,
    ) -> ComplianceResult<i64> {
        let where_clause = match subject_match {
            SubjectMatch::EmailColumn(col) => format!("LOWER(\"{col}\") = LOWER($1)"),
            SubjectMatch::AuthorNameLike(col) => format!("LOWER(\"{col}\") LIKE LOWER($1)"),
        };
        let bind_value = match subject_match {
            SubjectMatch::EmailColumn(_) => email.to_string(),
            SubjectMatch::AuthorNameLike(_) => format!("%{}%", email_local_part(email)),
        };

        if dry_run {
            let sql = format!("SELECT COUNT(*) FROM \"{table}\" WHERE {where_clause}");
            let count: i64 = sqlx::query_scalar(&sql).bind(bind_value).fetch_one(self.pool).await?;
            return Ok(count);
        }

        let assignments: Vec<String> = descriptor
            .anonymize_fields
            .iter()
            .map(|f| match f.value {
                Some(v) => format!("\"{}\" = '{}'", f.column, v.replace('\'', "''")),
                None => format!("\"{}\" = NULL", f.column),
            })
            .collect();

        // `gdpr_consents`/`gdpr_requests` have no dedicated identifier
        // column to also rewrite; `reviews` doesn't carry an email, so
        // there's nothing further to redact beyond the configured fields.
        let sql = format!(
            "UPDATE \"{table}\" SET {} WHERE {where_clause}",
            assignments.join(", ")
        );
        let affected = sqlx::query(&sql).bind(bind_value).execute(self.pool).await?.rows_affected();
        Ok(affected as i64)
    }

    /// Age-based sweep for tables with PII but no dedicated retention
    /// policy row: anonymizes rows older than `older_than_days` using
    /// each table's own anonymize_fields descriptor. Used by the worker's
    /// retention cron for tables a policy author hasn't configured yet.
    pub async fn anonymize_old_data(&self, table: &str, older_than_days: i64) -> ComplianceResult<i64> {
        let descriptor = schema_map().get(table).ok_or_else(|| {
            ComplianceError::InvalidArgument(format!("unknown table: {table}"))
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
        let sql = format!(
            "UPDATE \"{table}\" SET {} WHERE created_at < NOW() - ($1 || ' days')::INTERVAL",
            assignments.join(", ")
        );
        let affected = sqlx::query(&sql).bind(older_than_days).execute(self.pool).await?.rows_affected();
        Ok(affected as i64)
    }

    // ------------------------------------------------------------------
    // Rectification (Article 16)
    // ------------------------------------------------------------------

    pub async fn get_rectifiable_fields(&self, email: &str) -> ComplianceResult<HashMap<String, Json>> {
        let email = email.to_lowercase();
        let mut out = HashMap::new();
        for (&table, descriptor) in schema_map().iter() {
            let Some(fields) = rectifiable_fields(table) else { continue };
            let Some(SubjectMatch::EmailColumn(col)) = descriptor.subject_match else { continue };

            let projection = fields.join(", ");
            let sql = format!("SELECT {projection} FROM \"{table}\" WHERE LOWER(\"{col}\") = LOWER($1)");
            let row = sqlx::query(&sql).bind(&email).fetch_optional(self.pool).await?;
            if let Some(row) = row {
                let values = row_to_json(&row, fields);
                out.insert(table.to_string(), serde_json::json!({ "fields": values, "rectifiable": true }));
            }
        }
        Ok(out)
    }

    pub async fn preview_rectification(
        &self,
        email: &str,
        rectifications: &HashMap<String, HashMap<String, Json>>,
    ) -> ComplianceResult<RectificationResult> {
        self.rectify_data(email, rectifications, None, None, None, true).await
    }

    /// Per-table-atomic validation: any field in a table's update set
    /// that isn't in its whitelist rejects the *whole table's* update
    /// (not just the bad field), matching the original's behavior.
    #[allow(clippy::too_many_arguments)]
    pub async fn rectify_data(
        &self,
        email: &str,
        rectifications: &HashMap<String, HashMap<String, Json>>,
        performed_by: Option<String>,
        ip_address: Option<String>,
        request_id: Option<Uuid>,
        dry_run: bool,
    ) -> ComplianceResult<RectificationResult> {
        let email = email.to_lowercase();
        let mut result = RectificationResult { dry_run, ..Default::default() };
        let mut combined_details = serde_json::Map::new();
        let restrictions = RestrictionManager::new(self.pool, self.publisher);

        for (table, field_updates) in rectifications {
            let Some(allowed) = rectifiable_fields(table) else {
                result.errors.push(format!("{table} is not a rectifiable table"));
                continue;
            };
            let descriptor = schema_map().get(table.as_str());
            let Some(SubjectMatch::EmailColumn(email_col)) =
                descriptor.and_then(|d| d.subject_match)
            else {
                result.errors.push(format!("{table} has no email identifier column"));
                continue;
            };

            if !dry_run && restrictions.check_restriction(&email, Some("update"), Some(table)).await? {
                result.errors.push(format!("{table}: blocked by an active processing restriction"));
                continue;
            }

            let invalid: Vec<&String> = field_updates
                .keys()
                .filter(|f| !allowed.contains(&f.as_str()))
                .collect();
            if !invalid.is_empty() {
                result.errors.push(format!(
                    "{table}: rejected, unknown field(s): {}",
                    invalid.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                ));
                continue;
            }

            if dry_run {
                result
                    .per_table
                    .insert(table.clone(), serde_json::json!({ "would_update": field_updates }));
                continue;
            }

            let old_values_sql = format!(
                "SELECT {} FROM \"{table}\" WHERE LOWER(\"{email_col}\") = LOWER($1)",
                field_updates.keys().cloned().collect::<Vec<_>>().join(", ")
            );
            let old_row = sqlx::query(&old_values_sql).bind(&email).fetch_optional(self.pool).await?;
            let old_values = old_row
                .as_ref()
                .map(|r| row_to_json(r, &field_updates.keys().map(|s| s.as_str()).collect::<Vec<_>>()));

            let assignments: Vec<String> = field_updates
                .keys()
                .enumerate()
                .map(|(i, f)| format!("\"{f}\" = ${}", i + 2))
                .collect();
            let sql = format!(
                "UPDATE \"{table}\" SET {}, updated_at = NOW() WHERE LOWER(\"{email_col}\") = LOWER($1)",
                assignments.join(", ")
            );
            let mut query = sqlx::query(&sql).bind(&email);
            for value in field_updates.values() {
                query = match value {
                    Json::String(s) => query.bind(s.clone()),
                    Json::Null => query.bind(None::<String>),
                    other => query.bind(other.to_string()),
                };
            }
            let affected = query.execute(self.pool).await?.rows_affected();

            if affected > 0 {
                result.total_fields_updated += field_updates.len() as i64;
                combined_details.insert(
                    table.clone(),
                    serde_json::json!({ "old": old_values, "new": field_updates }),
                );
                result.per_table.insert(table.clone(), serde_json::json!({ "rows_updated": affected }));
            }
        }

        if !dry_run && result.total_fields_updated > 0 {
            AuditLogger::new(self.pool)
                .log(
                    AuditAction::DataRectified,
                    AuditEntry {
                        subject_email: Some(email.clone()),
                        affected_tables: rectifications.keys().cloned().collect(),
                        affected_records_count: result.total_fields_updated,
                        performed_by,
                        ip_address,
                        request_id,
                        details: serde_json::json!({
                            "operation": "rectification",
                            "rectifications": Json::Object(combined_details),
                        }),
                        ..Default::default()
                    },
                )
                .await?;

            self.publisher
                .publish(
                    WebhookEvent::DataRectified,
                    serde_json::json!({
                        "subject_email": email,
                        "tables": rectifications.keys().collect::<Vec<_>>(),
                        "fields_updated": result.total_fields_updated,
                    }),
                )
                .await;
        }

        Ok(result)
    }

    /// Renames the subject's identifier across every rectifiable table
    /// that carries an email column, matching the original's
    /// `rectify_email` specialization.
    pub async fn rectify_email(
        &self,
        old_email: &str,
        new_email: &str,
        performed_by: Option<String>,
    ) -> ComplianceResult<i64> {
        let old_email = old_email.to_lowercase();
        let new_email = new_email.to_lowercase();
        if old_email == new_email {
            return Err(ComplianceError::InvalidArgument(
                "old and new email are the same".to_string(),
            ));
        }

        let mut total_updated = 0i64;
        for (&table, descriptor) in schema_map().iter() {
            if rectifiable_fields(table).is_none() {
                continue;
            }
            let Some(SubjectMatch::EmailColumn(col)) = descriptor.subject_match else { continue };
            let sql = format!(
                "UPDATE \"{table}\" SET \"{col}\" = $2, updated_at = NOW() WHERE LOWER(\"{col}\") = LOWER($1)"
            );
            let affected = sqlx::query(&sql)
                .bind(&old_email)
                .bind(&new_email)
                .execute(self.pool)
                .await?
                .rows_affected();
            total_updated += affected as i64;
        }

        if total_updated > 0 {
            AuditLogger::new(self.pool)
                .log(
                    AuditAction::DataRectified,
                    AuditEntry {
                        subject_email: Some(old_email),
                        affected_records_count: total_updated,
                        performed_by,
                        details: serde_json::json!({
                            "operation": "email_rectification",
                            "new_email": new_email,
                        }),
                        ..Default::default()
                    },
                )
                .await?;
        }

        Ok(total_updated)
    }
}

fn row_to_json(row: &sqlx::postgres::PgRow, columns: &[&str]) -> Json {
    let mut map = serde_json::Map::new();
    for col in columns {
        let value: Option<String> = row.try_get::<Option<String>, _>(*col).unwrap_or(None);
        map.insert((*col).to_string(), value.map(Json::String).unwrap_or(Json::Null));
    }
    Json::Object(map)
}


/// Five metadata lines, then one `=== <TABLE> ===` section per table with
/// a header row and data rows, matching the original `_write_csv_export`'s
/// layout exactly (§6 "Persisted file format — Export CSV").
fn render_csv(email: &str, iso_timestamp: &str, data: &HashMap<String, Vec<Json>>) -> String {
    let mut out = String::new();
    out.push_str("GDPR Data Export\n");
    out.push_str(&format!("Subject Email,{}\n", csv_escape(email)));
    out.push_str(&format!("Export Timestamp,{}\n", csv_escape(iso_timestamp)));
    out.push('\n');

    let mut tables: Vec<&String> = data.keys().collect();
    tables.sort();
    for table in tables {
        let rows = &data[table];
        out.push_str(&format!("=== {} ===\n", table.to_uppercase()));
        if let Some(Json::Object(first)) = rows.first() {
            let headers: Vec<&str> = first.keys().map(|s| s.as_str()).collect();
            out.push_str(&headers.iter().map(|h| csv_escape(h)).collect::<Vec<_>>().join(","));
            out.push('\n');
            for row in rows {
                if let Json::Object(obj) = row {
                    let values: Vec<String> = headers
                        .iter()
                        .map(|h| obj.get(*h).map(json_to_csv_cell).unwrap_or_default())
                        .collect();
                    out.push_str(&values.join(","));
                    out.push('\n');
                }
            }
        }
        out.push('\n');
    }
    out
}

fn json_to_csv_cell(v: &Json) -> String {
    match v {
        Json::String(s) => csv_escape(s),
        Json::Null => String::new(),
        other => csv_escape(&other.to_string()),
    }
}

/// RFC 4180 field quoting: a field containing a comma, quote, or newline
/// is wrapped in quotes with embedded quotes doubled.
fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]  // Allow unwrap()/expect() in tests for cleaner test code
mod tests {
    use super::*;

    #[test]
    fn csv_escape_passes_through_plain_fields() {
        assert_eq!(csv_escape("alice@example.com"), "alice@example.com");
    }

    #[test]
    fn csv_escape_quotes_fields_with_commas() {
        assert_eq!(csv_escape("Doe, Jane"), "\"Doe, Jane\"");
    }

    #[test]
    fn csv_escape_doubles_embedded_quotes() {
        assert_eq!(csv_escape("she said \"hi\""), "\"she said \"\"hi\"\"\"");
    }

    #[test]
    fn csv_escape_quotes_embedded_newlines() {
        assert_eq!(csv_escape("line1\nline2"), "\"line1\nline2\"");
    }

    #[test]
    fn json_to_csv_cell_unwraps_strings_without_quotes() {
        assert_eq!(json_to_csv_cell(&Json::String("plain".into())), "plain");
    }

    #[test]
    fn json_to_csv_cell_renders_null_as_empty() {
        assert_eq!(json_to_csv_cell(&Json::Null), "");
    }

    #[test]
    fn json_to_csv_cell_stringifies_non_string_values() {
        assert_eq!(json_to_csv_cell(&Json::Bool(true)), "true");
        assert_eq!(json_to_csv_cell(&Json::from(42)), "42");
    }

    #[test]
    fn render_csv_includes_header_and_sorted_table_sections() {
        let mut data = HashMap::new();
        data.insert(
            "users".to_string(),
            vec![serde_json::json!({"email": "a@example.com", "name": "A"})],
        );
        data.insert(
            "leads".to_string(),
            vec![serde_json::json!({"email": "a@example.com", "source": "ad"})],
        );

        let out = render_csv("a@example.com", "2026-01-01T00:00:00Z", &data);

        assert!(out.starts_with("GDPR Data Export\n"));
        assert!(out.contains("Subject Email,a@example.com\n"));
        assert!(out.contains("Export Timestamp,2026-01-01T00:00:00Z\n"));
        let leads_pos = out.find("=== LEADS ===").expect("leads section present");
        let users_pos = out.find("=== USERS ===").expect("users section present");
        assert!(leads_pos < users_pos, "table sections should be sorted alphabetically");
    }

    #[test]
    fn render_csv_handles_empty_table_without_panicking() {
        let data: HashMap<String, Vec<Json>> = HashMap::new();
        let out = render_csv("nobody@example.com", "2026-01-01T00:00:00Z", &data);
        assert!(out.contains("Subject Email,nobody@example.com"));
    }
}
