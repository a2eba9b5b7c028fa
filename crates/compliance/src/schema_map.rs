//! Compile-time schema map: the single security boundary for every
//! operation that touches PII tables by name.
//!
//! Three distinct capabilities are tracked per table, mirroring the three
//! independent configuration dicts the original implementation kept
//! (export columns, erasure/anonymize config, rectifiable fields) — a
//! table can appear in one, two, or all three without the others being
//! implied. `locations` is the clearest example: exportable, but
//! `skip = true` for erasure and absent from rectification entirely.

use std::collections::HashMap;
use std::sync::OnceLock;

use sha2::{Digest, Sha256};

/// How a table identifies the data subject: by an email column directly,
/// or (for tables like `reviews` with no stored email) by a loose
/// `LIKE`-match against the local part of the email via an author column.
#[derive(Debug, Clone, Copy)]
pub enum SubjectMatch {
    EmailColumn(&'static str),
    AuthorNameLike(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct AnonymizeField {
    pub column: &'static str,
    /// `None` means set to SQL NULL; `Some(v)` means set to the literal `v`.
    pub value: Option<&'static str>,
}

/// Per-table capability descriptor. Every field is independently optional
/// because a table's presence in one capability never implies the others.
#[derive(Debug, Clone, Default)]
pub struct TableDescriptor {
    pub subject_match: Option<SubjectMatch>,

    /// Export (Article 15): fixed column projection. `None` means no
    /// export support is configured for this table.
    pub export_columns: Option<&'static [&'static str]>,

    /// Erasure (Article 17): whether rows can be hard-deleted, and/or an
    /// anonymize-in-place fallback for tables that cannot be deleted
    /// outright (e.g. `reviews`, which must keep the review body).
    pub can_delete: bool,
    pub anonymize_fields: &'static [AnonymizeField],
    /// Tables to cascade a hard delete into (their subject match is looked
    /// up independently in the map).
    pub cascade_to: &'static [&'static str],
    /// This table is deliberately excluded from erasure (business data,
    /// not personal data, e.g. `locations`).
    pub skip_erasure: bool,

    /// Rectification (Article 16): whitelist of fields a subject may ask
    /// to have corrected. Empty means rectification is not offered for
    /// this table even though it may be exportable/erasable.
    pub rectifiable_fields: &'static [&'static str],
}

pub type SchemaMap = HashMap<&'static str, TableDescriptor>;

/// Declared order of the tables above, for callers that need a stable
/// ordering (e.g. `tables_exported` in an export result) despite the
/// backing map itself being unordered.
pub const TABLE_DECLARATION_ORDER: &[&str] = &[
    "users", "leads", "reviews", "locations", "outreach_log", "gdpr_consents", "gdpr_requests",
];

/// Sorts `tables` in place by `TABLE_DECLARATION_ORDER`; unknown names sort
/// after all known ones, in their original relative order.
pub fn sort_by_declaration_order(tables: &mut [String]) {
    tables.sort_by_key(|t| {
        TABLE_DECLARATION_ORDER.iter().position(|&n| n == t).unwrap_or(TABLE_DECLARATION_ORDER.len())
    });
}

static SCHEMA_MAP: OnceLock<SchemaMap> = OnceLock::new();

pub fn schema_map() -> &'static SchemaMap {
    SCHEMA_MAP.get_or_init(build_schema_map)
}

fn build_schema_map() -> SchemaMap {
    let mut map = SchemaMap::new();

    map.insert(
        "users",
        TableDescriptor {
            subject_match: Some(SubjectMatch::EmailColumn("email")),
            export_columns: Some(&[
                "id", "email", "name", "company", "created_at",
            ]),
            can_delete: true,
            anonymize_fields: &[],
            cascade_to: &["outreach_log"],
            skip_erasure: false,
            rectifiable_fields: &[
                "name", "company", "phone",
            ],
        },
    );

    map.insert(
        "leads",
        TableDescriptor {
            subject_match: Some(SubjectMatch::EmailColumn("email")),
            export_columns: Some(&[
                "id", "email", "name", "phone", "linkedin_url", "title", "company", "created_at",
            ]),
            can_delete: true,
            anonymize_fields: &[],
            cascade_to: &["outreach_log"],
            skip_erasure: false,
            rectifiable_fields: &[
                "name", "title", "company", "phone", "linkedin_url",
            ],
        },
    );

    map.insert(
        "reviews",
        TableDescriptor {
            subject_match: Some(SubjectMatch::AuthorNameLike("author_name")),
            export_columns: Some(&[
                "id", "author_name", "author_url", "rating", "body", "created_at",
            ]),
            can_delete: false,
            anonymize_fields: &[
                AnonymizeField { column: "author_name", value: Some("Anonymous User") },
                AnonymizeField { column: "author_url", value: None },
            ],
            cascade_to: &[],
            skip_erasure: false,
            rectifiable_fields: &[],
        },
    );

    map.insert(
        "locations",
        TableDescriptor {
            subject_match: None,
            export_columns: Some(&[
                "id", "name", "address", "phone", "website", "city", "country", "created_at",
            ]),
            can_delete: false,
            anonymize_fields: &[],
            cascade_to: &[],
            skip_erasure: true,
            rectifiable_fields: &[],
        },
    );

    map.insert(
        "outreach_log",
        TableDescriptor {
            subject_match: Some(SubjectMatch::EmailColumn("lead_email")),
            export_columns: Some(&[
                "id", "lead_email", "campaign", "status", "sent_at", "created_at",
            ]),
            can_delete: true,
            anonymize_fields: &[],
            cascade_to: &[],
            skip_erasure: false,
            rectifiable_fields: &[],
        },
    );

    map.insert(
        "gdpr_consents",
        TableDescriptor {
            subject_match: Some(SubjectMatch::EmailColumn("subject_email")),
            export_columns: Some(&[
                "id", "subject_email", "consent_type", "status", "granted_at",
                "withdrawn_at", "expires_at", "consent_version",
            ]),
            can_delete: false,
            anonymize_fields: &[
                AnonymizeField { column: "ip_address", value: None },
                AnonymizeField { column: "user_agent", value: None },
            ],
            cascade_to: &[],
            skip_erasure: false,
            rectifiable_fields: &[],
        },
    );

    map.insert(
        "gdpr_requests",
        TableDescriptor {
            subject_match: Some(SubjectMatch::EmailColumn("subject_email")),
            export_columns: Some(&[
                "id", "subject_email", "request_type", "status", "created_at",
                "deadline_at", "completed_at",
            ]),
            can_delete: false,
            anonymize_fields: &[
                AnonymizeField { column: "ip_address", value: None },
                AnonymizeField { column: "user_agent", value: None },
            ],
            cascade_to: &[],
            skip_erasure: false,
            rectifiable_fields: &[],
        },
    );

    map
}

/// All tables enrolled for export — i.e. the tables the exporter walks.
pub fn tables_for_export() -> impl Iterator<Item = (&'static str, &'static TableDescriptor)> {
    schema_map()
        .iter()
        .filter(|(_, d)| d.export_columns.is_some())
        .map(|(name, d)| (*name, d))
}

/// All tables enrolled for erasure — excludes `skip_erasure` tables and
/// tables with neither `can_delete` nor any `anonymize_fields` configured.
pub fn tables_for_erasure() -> impl Iterator<Item = (&'static str, &'static TableDescriptor)> {
    schema_map().iter().filter(|(_, d)| {
        !d.skip_erasure && (d.can_delete || !d.anonymize_fields.is_empty())
    }).map(|(name, d)| (*name, d))
}

/// Fields a subject may rectify on `table`, or `None` if the table isn't
/// rectifiable at all.
pub fn rectifiable_fields(table: &str) -> Option<&'static [&'static str]> {
    schema_map().get(table).map(|d| d.rectifiable_fields).filter(|f| !f.is_empty())
}

/// Derive the deterministic anonymized placeholder email for a subject,
/// matching the original `"deleted_" + sha256(email)[:8] + "@anonymized.local"`
/// scheme exactly (first 4 bytes of the digest, hex-encoded).
pub fn anon_email(email: &str) -> String {
    let digest = Sha256::digest(email.to_lowercase().as_bytes());
    format!("deleted_{}@anonymized.local", hex::encode(&digest[..4]))
}

/// The local part of an email address, used for the author-name `LIKE`
/// match fallback (`reviews.author_name LIKE '%username%'`).
pub fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;

    #[test]
    fn anon_email_is_deterministic_and_eight_hex_chars() {
        let a = anon_email("person@example.com");
        let b = anon_email("PERSON@example.com");
        assert_eq!(a, b, "anonymization must be case-insensitive on the input email");
        assert!(a.starts_with("deleted_"));
        assert!(a.ends_with("@anonymized.local"));
        let hex_part = &a["deleted_".len()..a.len() - "@anonymized.local".len()];
        assert_eq!(hex_part.len(), 8);
        assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn locations_is_exportable_but_not_erasable_or_rectifiable() {
        let map = schema_map();
        let locations = map.get("locations").unwrap();
        assert!(locations.export_columns.is_some());
        assert!(locations.skip_erasure);
        assert!(rectifiable_fields("locations").is_none());
    }

    #[test]
    fn gdpr_consents_is_exportable_and_anonymizable_but_not_rectifiable() {
        assert!(rectifiable_fields("gdpr_consents").is_none());
        let d = schema_map().get("gdpr_consents").unwrap();
        assert!(!d.anonymize_fields.is_empty());
        assert!(!d.can_delete);
    }

    #[test]
    fn sort_by_declaration_order_matches_schema_order_regardless_of_input() {
        let mut tables = vec!["reviews".to_string(), "users".to_string(), "leads".to_string()];
        sort_by_declaration_order(&mut tables);
        assert_eq!(tables, vec!["users".to_string(), "leads".to_string(), "reviews".to_string()]);
    }

    #[test]
    fn sort_by_declaration_order_pushes_unknown_tables_last() {
        let mut tables = vec!["mystery_table".to_string(), "leads".to_string()];
        sort_by_declaration_order(&mut tables);
        assert_eq!(tables, vec!["leads".to_string(), "mystery_table".to_string()]);
    }

    #[test]
    fn email_local_part_splits_on_at() {
        assert_eq!(email_local_part("jane.doe@example.com"), "jane.doe");
    }
}
