//! Closed-set domain enums
//!
//! Each of these is a Postgres `text` column under the hood, constrained by
//! a `CHECK` in the migrations. Modeled as real enums (rather than bare
//! `&str` constants) with `Display`/`FromStr`/`sqlx::Type` so invalid values
//! are unrepresentable once past the wire boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! wire_enum {
    ($name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
        #[sqlx(type_name = "text")]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let s = match self {
                    $(Self::$variant => $wire),+
                };
                f.write_str(s)
            }
        }

        impl FromStr for $name {
            type Err = crate::error::ComplianceError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok(Self::$variant),)+
                    other => Err(crate::error::ComplianceError::InvalidArgument(format!(
                        "unrecognized {} value: {other}",
                        stringify!($name)
                    ))),
                }
            }
        }

        impl sqlx::postgres::PgHasArrayType for $name {
            fn array_type_info() -> sqlx::postgres::PgTypeInfo {
                sqlx::postgres::PgTypeInfo::with_name("_text")
            }
        }
    };
}

wire_enum!(ConsentType {
    Marketing => "marketing",
    DataProcessing => "data_processing",
    Analytics => "analytics",
    ThirdPartySharing => "third_party_sharing",
});

wire_enum!(ConsentStatus {
    Granted => "granted",
    Withdrawn => "withdrawn",
    Expired => "expired",
});

wire_enum!(RequestType {
    DataExport => "data_export",
    DataErasure => "data_erasure",
    DataAccess => "data_access",
    DataRectification => "data_rectification",
    ProcessingRestriction => "processing_restriction",
    DataPortability => "data_portability",
});

wire_enum!(RequestStatus {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Rejected => "rejected",
    Cancelled => "cancelled",
});

wire_enum!(AuditAction {
    ConsentGranted => "consent_granted",
    ConsentWithdrawn => "consent_withdrawn",
    ConsentExpired => "consent_expired",
    DataAccessed => "data_accessed",
    DataExported => "data_exported",
    DataDeleted => "data_deleted",
    DataAnonymized => "data_anonymized",
    DataRectified => "data_rectified",
    RequestCreated => "request_created",
    RequestProcessed => "request_processed",
    RequestCompleted => "request_completed",
    RequestRejected => "request_rejected",
    RetentionCleanup => "retention_cleanup",
    PolicyUpdated => "policy_updated",
    VerificationSent => "verification_sent",
    VerificationCompleted => "verification_completed",
});

wire_enum!(RestrictionReason {
    AccuracyContested => "accuracy_contested",
    UnlawfulProcessing => "unlawful_processing",
    NoLongerNeeded => "no_longer_needed",
    ObjectionPending => "objection_pending",
});

wire_enum!(RetentionAction {
    Delete => "delete",
    Anonymize => "anonymize",
    Archive => "archive",
});

wire_enum!(WebhookEvent {
    ConsentGranted => "consent.granted",
    ConsentWithdrawn => "consent.withdrawn",
    ConsentExpired => "consent.expired",
    RequestCreated => "request.created",
    RequestProcessing => "request.processing",
    RequestCompleted => "request.completed",
    RequestRejected => "request.rejected",
    DataExported => "data.exported",
    DataErased => "data.erased",
    DataRectified => "data.rectified",
    DataRestricted => "data.restricted",
    ComplianceOverdueAlert => "compliance.overdue_alert",
    ComplianceRetentionCleanup => "compliance.retention_cleanup",
});

/// Operations the restriction manager recognizes, per `RESTRICTABLE_OPERATIONS`.
pub const RESTRICTABLE_OPERATIONS: &[&str] = &[
    "read", "update", "delete", "export", "share", "process", "marketing",
];

/// Personal-data-carrying tables the restriction manager can scope to.
pub const PERSONAL_DATA_TABLES: &[&str] = &[
    "users",
    "leads",
    "reviews",
    "locations",
    "outreach_log",
    "gdpr_consents",
    "gdpr_requests",
];

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;

    #[test]
    fn consent_status_round_trips() {
        for s in [ConsentStatus::Granted, ConsentStatus::Withdrawn, ConsentStatus::Expired] {
            let wire = s.to_string();
            assert_eq!(ConsentStatus::from_str(&wire).unwrap(), s);
        }
    }

    #[test]
    fn audit_action_rejects_unknown_wire_value() {
        assert!(AuditAction::from_str("not_a_real_action").is_err());
    }

    #[test]
    fn request_type_display_matches_wire_format() {
        assert_eq!(RequestType::DataErasure.to_string(), "data_erasure");
    }
}
