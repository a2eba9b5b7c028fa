//! Consent manager (C3)

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::audit::AuditLogger;
use crate::error::{ComplianceError, ComplianceResult};
use crate::types::{ConsentStatus, ConsentType};
use crate::webhooks::EventPublisher;

/// Default validity window for a granted consent when the caller doesn't
/// name one: 730 days (2 years), matching `consent_manager.py`'s
/// `DEFAULT_CONSENT_EXPIRY_DAYS`.
pub const DEFAULT_CONSENT_EXPIRY_DAYS: i64 = 730;

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct Consent {
    pub id: Uuid,
    pub subject_email: String,
    pub consent_type: ConsentType,
    pub status: ConsentStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub granted_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub withdrawn_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub consent_version: String,
    pub consent_text: Option<String>,
}

impl Consent {
    /// Mirrors the original's `is_valid()`: granted and either
    /// non-expiring or not yet past its `expires_at`.
    pub fn is_valid(&self) -> bool {
        self.status == ConsentStatus::Granted
            && self.expires_at.map_or(true, |exp| exp > OffsetDateTime::now_utc())
    }
}

pub struct ConsentManager<'a> {
    pool: &'a PgPool,
    publisher: &'a dyn EventPublisher,
}

impl<'a> ConsentManager<'a> {
    pub fn new(pool: &'a PgPool, publisher: &'a dyn EventPublisher) -> Self {
        Self { pool, publisher }
    }

    /// Upserts into `GRANTED`: a prior row in any state is revived rather
    /// than rejected, matching the spec's "at most one row per
    /// `(subject_email, type)`" invariant. `expires_in_days` defaults to
    /// [`DEFAULT_CONSENT_EXPIRY_DAYS`] when omitted, never "no expiry" —
    /// the original always sets an expiry when none is given.
    #[allow(clippy::too_many_arguments)]
    pub async fn grant_consent(
        &self,
        subject_email: &str,
        consent_type: ConsentType,
        expires_in_days: Option<i64>,
        ip_address: Option<String>,
        user_agent: Option<String>,
        consent_version: Option<String>,
        consent_text: Option<String>,
    ) -> ComplianceResult<Consent> {
        let email = subject_email.to_lowercase();
        let expires_at = OffsetDateTime::now_utc()
            + time::Duration::days(expires_in_days.unwrap_or(DEFAULT_CONSENT_EXPIRY_DAYS));
        let version = consent_version.unwrap_or_else(|| "1.0".to_string());

        let consent = sqlx::query_as::<_, Consent>(
            r#"
            INSERT INTO gdpr_consents (
                id, subject_email, consent_type, status, granted_at, withdrawn_at,
                expires_at, ip_address, user_agent, consent_version, consent_text
            )
            VALUES ($1, $2, $3, 'granted', NOW(), NULL, $4, $5, $6, $7, $8)
            ON CONFLICT (subject_email, consent_type) DO UPDATE SET
                status = 'granted',
                granted_at = NOW(),
                withdrawn_at = NULL,
                expires_at = EXCLUDED.expires_at,
                ip_address = EXCLUDED.ip_address,
                user_agent = EXCLUDED.user_agent,
                consent_version = EXCLUDED.consent_version,
                consent_text = EXCLUDED.consent_text
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&email)
        .bind(consent_type)
        .bind(expires_at)
        .bind(&ip_address)
        .bind(&user_agent)
        .bind(&version)
        .bind(&consent_text)
        .fetch_one(self.pool)
        .await?;

        AuditLogger::new(self.pool)
            .log_consent_granted(&email, &consent_type.to_string(), None, ip_address, user_agent)
            .await?;

        self.publisher
            .publish(
                crate::types::WebhookEvent::ConsentGranted,
                serde_json::json!({
                    "subject_email": email,
                    "consent_type": consent_type,
                    "expires_at": consent.expires_at,
                }),
            )
            .await;

        Ok(consent)
    }

    /// Only legal from `GRANTED`; any other source state (including no
    /// row at all) fails with `NotFound`/`NoActiveConsent`.
    pub async fn withdraw_consent(
        &self,
        subject_email: &str,
        consent_type: ConsentType,
        ip_address: Option<String>,
    ) -> ComplianceResult<Consent> {
        let email = subject_email.to_lowercase();
        let consent = sqlx::query_as::<_, Consent>(
            r#"
            UPDATE gdpr_consents
            SET status = 'withdrawn', withdrawn_at = NOW()
            WHERE subject_email = $1 AND consent_type = $2 AND status = 'granted'
            RETURNING *
            "#,
        )
        .bind(&email)
        .bind(consent_type)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| {
            ComplianceError::PreconditionFailed(format!(
                "no active {consent_type} consent for {email}"
            ))
        })?;

        AuditLogger::new(self.pool)
            .log_consent_withdrawn(&email, &consent_type.to_string(), None, ip_address)
            .await?;

        self.publisher
            .publish(
                crate::types::WebhookEvent::ConsentWithdrawn,
                serde_json::json!({ "subject_email": email, "consent_type": consent_type }),
            )
            .await;

        Ok(consent)
    }

    /// Per-type `withdraw`, ignoring types with no active `GRANTED` row.
    pub async fn withdraw_all(&self, subject_email: &str) -> ComplianceResult<i64> {
        let mut count = 0;
        for consent_type in [
            ConsentType::Marketing,
            ConsentType::DataProcessing,
            ConsentType::Analytics,
            ConsentType::ThirdPartySharing,
        ] {
            match self.withdraw_consent(subject_email, consent_type, None).await {
                Ok(_) => count += 1,
                Err(ComplianceError::PreconditionFailed(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(count)
    }

    pub async fn get_current_consents(&self, subject_email: &str) -> ComplianceResult<Vec<Consent>> {
        let email = subject_email.to_lowercase();
        let rows = sqlx::query_as::<_, Consent>(
            r#"
            SELECT DISTINCT ON (consent_type) *
            FROM gdpr_consents
            WHERE subject_email = $1
            ORDER BY consent_type, granted_at DESC
            "#,
        )
        .bind(&email)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn has_valid_consent(
        &self,
        subject_email: &str,
        consent_type: ConsentType,
    ) -> ComplianceResult<bool> {
        Ok(self
            .get_current_consents(subject_email)
            .await?
            .into_iter()
            .any(|c| c.consent_type == consent_type && c.is_valid()))
    }

    /// Sweeps consents whose `expires_at` has passed and are still marked
    /// `granted`, flipping them to `expired` and auditing each.
    pub async fn expire_old_consents(&self) -> ComplianceResult<i64> {
        let expired: Vec<(Uuid, String, ConsentType)> = sqlx::query_as(
            r#"
            UPDATE gdpr_consents
            SET status = 'expired'
            WHERE status = 'granted' AND expires_at IS NOT NULL AND expires_at < NOW()
            RETURNING id, subject_email, consent_type
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        let count = expired.len() as i64;
        let audit = AuditLogger::new(self.pool);
        for (id, email, consent_type) in expired {
            audit
                .log(
                    crate::types::AuditAction::ConsentExpired,
                    crate::audit::AuditEntry {
                        subject_email: Some(email.clone()),
                        affected_tables: vec!["gdpr_consents".to_string()],
                        affected_records_count: 1,
                        performed_by: Some("system".to_string()),
                        details: serde_json::json!({ "consent_id": id, "consent_type": consent_type.to_string() }),
                        ..Default::default()
                    },
                )
                .await?;
            self.publisher
                .publish(
                    crate::types::WebhookEvent::ConsentExpired,
                    serde_json::json!({ "subject_email": email, "consent_type": consent_type }),
                )
                .await;
        }
        Ok(count)
    }

    /// Consents expiring within `days_before` days, for the notification
    /// service's per-row reminder emails.
    pub async fn expiring_soon(&self, days_before: i64) -> ComplianceResult<Vec<Consent>> {
        let rows = sqlx::query_as::<_, Consent>(
            r#"
            SELECT * FROM gdpr_consents
            WHERE status = 'granted'
              AND expires_at IS NOT NULL
              AND expires_at > NOW()
              AND expires_at <= NOW() + ($1 || ' days')::INTERVAL
            ORDER BY expires_at ASC
            "#,
        )
        .bind(days_before)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn count_active(&self) -> ComplianceResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM gdpr_consents WHERE status = 'granted'")
                .fetch_one(self.pool)
                .await?;
        Ok(count)
    }

    /// `Consent.Status`: every recognized consent type, with types the
    /// subject never acted on filled in as `NOT_GIVEN` rather than absent
    /// from the map.
    pub async fn status(&self, subject_email: &str) -> ComplianceResult<std::collections::HashMap<ConsentType, ConsentView>> {
        let current = self.get_current_consents(subject_email).await?;
        let mut out: std::collections::HashMap<ConsentType, ConsentView> = [
            ConsentType::Marketing,
            ConsentType::DataProcessing,
            ConsentType::Analytics,
            ConsentType::ThirdPartySharing,
        ]
        .into_iter()
        .map(|t| (t, ConsentView::not_given()))
        .collect();

        for c in current {
            out.insert(c.consent_type, ConsentView::from(&c));
        }
        Ok(out)
    }
}

/// Wire-facing view for `Consent.Status`. `status` is the literal string
/// `"not_given"` for types the subject has never acted on — distinct from
/// [`ConsentStatus`], which has no such variant because it only describes
/// rows that exist.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConsentView {
    pub status: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub granted_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub withdrawn_at: Option<OffsetDateTime>,
    pub version: Option<String>,
}

impl ConsentView {
    fn not_given() -> Self {
        Self {
            status: "not_given".to_string(),
            granted_at: None,
            expires_at: None,
            withdrawn_at: None,
            version: None,
        }
    }
}

impl From<&Consent> for ConsentView {
    fn from(c: &Consent) -> Self {
        Self {
            status: c.status.to_string(),
            granted_at: Some(c.granted_at),
            expires_at: c.expires_at,
            withdrawn_at: c.withdrawn_at,
            version: Some(c.consent_version.clone()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;

    fn sample(status: ConsentStatus, expires_at: Option<OffsetDateTime>) -> Consent {
        Consent {
            id: Uuid::new_v4(),
            subject_email: "a@example.com".into(),
            consent_type: ConsentType::Marketing,
            status,
            granted_at: OffsetDateTime::now_utc(),
            withdrawn_at: None,
            expires_at,
            ip_address: None,
            user_agent: None,
            consent_version: "v1".into(),
            consent_text: None,
        }
    }

    #[test]
    fn is_valid_requires_granted_status() {
        assert!(!sample(ConsentStatus::Withdrawn, None).is_valid());
        assert!(!sample(ConsentStatus::Expired, None).is_valid());
        assert!(sample(ConsentStatus::Granted, None).is_valid());
    }

    #[test]
    fn is_valid_respects_expiry() {
        let future = OffsetDateTime::now_utc() + time::Duration::days(1);
        let past = OffsetDateTime::now_utc() - time::Duration::days(1);

        assert!(sample(ConsentStatus::Granted, Some(future)).is_valid());
        assert!(!sample(ConsentStatus::Granted, Some(past)).is_valid());
        assert!(sample(ConsentStatus::Granted, None).is_valid());
    }

    #[test]
    fn consent_view_not_given_has_no_dates() {
        let view = ConsentView::not_given();
        assert_eq!(view.status, "not_given");
        assert!(view.granted_at.is_none());
        assert!(view.version.is_none());
    }

    #[test]
    fn consent_view_from_consent_carries_fields() {
        let consent = sample(ConsentStatus::Granted, None);
        let view = ConsentView::from(&consent);
        assert_eq!(view.status, "granted");
        assert_eq!(view.granted_at, Some(consent.granted_at));
        assert_eq!(view.version, Some("v1".to_string()));
    }
}
