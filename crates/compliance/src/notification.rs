//! Notification service (C9)
//!
//! Transport-agnostic behind [`EmailSender`]; the one concrete
//! implementation follows the teacher's `SecurityEmailService` — a
//! `reqwest::Client` POST to the Resend API with Bearer auth — rather than
//! the original's raw SMTP, since the rest of this workspace already
//! assumes an HTTP email provider.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::consent::Consent;
use crate::error::ComplianceResult;
use crate::request_engine::GdprRequest;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("email transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone)]
pub struct ResendConfig {
    pub api_key: String,
    pub from_address: String,
    pub dpo_email: String,
    pub company_name: String,
    pub support_email: String,
}

impl ResendConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("RESEND_API_KEY").unwrap_or_default(),
            from_address: std::env::var("GDPR_EMAIL_FROM")
                .unwrap_or_else(|_| "Compliance <compliance@localhost>".to_string()),
            dpo_email: std::env::var("GDPR_DPO_EMAIL")
                .unwrap_or_else(|_| "dpo@localhost".to_string()),
            company_name: std::env::var("APP_NAME").unwrap_or_else(|_| "Compliance Engine".to_string()),
            support_email: std::env::var("SUPPORT_EMAIL")
                .unwrap_or_else(|_| "support@localhost".to_string()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[derive(Clone)]
pub struct ResendEmailSender {
    config: ResendConfig,
    http: reqwest::Client,
}

impl ResendEmailSender {
    pub fn new(config: ResendConfig) -> Self {
        Self { config, http: reqwest::Client::new() }
    }
}

#[async_trait]
impl EmailSender for ResendEmailSender {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), NotifyError> {
        if !self.config.is_enabled() {
            tracing::warn!(subject, "resend not configured, skipping gdpr notification");
            return Ok(());
        }

        let body = serde_json::json!({
            "from": self.config.from_address,
            "to": [to],
            "subject": subject,
            "html": html,
        });

        let response = self
            .http
            .post("https://api.resend.com/emails")
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        if response.status().is_success() {
            tracing::info!(to, subject, "gdpr_notification_sent");
            Ok(())
        } else {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            tracing::error!(to, subject, %status, body = %text, "gdpr_notification_failed");
            Err(NotifyError::Transport(format!("HTTP {status}")))
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct NotificationOutcome {
    pub count_found: i64,
    pub count_sent: i64,
}

/// Wraps an [`EmailSender`] with the GDPR-specific templates. Individual
/// send failures are logged, not propagated — a failed DPO alert must
/// never abort the rest of a daily sweep.
pub struct NotificationService<'a> {
    sender: &'a dyn EmailSender,
    dpo_email: String,
    company_name: String,
    support_email: String,
}

impl<'a> NotificationService<'a> {
    pub fn new(sender: &'a dyn EmailSender, config: &ResendConfig) -> Self {
        Self {
            sender,
            dpo_email: config.dpo_email.clone(),
            company_name: config.company_name.clone(),
            support_email: config.support_email.clone(),
        }
    }

    pub async fn notify_request_created(&self, request: &GdprRequest) -> bool {
        let subject = format!("[GDPR] Request Received - {}", request.request_type);
        let html = self.wrap(
            "Request Received",
            "#2563eb",
            &format!(
                "<p>Dear {},</p><p>We've received your <strong>{}</strong> request. \
                 It will be processed within 30 days, by {}.</p>",
                request.subject_email,
                request.request_type,
                request.deadline_at.date(),
            ),
        );
        self.try_send(&request.subject_email, &subject, &html).await
    }

    pub async fn notify_request_completed(&self, request: &GdprRequest) -> bool {
        let subject = format!("[GDPR] Request Completed - {}", request.request_type);
        let html = self.wrap(
            "Request Completed",
            "#059669",
            &format!(
                "<p>Dear {},</p><p>Your <strong>{}</strong> request has been completed.</p>",
                request.subject_email, request.request_type,
            ),
        );
        self.try_send(&request.subject_email, &subject, &html).await
    }

    pub async fn notify_request_rejected(&self, request: &GdprRequest, reason: &str) -> bool {
        let subject = format!("[GDPR] Request Rejected - {}", request.request_type);
        let html = self.wrap(
            "Request Rejected",
            "#dc2626",
            &format!(
                "<p>Dear {},</p><p>Your <strong>{}</strong> request could not be fulfilled.</p>\
                 <p><strong>Reason:</strong> {reason}</p>",
                request.subject_email, request.request_type,
            ),
        );
        self.try_send(&request.subject_email, &subject, &html).await
    }

    /// A single digest email to the DPO listing every overdue request.
    pub async fn notify_overdue(&self, overdue: &[GdprRequest]) -> ComplianceResult<NotificationOutcome> {
        if overdue.is_empty() {
            return Ok(NotificationOutcome::default());
        }

        let subject = format!("[GDPR ALERT] {} Overdue Request(s) Require Attention", overdue.len());
        let now = OffsetDateTime::now_utc();
        let rows: String = overdue
            .iter()
            .map(|r| {
                let days_overdue = (now - r.deadline_at).whole_days().max(0);
                format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td>\
                     <td style=\"color:#ef4444;font-weight:bold;\">{days_overdue} days</td>\
                     <td>{}</td></tr>",
                    r.id, r.subject_email, r.request_type, r.status,
                )
            })
            .collect();

        let html = self.wrap(
            "GDPR Compliance Alert",
            "#ef4444",
            &format!(
                "<p><strong>URGENT:</strong> the following requests are past their 30-day \
                 deadline and require immediate attention.</p>\
                 <table style=\"width:100%;border-collapse:collapse;\">\
                 <thead><tr><th>Request</th><th>Email</th><th>Type</th><th>Overdue</th><th>Status</th></tr></thead>\
                 <tbody>{rows}</tbody></table>",
            ),
        );

        let sent = self.try_send(&self.dpo_email.clone(), &subject, &html).await;
        Ok(NotificationOutcome { count_found: overdue.len() as i64, count_sent: if sent { 1 } else { 0 } })
    }

    /// Per-subject reminder for consent expiring within the window. Each
    /// failure is logged and skipped; the loop never aborts early.
    pub async fn notify_consent_expiring(&self, expiring: &[Consent]) -> NotificationOutcome {
        let mut count_sent = 0;
        for consent in expiring {
            let days_until = (consent.expires_at.unwrap_or(OffsetDateTime::now_utc()) - OffsetDateTime::now_utc())
                .whole_days()
                .max(0);
            let subject = format!("[GDPR] Your Consent is Expiring Soon - {}", consent.consent_type);
            let html = self.wrap(
                "Consent Expiring Soon",
                "#f59e0b",
                &format!(
                    "<p>Dear {},</p><p>Your consent for <strong>{}</strong> will expire in \
                     <strong>{days_until} days</strong>. If you wish to continue, please renew it \
                     before it expires; otherwise no action is needed.</p>",
                    consent.subject_email, consent.consent_type,
                ),
            );
            if self.try_send(&consent.subject_email, &subject, &html).await {
                count_sent += 1;
            }
        }
        NotificationOutcome { count_found: expiring.len() as i64, count_sent }
    }

    async fn try_send(&self, to: &str, subject: &str, html: &str) -> bool {
        match self.sender.send(to, subject, html).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(to, subject, error = %e, "gdpr notification send failed");
                false
            }
        }
    }

    fn wrap(&self, title: &str, accent: &str, body: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html><head><meta charset="utf-8"></head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
<div style="max-width: 640px; margin: 0 auto; padding: 20px;">
<div style="background: {accent}; color: white; padding: 20px; text-align: center;"><h1>{title}</h1></div>
<div style="padding: 20px; background: #f9fafb;">{body}
<p style="color: #666; font-size: 14px;">Questions? Contact <a href="mailto:{support}">{support}</a>.</p>
</div>
<div style="padding: 20px; text-align: center; font-size: 12px; color: #6b7280;"><p>&copy; {company}</p></div>
</div></body></html>"#,
            accent = accent,
            title = title,
            body = body,
            support = self.support_email,
            company = self.company_name,
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;
    use crate::types::{ConsentStatus, ConsentType, RequestStatus, RequestType};
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl EmailSender for RecordingSender {
        async fn send(&self, to: &str, subject: &str, _html: &str) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Transport("boom".into()));
            }
            self.sent.lock().unwrap().push((to.to_string(), subject.to_string()));
            Ok(())
        }
    }

    fn test_config() -> ResendConfig {
        ResendConfig {
            api_key: "unused-in-these-tests".into(),
            from_address: "Compliance <compliance@example.com>".into(),
            dpo_email: "dpo@example.com".into(),
            company_name: "Acme".into(),
            support_email: "support@example.com".into(),
        }
    }

    fn sample_request(status: RequestStatus, deadline_at: OffsetDateTime) -> GdprRequest {
        GdprRequest {
            id: Uuid::new_v4(),
            subject_email: "subject@example.com".into(),
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

    fn sample_consent(expires_at: Option<OffsetDateTime>) -> Consent {
        Consent {
            id: Uuid::new_v4(),
            subject_email: "subject@example.com".into(),
            consent_type: ConsentType::Marketing,
            status: ConsentStatus::Granted,
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
    fn resend_config_is_enabled_requires_api_key() {
        let mut config = test_config();
        config.api_key = String::new();
        assert!(!config.is_enabled());
        config.api_key = "re_123".into();
        assert!(config.is_enabled());
    }

    #[tokio::test]
    async fn notify_request_created_sends_to_subject() {
        let sender = RecordingSender::default();
        let config = test_config();
        let service = NotificationService::new(&sender, &config);
        let request = sample_request(RequestStatus::Pending, OffsetDateTime::now_utc());

        let ok = service.notify_request_created(&request).await;

        assert!(ok);
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "subject@example.com");
        assert!(sent[0].1.contains("Request Received"));
    }

    #[tokio::test]
    async fn notify_request_created_returns_false_on_transport_failure() {
        let sender = RecordingSender { fail: true, ..Default::default() };
        let config = test_config();
        let service = NotificationService::new(&sender, &config);
        let request = sample_request(RequestStatus::Pending, OffsetDateTime::now_utc());

        assert!(!service.notify_request_created(&request).await);
    }

    #[tokio::test]
    async fn notify_overdue_skips_sending_when_list_is_empty() {
        let sender = RecordingSender::default();
        let config = test_config();
        let service = NotificationService::new(&sender, &config);

        let outcome = service.notify_overdue(&[]).await.unwrap();

        assert_eq!(outcome.count_found, 0);
        assert_eq!(outcome.count_sent, 0);
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn notify_overdue_sends_single_digest_to_dpo() {
        let sender = RecordingSender::default();
        let config = test_config();
        let service = NotificationService::new(&sender, &config);
        let overdue = vec![
            sample_request(RequestStatus::Pending, OffsetDateTime::now_utc() - time::Duration::days(40)),
            sample_request(RequestStatus::InProgress, OffsetDateTime::now_utc() - time::Duration::days(35)),
        ];

        let outcome = service.notify_overdue(&overdue).await.unwrap();

        assert_eq!(outcome.count_found, 2);
        assert_eq!(outcome.count_sent, 1);
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "dpo@example.com");
    }

    #[tokio::test]
    async fn notify_consent_expiring_counts_only_successful_sends() {
        let sender = RecordingSender::default();
        let config = test_config();
        let service = NotificationService::new(&sender, &config);
        let expiring = vec![
            sample_consent(Some(OffsetDateTime::now_utc() + time::Duration::days(5))),
            sample_consent(Some(OffsetDateTime::now_utc() + time::Duration::days(10))),
        ];

        let outcome = service.notify_consent_expiring(&expiring).await;

        assert_eq!(outcome.count_found, 2);
        assert_eq!(outcome.count_sent, 2);
        assert_eq!(sender.sent.lock().unwrap().len(), 2);
    }

    #[test]
    fn wrap_embeds_title_body_and_support_contact() {
        let sender = RecordingSender::default();
        let config = test_config();
        let service = NotificationService::new(&sender, &config);

        let html = service.wrap("A Title", "#000000", "<p>body text</p>");

        assert!(html.contains("A Title"));
        assert!(html.contains("<p>body text</p>"));
        assert!(html.contains("support@example.com"));
        assert!(html.contains("Acme"));
    }
}
