//! Daily scheduler (C10)
//!
//! A single clock-driven sweep the worker's `tokio-cron-scheduler` job
//! calls once a day. Each step's failure is logged and does not abort the
//! remaining steps — one struggling component should never mask the
//! others' outcomes.

use sqlx::PgPool;

use crate::consent::ConsentManager;
use crate::error::ComplianceResult;
use crate::notification::{NotificationOutcome, NotificationService};
use crate::request_engine::RequestEngine;
use crate::restriction::RestrictionManager;
use crate::webhooks::{EventPublisher, WebhookDispatcher};

/// Consents within this many days of `expires_at` get a reminder email.
pub const CONSENT_EXPIRY_WARNING_DAYS: i64 = 30;

/// Webhook delivery logs older than this are trimmed.
pub const WEBHOOK_LOG_RETENTION_DAYS: i64 = 90;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DailyReport {
    pub overdue_notified: NotificationOutcome,
    pub consents_expired: i64,
    pub restrictions_expired: i64,
    pub consent_expiry_notified: NotificationOutcome,
    pub webhook_logs_trimmed: i64,
    pub errors: Vec<String>,
}

/// Runs the exact 5-step sequence: notify overdue, expire consents, expire
/// restrictions, notify upcoming consent expiry, trim the webhook log.
pub async fn run_daily(
    pool: &PgPool,
    publisher: &dyn EventPublisher,
    notifier: &NotificationService<'_>,
    dispatcher: &WebhookDispatcher,
) -> ComplianceResult<DailyReport> {
    let mut report = DailyReport::default();

    let requests = RequestEngine::new(pool, publisher, std::env::temp_dir());
    match requests.overdue().await {
        Ok(overdue) => match notifier.notify_overdue(&overdue).await {
            Ok(outcome) => report.overdue_notified = outcome,
            Err(e) => report.errors.push(format!("notify_overdue: {e}")),
        },
        Err(e) => report.errors.push(format!("overdue query: {e}")),
    }

    let consents = ConsentManager::new(pool, publisher);
    match consents.expire_old_consents().await {
        Ok(n) => report.consents_expired = n,
        Err(e) => report.errors.push(format!("expire_old_consents: {e}")),
    }

    let restrictions = RestrictionManager::new(pool, publisher);
    match restrictions.expire_old_restrictions().await {
        Ok(n) => report.restrictions_expired = n,
        Err(e) => report.errors.push(format!("expire_old_restrictions: {e}")),
    }

    match consents.expiring_soon(CONSENT_EXPIRY_WARNING_DAYS).await {
        Ok(expiring) => {
            report.consent_expiry_notified = notifier.notify_consent_expiring(&expiring).await;
        }
        Err(e) => report.errors.push(format!("expiring_soon: {e}")),
    }

    match dispatcher.trim_logs(WEBHOOK_LOG_RETENTION_DAYS).await {
        Ok(n) => report.webhook_logs_trimmed = n,
        Err(e) => report.errors.push(format!("trim_logs: {e}")),
    }

    Ok(report)
}
