//! Webhook dispatcher (C8)
//!
//! Dispatch is synchronous with respect to the database — subscriptions
//! and delivery logs live in `gdpr_webhook_subscriptions`/
//! `gdpr_webhook_logs` — but owns its `PgPool` by value rather than
//! borrowing like the other managers in this crate, because
//! `dispatch_async` hands a delivery future to `tokio::spawn`, which
//! requires `'static`. `PgPool` is an `Arc`-backed handle, so cloning it
//! is cheap.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use sqlx::PgPool;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ComplianceError, ComplianceResult};
use crate::types::WebhookEvent;

type HmacSha256 = Hmac<Sha256>;

const RESPONSE_BODY_TRUNCATE_BYTES: usize = 1024;

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct WebhookSubscription {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    #[serde(skip_serializing)]
    pub secret: String,
    pub events: Vec<String>,
    pub is_active: bool,
    pub headers: serde_json::Value,
    pub retry_count: i32,
    pub timeout_seconds: i32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_triggered_at: Option<OffsetDateTime>,
    pub last_status_code: Option<i32>,
    pub failure_count: i32,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct WebhookLog {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub response_status: Option<i32>,
    pub response_body: Option<String>,
    pub attempt_number: i32,
    pub success: bool,
    pub error_message: Option<String>,
    pub duration_ms: Option<i32>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DeliveryOutcome {
    pub subscription_id: Uuid,
    pub name: String,
    pub success: bool,
    pub status_code: Option<i32>,
    pub error: Option<String>,
}

/// What every audited mutation in C3–C7 publishes through after its own
/// transaction commits. `WebhookDispatcher` is the only implementation;
/// the trait exists so request_engine/consent/restriction can depend on
/// "something that publishes events" without owning dispatch logic.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: WebhookEvent, payload: serde_json::Value);
}

#[derive(Clone)]
pub struct WebhookDispatcher {
    pool: PgPool,
    http: Client,
}

impl WebhookDispatcher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, http: Client::new() }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn subscribe(
        &self,
        name: &str,
        url: &str,
        secret: &str,
        events: Vec<String>,
        headers: Option<serde_json::Value>,
        retry_count: i32,
        timeout_seconds: i32,
    ) -> ComplianceResult<WebhookSubscription> {
        for event in &events {
            if event != "*" && WebhookEvent::from_str(event).is_err() {
                return Err(ComplianceError::InvalidArgument(format!(
                    "invalid event type: {event}"
                )));
            }
        }

        let subscription = sqlx::query_as::<_, WebhookSubscription>(
            r#"
            INSERT INTO gdpr_webhook_subscriptions (
                id, name, url, secret, events, is_active, headers,
                retry_count, timeout_seconds, failure_count
            )
            VALUES ($1, $2, $3, $4, $5, true, $6, $7, $8, 0)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(url)
        .bind(secret)
        .bind(&events)
        .bind(headers.unwrap_or_else(|| serde_json::json!({})))
        .bind(retry_count)
        .bind(timeout_seconds)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(subscription_id = %subscription.id, name, url, "webhook_subscribed");
        Ok(subscription)
    }

    pub async fn unsubscribe(&self, subscription_id: Uuid) -> ComplianceResult<()> {
        let affected = sqlx::query("DELETE FROM gdpr_webhook_subscriptions WHERE id = $1")
            .bind(subscription_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(ComplianceError::NotFound(format!(
                "subscription {subscription_id} not found"
            )));
        }
        tracing::info!(subscription_id = %subscription_id, "webhook_unsubscribed");
        Ok(())
    }

    pub async fn update_subscription(
        &self,
        subscription_id: Uuid,
        is_active: Option<bool>,
        events: Option<Vec<String>>,
        url: Option<String>,
    ) -> ComplianceResult<WebhookSubscription> {
        let subscription = sqlx::query_as::<_, WebhookSubscription>(
            r#"
            UPDATE gdpr_webhook_subscriptions
            SET is_active = COALESCE($2, is_active),
                events = COALESCE($3, events),
                url = COALESCE($4, url)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(subscription_id)
        .bind(is_active)
        .bind(events)
        .bind(url)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ComplianceError::NotFound(format!("subscription {subscription_id} not found")))?;
        Ok(subscription)
    }

    pub async fn list_subscriptions(&self) -> ComplianceResult<Vec<WebhookSubscription>> {
        let rows = sqlx::query_as::<_, WebhookSubscription>(
            "SELECT * FROM gdpr_webhook_subscriptions ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn subscriptions_for_event(&self, event: &str) -> ComplianceResult<Vec<WebhookSubscription>> {
        let rows: Vec<WebhookSubscription> = sqlx::query_as(
            "SELECT * FROM gdpr_webhook_subscriptions WHERE is_active = true",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter(|s| s.events.iter().any(|e| e == "*" || e == event))
            .collect())
    }

    /// Synchronous entry point: waits for every matching subscription's
    /// full retry loop before returning.
    pub async fn dispatch(
        &self,
        event: WebhookEvent,
        payload: serde_json::Value,
    ) -> ComplianceResult<Vec<DeliveryOutcome>> {
        let event_str = event.to_string();
        let subscriptions = self.subscriptions_for_event(&event_str).await?;
        if subscriptions.is_empty() {
            return Ok(Vec::new());
        }

        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|e| ComplianceError::Internal(e.to_string()))?;
        let envelope = serde_json::json!({
            "event": event_str,
            "timestamp": timestamp,
            "data": payload,
        });
        let body = serde_json::to_string(&envelope).map_err(|e| ComplianceError::Internal(e.to_string()))?;

        let deliveries = subscriptions
            .into_iter()
            .map(|sub| self.deliver_to_subscription(sub, event_str.clone(), envelope.clone(), body.clone()));
        let outcomes = futures::future::join_all(deliveries).await;

        let success_count = outcomes.iter().filter(|o| o.success).count();
        tracing::info!(
            event = %event_str,
            dispatched = outcomes.len(),
            success = success_count,
            "webhook_dispatch_complete"
        );
        Ok(outcomes)
    }

    /// Fire-and-forget: schedules the dispatch on the runtime and returns
    /// immediately, matching the spec's asynchronous variant.
    pub fn dispatch_async(&self, event: WebhookEvent, payload: serde_json::Value) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.dispatch(event, payload).await {
                tracing::warn!(error = %e, event = %event, "webhook dispatch failed");
            }
        });
    }

    async fn deliver_to_subscription(
        &self,
        sub: WebhookSubscription,
        event: String,
        envelope: serde_json::Value,
        body: String,
    ) -> DeliveryOutcome {
        let signature = match sign_payload(&sub.secret, &body) {
            Ok(s) => s,
            Err(e) => {
                return DeliveryOutcome {
                    subscription_id: sub.id,
                    name: sub.name,
                    success: false,
                    status_code: None,
                    error: Some(e.to_string()),
                }
            }
        };

        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| String::new());

        let mut last_error: Option<String> = None;
        let mut last_status: Option<i32> = None;

        for attempt in 1..=sub.retry_count.max(1) {
            let start = OffsetDateTime::now_utc();
            let mut request = self
                .http
                .post(&sub.url)
                .header("Content-Type", "application/json")
                .header("X-Webhook-Event", &event)
                .header("X-Webhook-Signature", format!("sha256={signature}"))
                .header("X-Webhook-Timestamp", &timestamp)
                .timeout(Duration::from_secs(sub.timeout_seconds.max(1) as u64));

            if let Some(extra) = sub.headers.as_object() {
                for (k, v) in extra {
                    if let Some(value) = v.as_str() {
                        request = request.header(k.as_str(), value);
                    }
                }
            }

            let outcome = request.body(body.clone()).send().await;
            let duration_ms = (OffsetDateTime::now_utc() - start).whole_milliseconds() as i32;

            match outcome {
                Ok(response) => {
                    let status = response.status().as_u16() as i32;
                    let success = (200..300).contains(&status);
                    let text = response.text().await.unwrap_or_default();
                    let truncated: String = text.chars().take(RESPONSE_BODY_TRUNCATE_BYTES).collect();

                    self.log_attempt(&sub, &event, &envelope, Some(status), Some(&truncated), attempt, success, None, duration_ms)
                        .await;
                    self.update_subscription_stats(sub.id, Some(status), success).await;

                    last_status = Some(status);
                    if success {
                        tracing::info!(subscription_id = %sub.id, event = %event, status, attempt, "webhook_delivered");
                        return DeliveryOutcome {
                            subscription_id: sub.id,
                            name: sub.name,
                            success: true,
                            status_code: Some(status),
                            error: None,
                        };
                    }
                    last_error = Some(format!("HTTP {status}"));
                }
                Err(e) => {
                    let message = e.to_string();
                    self.log_attempt(&sub, &event, &envelope, None, None, attempt, false, Some(&message), duration_ms)
                        .await;
                    self.update_subscription_stats(sub.id, None, false).await;
                    tracing::warn!(subscription_id = %sub.id, event = %event, attempt, error = %message, "webhook_delivery_failed");
                    last_error = Some(message);
                }
            }

            if attempt < sub.retry_count {
                tokio::time::sleep(Duration::from_secs(2u64.pow((attempt - 1) as u32))).await;
            }
        }

        DeliveryOutcome {
            subscription_id: sub.id,
            name: sub.name,
            success: false,
            status_code: last_status,
            error: last_error,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn log_attempt(
        &self,
        sub: &WebhookSubscription,
        event: &str,
        envelope: &serde_json::Value,
        response_status: Option<i32>,
        response_body: Option<&str>,
        attempt_number: i32,
        success: bool,
        error_message: Option<&str>,
        duration_ms: i32,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO gdpr_webhook_logs (
                id, subscription_id, event_type, payload, response_status,
                response_body, attempt_number, success, error_message, duration_ms, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(sub.id)
        .bind(event)
        .bind(envelope)
        .bind(response_status)
        .bind(response_body)
        .bind(attempt_number)
        .bind(success)
        .bind(error_message)
        .bind(duration_ms)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::error!(subscription_id = %sub.id, error = %e, "failed to write webhook delivery log");
        }
    }

    async fn update_subscription_stats(&self, subscription_id: Uuid, status: Option<i32>, success: bool) {
        let result = sqlx::query(
            r#"
            UPDATE gdpr_webhook_subscriptions
            SET last_triggered_at = NOW(),
                last_status_code = COALESCE($2, last_status_code),
                failure_count = CASE WHEN $3 THEN 0 ELSE failure_count + 1 END
            WHERE id = $1
            "#,
        )
        .bind(subscription_id)
        .bind(status)
        .bind(success)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::error!(subscription_id = %subscription_id, error = %e, "failed to update webhook subscription stats");
        }
    }

    pub async fn get_delivery_logs(
        &self,
        subscription_id: Option<Uuid>,
        event_type: Option<&str>,
        limit: i64,
    ) -> ComplianceResult<Vec<WebhookLog>> {
        let rows = sqlx::query_as::<_, WebhookLog>(
            r#"
            SELECT * FROM gdpr_webhook_logs
            WHERE ($1::uuid IS NULL OR subscription_id = $1)
              AND ($2::text IS NULL OR event_type = $2)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(subscription_id)
        .bind(event_type)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Daily-scheduler step 5: trims delivery logs older than `days`.
    pub async fn trim_logs(&self, days: i64) -> ComplianceResult<i64> {
        let affected = sqlx::query(
            "DELETE FROM gdpr_webhook_logs WHERE created_at < NOW() - ($1 || ' days')::INTERVAL",
        )
        .bind(days)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected as i64)
    }
}

#[async_trait]
impl EventPublisher for WebhookDispatcher {
    async fn publish(&self, event: WebhookEvent, payload: serde_json::Value) {
        self.dispatch_async(event, payload);
    }
}

fn sign_payload(secret: &str, body: &str) -> ComplianceResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ComplianceError::Internal("hmac initialization failed".to_string()))?;
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;

    #[test]
    fn sign_payload_is_deterministic() {
        let a = sign_payload("secret", "body").unwrap();
        let b = sign_payload("secret", "body").unwrap();
        assert_eq!(a, b);
        let c = sign_payload("other-secret", "body").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn sign_payload_is_full_32_byte_digest_hex_encoded() {
        let sig = sign_payload("secret", "body").unwrap();
        assert_eq!(sig.len(), 64, "unlike API key signing, webhook signatures are not truncated");
    }
}
