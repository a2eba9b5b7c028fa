//! Shared application state threaded through every axum handler.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use plexmcp_compliance::notification::{NotificationService, ResendConfig, ResendEmailSender};
use plexmcp_compliance::webhooks::WebhookDispatcher;

/// Cloned into every request; cheap because the expensive bits
/// (`PgPool`, `WebhookDispatcher`) are themselves internally `Arc`-backed
/// connection pools / clients.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub dispatcher: Arc<WebhookDispatcher>,
    pub email_sender: Arc<ResendEmailSender>,
    pub resend_config: Arc<ResendConfig>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let dispatcher = WebhookDispatcher::new(pool.clone());
        let resend_config = config.resend_config();
        let email_sender = ResendEmailSender::new(resend_config.clone());
        Self {
            pool,
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
            email_sender: Arc::new(email_sender),
            resend_config: Arc::new(resend_config),
        }
    }

    /// Builds a [`NotificationService`] borrowing this state's sender for the
    /// duration of one call.
    pub fn notifier(&self) -> NotificationService<'_> {
        NotificationService::new(self.email_sender.as_ref(), &self.resend_config)
    }
}
