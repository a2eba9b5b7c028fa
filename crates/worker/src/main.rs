//! Background worker running the GDPR compliance engine's scheduled jobs:
//! the daily sweep (C10), standalone retention cleanup (C6), and export
//! file garbage collection (C4), each on its own `tokio-cron-scheduler`
//! cron job so one job's failure or runtime never blocks the others.

use std::sync::Arc;

use plexmcp_compliance::notification::{NotificationService, ResendConfig, ResendEmailSender};
use plexmcp_compliance::retention::RetentionManager;
use plexmcp_compliance::scheduler::run_daily;
use plexmcp_compliance::webhooks::WebhookDispatcher;
use plexmcp_shared::{create_pool, run_migrations};
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler};

/// Export files older than this are garbage-collected, mirroring the
/// original's default retention window for generated exports.
const EXPORT_FILE_RETENTION_DAYS: u64 = 7;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL is required"))?;
    let export_dir =
        std::env::var("GDPR_EXPORT_DIR").unwrap_or_else(|_| "/tmp/gdpr-exports".to_string());

    let pool = create_pool(&database_url).await?;
    run_migrations(&pool).await?;

    let dispatcher = Arc::new(WebhookDispatcher::new(pool.clone()));
    let resend_config = Arc::new(ResendConfig::from_env());
    let email_sender = Arc::new(ResendEmailSender::new((*resend_config).clone()));

    let scheduler = JobScheduler::new().await?;

    scheduler
        .add(daily_sweep_job(
            pool.clone(),
            dispatcher.clone(),
            email_sender.clone(),
            resend_config.clone(),
        )?)
        .await?;
    scheduler
        .add(retention_cleanup_job(pool.clone(), dispatcher.clone())?)
        .await?;
    scheduler
        .add(export_cleanup_job(pool.clone(), dispatcher.clone(), export_dir)?)
        .await?;

    scheduler.start().await?;
    tracing::info!("gdpr compliance worker started");

    // Park the process; the scheduler drives everything from here.
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, stopping worker");

    Ok(())
}

/// Runs the C10 daily sweep at 03:00 UTC: overdue-request notifications,
/// consent/restriction expiry, and webhook log trimming.
fn daily_sweep_job(
    pool: PgPool,
    dispatcher: Arc<WebhookDispatcher>,
    email_sender: Arc<ResendEmailSender>,
    resend_config: Arc<ResendConfig>,
) -> Result<Job, tokio_cron_scheduler::JobSchedulerError> {
    Job::new_async("0 0 3 * * *", move |_uuid, _lock| {
        let pool = pool.clone();
        let dispatcher = dispatcher.clone();
        let email_sender = email_sender.clone();
        let resend_config = resend_config.clone();
        Box::pin(async move {
            let notifier = NotificationService::new(email_sender.as_ref(), &resend_config);
            match run_daily(&pool, dispatcher.as_ref(), &notifier, dispatcher.as_ref()).await {
                Ok(report) => tracing::info!(?report, "gdpr_daily_sweep_complete"),
                Err(e) => tracing::error!(error = %e, "gdpr_daily_sweep_failed"),
            }
        })
    })
}

/// Runs C6 retention policies independently of the daily sweep, on a
/// coarser hourly cadence, so a slow policy doesn't delay C10's
/// notification steps.
fn retention_cleanup_job(
    pool: PgPool,
    dispatcher: Arc<WebhookDispatcher>,
) -> Result<Job, tokio_cron_scheduler::JobSchedulerError> {
    Job::new_async("0 0 * * * *", move |_uuid, _lock| {
        let pool = pool.clone();
        let dispatcher = dispatcher.clone();
        Box::pin(async move {
            let manager = RetentionManager::new(&pool, dispatcher.as_ref());
            match manager.run_cleanup(false).await {
                Ok(outcomes) => tracing::info!(?outcomes, "gdpr_retention_cleanup_complete"),
                Err(e) => tracing::error!(error = %e, "gdpr_retention_cleanup_failed"),
            }
        })
    })
}

/// Garbage-collects generated export files older than
/// [`EXPORT_FILE_RETENTION_DAYS`] once a day. The cleanup itself only
/// touches the filesystem; the pool/dispatcher are carried along purely
/// to construct a [`DataOperator`](plexmcp_compliance::data_operator::DataOperator).
fn export_cleanup_job(
    pool: PgPool,
    dispatcher: Arc<WebhookDispatcher>,
    export_dir: String,
) -> Result<Job, tokio_cron_scheduler::JobSchedulerError> {
    Job::new_async("0 30 3 * * *", move |_uuid, _lock| {
        let pool = pool.clone();
        let dispatcher = dispatcher.clone();
        let export_dir = export_dir.clone();
        Box::pin(async move {
            let operator = plexmcp_compliance::data_operator::DataOperator::new(
                &pool,
                dispatcher.as_ref(),
                export_dir,
            );
            match operator.cleanup_old_exports(EXPORT_FILE_RETENTION_DAYS) {
                Ok(removed) => tracing::info!(removed, "gdpr_export_cleanup_complete"),
                Err(e) => tracing::error!(error = %e, "gdpr_export_cleanup_failed"),
            }
        })
    })
}
