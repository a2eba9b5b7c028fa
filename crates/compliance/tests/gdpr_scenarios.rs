//! End-to-end scenarios against a real Postgres database.
//!
//! Mirrors `shared::db`'s own test: `#[ignore]` by default, run explicitly
//! with `DATABASE_URL` pointed at a disposable database and
//! `cargo test -- --ignored`. Each test picks a unique subject email so
//! they can run concurrently against the same database.

use std::str::FromStr;

use plexmcp_compliance::consent::ConsentManager;
use plexmcp_compliance::data_operator::DataOperator;
use plexmcp_compliance::request_engine::RequestEngine;
use plexmcp_compliance::retention::RetentionManager;
use plexmcp_compliance::types::{ConsentStatus, ConsentType, RequestType};
use plexmcp_compliance::webhooks::WebhookDispatcher;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required for ignored tests");
    let options = PgConnectOptions::from_str(&url).expect("invalid DATABASE_URL");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .expect("failed to connect to test database");
    sqlx::migrate!("../../migrations").run(&pool).await.expect("failed to run migrations");
    pool
}

fn unique_email(prefix: &str) -> String {
    format!("{prefix}-{}@example.test", uuid::Uuid::new_v4())
}

#[tokio::test]
#[ignore] // Requires database
async fn s1_consent_cycle_expires_and_audits() {
    let pool = test_pool().await;
    let dispatcher = WebhookDispatcher::new(pool.clone());
    let manager = ConsentManager::new(&pool, &dispatcher);
    let email = unique_email("s1");

    let consent = manager
        .grant_consent(&email, ConsentType::Marketing, Some(1), None, None, None, None)
        .await
        .expect("grant should succeed");
    assert_eq!(consent.status, ConsentStatus::Granted);

    // Simulate "advance the clock 2 days" by backdating expires_at rather
    // than waiting in real time.
    sqlx::query("UPDATE gdpr_consents SET expires_at = NOW() - INTERVAL '1 day' WHERE id = $1")
        .bind(consent.id)
        .execute(&pool)
        .await
        .unwrap();

    let expired_count = manager.expire_old_consents().await.unwrap();
    assert_eq!(expired_count, 1);

    let has_consent = manager
        .has_valid_consent(&email, ConsentType::Marketing)
        .await
        .unwrap();
    assert!(!has_consent);

    let row: (String,) = sqlx::query_as("SELECT status FROM gdpr_consents WHERE id = $1")
        .bind(consent.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row.0, "expired");

    let audit_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM gdpr_audit_log WHERE action = 'consent_expired' AND subject_email = $1",
    )
    .bind(email.to_lowercase())
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(audit_count, 1);
}

#[tokio::test]
#[ignore] // Requires database
async fn s2_export_json_covers_every_seeded_table() {
    let pool = test_pool().await;
    let dispatcher = WebhookDispatcher::new(pool.clone());
    let email = unique_email("s2");
    seed_personal_data(&pool, &email).await;

    let export_dir = std::env::temp_dir().join(format!("gdpr-export-test-{}", uuid::Uuid::new_v4()));
    let operator = DataOperator::new(&pool, &dispatcher, export_dir.clone());

    let result = operator.export_data(&email, "json", None, None).await.unwrap();

    assert_eq!(result.total_records, 3);
    assert_eq!(
        result.tables_exported,
        vec!["users".to_string(), "leads".to_string(), "reviews".to_string()]
    );
    assert!(std::path::Path::new(&result.file_path).exists());

    let _ = std::fs::remove_dir_all(&export_dir);
}

#[tokio::test]
#[ignore] // Requires database
async fn s3_erasure_deletes_and_anonymizes_then_export_is_empty() {
    let pool = test_pool().await;
    let dispatcher = WebhookDispatcher::new(pool.clone());
    let email = unique_email("s3");
    seed_personal_data(&pool, &email).await;

    let export_dir = std::env::temp_dir().join(format!("gdpr-erasure-test-{}", uuid::Uuid::new_v4()));
    let operator = DataOperator::new(&pool, &dispatcher, export_dir.clone());

    let erasure = operator.erase_data(&email, false, None, None).await.unwrap();
    assert_eq!(erasure.total_records, 3);
    assert_eq!(*erasure.per_table.get("users").unwrap(), 1);
    assert_eq!(*erasure.per_table.get("leads").unwrap(), 1);
    assert_eq!(*erasure.per_table.get("reviews").unwrap(), 1);

    let review: (Option<String>, Option<String>) =
        sqlx::query_as("SELECT author_name, author_url FROM reviews WHERE author_name = 'Anonymous User'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(review.0.as_deref(), Some("Anonymous User"));
    assert!(review.1.is_none());

    let after = operator.export_data(&email, "json", None, None).await.unwrap();
    assert_eq!(after.total_records, 0);

    let _ = std::fs::remove_dir_all(&export_dir);
}

#[tokio::test]
#[ignore] // Requires database
async fn s4_request_deadline_is_30_days_and_goes_overdue() {
    let pool = test_pool().await;
    let dispatcher = WebhookDispatcher::new(pool.clone());
    let export_dir = std::env::temp_dir().join(format!("gdpr-request-test-{}", uuid::Uuid::new_v4()));
    let engine = RequestEngine::new(&pool, &dispatcher, export_dir);
    let email = unique_email("s4");

    let request = engine.create(&email, RequestType::DataExport, None, None).await.unwrap();
    let fetched = engine.get(request.id).await.unwrap();
    assert!(!fetched.is_overdue());
    // `days_remaining` floors the delta to whole days (see
    // `request_engine.rs`'s own unit test): immediately after `create` the
    // delta is just under 30 days, so this reads 29, not 30.
    assert_eq!(fetched.days_remaining(), 29);

    sqlx::query("UPDATE gdpr_requests SET deadline_at = NOW() - INTERVAL '1 day' WHERE id = $1")
        .bind(request.id)
        .execute(&pool)
        .await
        .unwrap();

    let overdue = engine.overdue().await.unwrap();
    assert!(overdue.iter().any(|r| r.id == request.id));

    let refetched = engine.get(request.id).await.unwrap();
    assert_eq!(refetched.days_remaining(), 0);
}

#[tokio::test]
#[ignore] // Requires database
async fn s5_webhook_dispatch_signs_with_hmac_sha256() {
    let pool = test_pool().await;
    let dispatcher = WebhookDispatcher::new(pool.clone());

    let subscription = dispatcher
        .subscribe("catch-all", "https://example.test/hook", "shh", vec!["*".to_string()], None, 3, 10)
        .await
        .unwrap();

    dispatcher
        .dispatch(
            plexmcp_compliance::types::WebhookEvent::ConsentGranted,
            serde_json::json!({ "subject_email": "a@b.co" }),
        )
        .await
        .unwrap();

    let logs = dispatcher.get_delivery_logs(Some(subscription.id), None, 10).await.unwrap();
    assert_eq!(logs.len(), 1);
    // Delivery itself fails against a non-routable host; the log row still
    // proves the dispatcher attempted the HMAC-signed POST against this
    // subscription.
    assert_eq!(logs[0].subscription_id, subscription.id);

    dispatcher.unsubscribe(subscription.id).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires database
async fn s6_retention_cleanup_deletes_past_window_rows_only() {
    let pool = test_pool().await;
    let dispatcher = WebhookDispatcher::new(pool.clone());
    let manager = RetentionManager::new(&pool, &dispatcher);

    sqlx::query(
        "INSERT INTO data_retention_policies (table_name, retention_days, action) \
         VALUES ('users', 30, 'delete') ON CONFLICT (table_name) DO NOTHING",
    )
    .execute(&pool)
    .await
    .unwrap();

    for _ in 0..5 {
        sqlx::query(
            "INSERT INTO users (email, created_at) VALUES ($1, NOW() - INTERVAL '40 days')",
        )
        .bind(unique_email("s6-old"))
        .execute(&pool)
        .await
        .unwrap();
    }
    for _ in 0..3 {
        sqlx::query(
            "INSERT INTO users (email, created_at) VALUES ($1, NOW() - INTERVAL '10 days')",
        )
        .bind(unique_email("s6-recent"))
        .execute(&pool)
        .await
        .unwrap();
    }

    let preview = manager.run_cleanup(true).await.unwrap();
    let users_preview = preview.iter().find(|o| o.table_name == "users").unwrap();
    assert_eq!(users_preview.rows_affected, 5);

    let outcomes = manager.run_cleanup(false).await.unwrap();
    let users_outcome = outcomes.iter().find(|o| o.table_name == "users").unwrap();
    assert_eq!(users_outcome.rows_affected, 5);

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email LIKE 's6-%'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, 3);

    let audit_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM gdpr_audit_log WHERE action = 'retention_cleanup' AND affected_records_count = 5",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(audit_count >= 1);
}

async fn seed_personal_data(pool: &PgPool, email: &str) {
    sqlx::query("INSERT INTO users (email, name) VALUES ($1, 'Export Subject')")
        .bind(email)
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO leads (email, name) VALUES ($1, 'Export Subject Lead')")
        .bind(email)
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO reviews (author_name, author_url, rating, body) VALUES ($1, 'https://example.test/u', 5, 'great')")
        .bind(email)
        .execute(pool)
        .await
        .unwrap();
}
