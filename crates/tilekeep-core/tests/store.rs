mod support;

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tilekeep_core::db::{self, RetrySettings, Store};
use tilekeep_core::error::PipelineError;

#[tokio::test]
async fn bootstrap_is_idempotent_across_restarts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("store.db").display()
    );

    let store = Store::open(&url, RetrySettings::default())
        .await
        .expect("first open");
    sqlx::query("INSERT INTO tiles (platform, product_id, status) VALUES ('Sentinel-2', 'P1', 'pending')")
        .execute(store.pool())
        .await
        .expect("insert");
    store.close().await;

    // Second startup must re-run the bootstrap without touching existing data.
    let store = Store::open(&url, RetrySettings::default())
        .await
        .expect("second open");
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tiles")
        .fetch_one(store.pool())
        .await
        .expect("count");
    assert_eq!(count, 1);
    store.close().await;
}

#[tokio::test]
async fn bootstrap_adds_missing_columns_to_existing_tables() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("store.db").display()
    );

    // An older store revision that predates most tile columns.
    let pool = db::connect(&url).await.expect("connect");
    sqlx::query("CREATE TABLE tiles (id INTEGER PRIMARY KEY, platform TEXT, product_id TEXT)")
        .execute(&pool)
        .await
        .expect("create legacy table");
    pool.close().await;

    let store = Store::open(&url, RetrySettings::default())
        .await
        .expect("open upgrades schema");
    sqlx::query("INSERT INTO tiles (platform, product_id) VALUES ('Sentinel-2', 'P1')")
        .execute(store.pool())
        .await
        .expect("insert into upgraded table");
    let status: String = sqlx::query_scalar("SELECT status FROM tiles WHERE product_id = 'P1'")
        .fetch_one(store.pool())
        .await
        .expect("added status column is usable");
    assert_eq!(status, "pending");
    store.close().await;
}

#[tokio::test]
async fn retry_exhaustion_raises_store_unavailable_after_max_attempts() {
    let store = support::memory_store().await; // max_attempts = 3
    store.pool().close().await;

    let attempts = AtomicU32::new(0);
    let result: Result<(), PipelineError> = store
        .retrying(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            let pool = store.pool().clone();
            async move { sqlx::query("SELECT 1").execute(&pool).await.map(|_| ()) }
        })
        .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    match result {
        Err(PipelineError::StoreUnavailable { attempts: 3, .. }) => {}
        other => panic!("expected store-unavailable error, got {:?}", other),
    }
}

#[tokio::test]
async fn retrying_recovers_from_transient_failures() {
    let store = support::memory_store().await;

    let attempts = AtomicU32::new(0);
    let value = store
        .retrying(|| {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(sqlx::Error::PoolTimedOut)
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .expect("third attempt succeeds");

    assert_eq!(value, 2);
}

#[tokio::test]
async fn retry_settings_default_bounds() {
    let settings = RetrySettings::default();
    assert_eq!(settings.max_attempts, 5);
    assert_eq!(settings.backoff, Duration::from_millis(200));
}
