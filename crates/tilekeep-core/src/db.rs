// crates/tilekeep-core/src/db.rs

use std::future::Future;
use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use tracing::warn;

use crate::error::{PipelineError, Result};
use crate::schema;

pub type DbPool = Pool<Sqlite>;

/// Bound and pacing of the retry loop around every store operation.
#[derive(Debug, Clone, Copy)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Handle to the single store file. One connection: the store serializes
/// writers, and concurrency only ever comes from separate process invocations
/// sharing the file.
#[derive(Debug, Clone)]
pub struct Store {
    pool: DbPool,
    retry: RetrySettings,
}

impl Store {
    /// Connect and bring the schema up to the declared layout. A bootstrap
    /// failure is fatal to startup and is surfaced as such.
    pub async fn open(database_url: &str, retry: RetrySettings) -> Result<Self> {
        let pool = connect(database_url).await?;
        schema::bootstrap(&pool).await?;
        Ok(Self { pool, retry })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Run a store operation under the bounded retry discipline: any failure
    /// waits out a fixed backoff and retries, up to `max_attempts`; exhaustion
    /// raises the distinguished store-unavailable error. Applied uniformly to
    /// single-row fetches, multi-row fetches and mutations.
    pub async fn retrying<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(source) if attempt >= self.retry.max_attempts => {
                    return Err(PipelineError::StoreUnavailable {
                        attempts: attempt,
                        source,
                    });
                }
                Err(source) => {
                    warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %source,
                        "store operation failed, retrying after backoff"
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                }
            }
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Establish the SQLite connection pool for the store file.
pub async fn connect(database_url: &str) -> Result<DbPool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    Ok(pool)
}
