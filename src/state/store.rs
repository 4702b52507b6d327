//! Shared SQLite store.
//!
//! Every process of a deployment opens the same database file; this type is
//! the only code that touches it. WAL mode lets readers run alongside the
//! single writer, and the busy timeout bounds how long any statement waits
//! on the database lock.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::errors::{is_transient, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS data_items (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS metrics (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    requests INTEGER NOT NULL DEFAULT 0,
    last_access INTEGER,
    uptime_started_at INTEGER NOT NULL
);
"#;

/// A stored key with its timestamps.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Record {
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Point-in-time read of the request metrics.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub last_access: Option<DateTime<Utc>>,
    pub uptime_started_at: DateTime<Utc>,
}

impl MetricsSnapshot {
    /// Placeholder returned when the metrics row cannot be read.
    pub fn zero() -> Self {
        Self {
            requests: 0,
            last_access: None,
            uptime_started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub lock_timeout: Duration,
    pub write_attempts: u32,
    pub retry_backoff: Duration,
    pub max_connections: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

impl From<&StoreConfig> for StoreOptions {
    fn from(cfg: &StoreConfig) -> Self {
        Self {
            lock_timeout: cfg.lock_timeout(),
            write_attempts: cfg.write_attempts.max(1),
            retry_backoff: cfg.retry_backoff(),
            max_connections: cfg.max_connections.max(1),
        }
    }
}

/// Handle to the shared store. Cheap to clone; clones share one pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    options: StoreOptions,
}

impl Store {
    /// Open (creating if needed) the database at `path` and make sure the
    /// schema and the metrics row exist.
    pub async fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!("Opening store at {}", path.display());

        let connect = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(options.lock_timeout);

        // Switching a brand-new file to WAL can report BUSY straight away when
        // other processes are opening it at the same moment.
        let pool = retry_transient(&options, "open", || {
            SqlitePoolOptions::new()
                .max_connections(options.max_connections)
                .acquire_timeout(options.lock_timeout)
                .connect_with(connect.clone())
        })
        .await
        .map_err(|err| match err {
            StoreError::Database(err) => StoreError::Unavailable(err.to_string()),
            other => other,
        })?;

        let store = Self { pool, options };
        store.init_schema().await?;
        store.ensure_metrics_row().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        let pool = &self.pool;
        self.with_retry("init_schema", move || async move {
            sqlx::query(SCHEMA).execute(pool).await
        })
        .await?;

        debug!("store schema initialized");
        Ok(())
    }

    /// Insert the metrics singleton unless some process already did.
    ///
    /// The row's primary key is pinned to 1, so racing initializers collapse
    /// onto one row and the first writer's `uptime_started_at` wins.
    async fn ensure_metrics_row(&self) -> Result<(), StoreError> {
        let pool = &self.pool;
        let inserted = self
            .with_retry("ensure_metrics_row", move || async move {
                sqlx::query(
                    "INSERT OR IGNORE INTO metrics (id, requests, last_access, uptime_started_at) \
                     VALUES (1, 0, NULL, ?)",
                )
                .bind(now_millis())
                .execute(pool)
                .await
            })
            .await?
            .rows_affected();

        if inserted == 1 {
            info!("Initialized metrics");
        } else {
            debug!("metrics already initialized by another process");
        }
        Ok(())
    }

    /// Every key and value, ordered by key.
    ///
    /// Counts as one request in the metrics. If the records cannot be read
    /// the result is empty rather than an error.
    pub async fn get_all(&self) -> BTreeMap<String, String> {
        match self.snapshot().await {
            Ok(data) => {
                self.record_access().await;
                data
            }
            Err(err) => {
                warn!("Failed to read records, returning empty snapshot: {err}");
                BTreeMap::new()
            }
        }
    }

    async fn snapshot(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM data_items ORDER BY key")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().collect())
    }

    /// Bump the request counter. Failures are logged and dropped.
    async fn record_access(&self) {
        match self.bump_requests().await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Metrics row missing, recreating it");
                let healed = match self.ensure_metrics_row().await {
                    Ok(()) => self.bump_requests().await,
                    Err(err) => Err(err),
                };
                if let Err(err) = healed {
                    warn!("Failed to update request metrics: {err}");
                }
            }
            Err(err) => warn!("Failed to update request metrics: {err}"),
        }
    }

    async fn bump_requests(&self) -> Result<bool, StoreError> {
        let done = sqlx::query(
            "UPDATE metrics SET requests = requests + 1, last_access = ? WHERE id = 1",
        )
        .bind(now_millis())
        .execute(&self.pool)
        .await?;

        Ok(done.rows_affected() == 1)
    }

    /// Create or overwrite `key`.
    ///
    /// Lock contention is retried with a growing pause; once the attempt
    /// budget is spent the write fails without having been applied.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let pool = &self.pool;
        self.with_retry("set", move || async move {
            let now = now_millis();
            sqlx::query(
                r#"
                INSERT INTO data_items (key, value, created_at, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = MAX(data_items.created_at, excluded.updated_at)
                "#,
            )
            .bind(key)
            .bind(value)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await
        })
        .await?;

        debug!(key, "record stored");
        Ok(())
    }

    /// Fetch a single record with its timestamps.
    pub async fn get(&self, key: &str) -> Result<Option<Record>, StoreError> {
        let row: Option<(String, String, i64, i64)> = sqlx::query_as(
            "SELECT key, value, created_at, updated_at FROM data_items WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(key, value, created_at, updated_at)| Record {
            key,
            value,
            created_at: from_millis(created_at),
            updated_at: from_millis(updated_at),
        }))
    }

    /// Delete every record. Metrics are left alone.
    pub async fn reset(&self) -> Result<(), StoreError> {
        let pool = &self.pool;
        let removed = self
            .with_retry("reset", move || async move {
                sqlx::query("DELETE FROM data_items").execute(pool).await
            })
            .await?
            .rows_affected();

        info!("Reset store: removed {} records", removed);
        Ok(())
    }

    /// Number of stored records. Does not count as a request.
    pub async fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM data_items")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    /// Current metrics. Never fails: a missing row is recreated, and an
    /// unreadable one yields [`MetricsSnapshot::zero`].
    pub async fn get_metrics(&self) -> MetricsSnapshot {
        match self.read_metrics().await {
            Ok(Some(metrics)) => metrics,
            Ok(None) => {
                warn!("Metrics row missing, recreating it");
                if let Err(err) = self.ensure_metrics_row().await {
                    warn!("Failed to recreate metrics row: {err}");
                }
                self.read_metrics()
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_else(MetricsSnapshot::zero)
            }
            Err(err) => {
                warn!("Failed to read metrics: {err}");
                MetricsSnapshot::zero()
            }
        }
    }

    async fn read_metrics(&self) -> Result<Option<MetricsSnapshot>, StoreError> {
        let row: Option<(i64, Option<i64>, i64)> = sqlx::query_as(
            "SELECT requests, last_access, uptime_started_at FROM metrics WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(requests, last_access, started)| MetricsSnapshot {
            requests: requests.max(0) as u64,
            last_access: last_access.map(from_millis),
            uptime_started_at: from_millis(started),
        }))
    }

    /// Cheap round trip used by the readiness probe.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        attempt_fn: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        retry_transient(&self.options, operation, attempt_fn).await
    }
}

/// Run `attempt_fn` until it succeeds, fails for a non-transient reason, or
/// the attempt budget is spent. The pause grows linearly between attempts.
async fn retry_transient<T, F, Fut>(
    options: &StoreOptions,
    operation: &'static str,
    mut attempt_fn: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let attempts = options.write_attempts.max(1);
    let mut attempt = 1;

    loop {
        match attempt_fn().await {
            Ok(value) => return Ok(value),
            Err(err) if is_transient(&err) && attempt < attempts => {
                warn!(operation, attempt, "store busy, retrying: {err}");
                tokio::time::sleep(options.retry_backoff * attempt).await;
                attempt += 1;
            }
            Err(err) if is_transient(&err) => {
                return Err(StoreError::RetriesExhausted {
                    operation,
                    attempts,
                    source: err,
                })
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
