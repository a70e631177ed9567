//! Database layer for RFID Flow
//!
//! This crate is the single source of truth for cylinder state. The HTTP
//! server and the CLI both go through [`RfidFlowDb`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use rfidflow_db::{DbOptions, NewReading, RfidFlowDb, Result};
//!
//! let db = RfidFlowDb::open("rfidflow.sqlite3", DbOptions::default()).await?;
//!
//! // Scan ingestion: registry upsert, reading, rotation step, audit entry
//! let outcome = db.ingest_reading(NewReading::new("E2001234")).await?;
//!
//! // Administration
//! db.soft_delete_asset(outcome.asset.id, Some("admin"), "scrapped").await?;
//! ```

mod error;
mod schema;
mod types;

// Method implementations organized by domain
mod assets;
mod audit;
mod readings;
mod registry;
mod stats;

pub mod lock;
pub mod metrics;
pub mod rotation;

pub use audit::NewAuditEntry;
pub use error::{DbError, Result};
pub use lock::{AssetLockGuard, AssetLocks};
pub use metrics::{MetricsSnapshot, METRICS};
pub use registry::normalize_tag;
pub use types::*;

use chrono::NaiveDate;
use chrono_tz::Tz;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Tunables for the database handle.
#[derive(Debug, Clone)]
pub struct DbOptions {
    /// Maximum pooled SQLite connections
    pub max_connections: u32,
    /// How long SQLite itself retries a busy database file
    pub busy_timeout: Duration,
    /// Bound on waiting for a per-asset lock; `None` waits forever
    pub lock_wait: Option<Duration>,
    /// Timezone that defines "today" for fill dates and daily counts
    pub timezone: Tz,
    pub stations: DistributorStations,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
            lock_wait: Some(Duration::from_secs(5)),
            timezone: chrono_tz::America::Sao_Paulo,
            stations: DistributorStations::default(),
        }
    }
}

/// Database handle for all RFID Flow operations.
///
/// Cheap to clone; clones share the pool and the per-asset lock table.
#[derive(Clone)]
pub struct RfidFlowDb {
    pool: SqlitePool,
    locks: Arc<AssetLocks>,
    options: Arc<DbOptions>,
}

impl std::fmt::Debug for RfidFlowDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RfidFlowDb")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl RfidFlowDb {
    /// Open or create a database at the given path.
    ///
    /// Creates all tables if they don't exist.
    pub async fn open(path: impl AsRef<Path>, options: DbOptions) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let connect = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(options.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections.max(1))
            .connect_with(connect)
            .await?;

        let db = Self::from_pool(pool, options);
        db.ensure_schema().await?;

        info!(path = %path.display(), "Database opened");

        Ok(db)
    }

    /// Open a private in-memory database (for tests and dry runs).
    ///
    /// Uses a single connection, since every SQLite memory connection is its own database.
    pub async fn open_memory(options: DbOptions) -> Result<Self> {
        let connect = SqliteConnectOptions::from_str("sqlite::memory:")?
            .foreign_keys(true)
            .busy_timeout(options.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect)
            .await?;

        let db = Self::from_pool(pool, options);
        db.ensure_schema().await?;
        Ok(db)
    }

    fn from_pool(pool: SqlitePool, options: DbOptions) -> Self {
        Self {
            pool,
            locks: Arc::new(AssetLocks::new()),
            options: Arc::new(options),
        }
    }

    /// Get the underlying connection pool (escape hatch for complex queries).
    ///
    /// Prefer using the typed methods instead.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn options(&self) -> &DbOptions {
        &self.options
    }

    /// Per-asset lock table used by rotation steps.
    pub fn locks(&self) -> &AssetLocks {
        &self.locks
    }

    /// Today's date in the configured timezone.
    pub fn today(&self) -> NaiveDate {
        chrono::Utc::now()
            .with_timezone(&self.options.timezone)
            .date_naive()
    }

    /// Close the database connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

// Timestamp utilities
impl RfidFlowDb {
    /// Current time as milliseconds since Unix epoch.
    pub fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Convert milliseconds to DateTime.
    pub fn millis_to_datetime(millis: i64) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(millis).unwrap_or_else(chrono::Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_database() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("nested").join("test.db");

        let db = RfidFlowDb::open(&db_path, DbOptions::default()).await.unwrap();
        assert!(db_path.exists());

        db.close().await;
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("test.db");

        let db = RfidFlowDb::open(&db_path, DbOptions::default()).await.unwrap();
        db.ingest_reading(NewReading::new("E200AA")).await.unwrap();
        db.close().await;

        let db = RfidFlowDb::open(&db_path, DbOptions::default()).await.unwrap();
        let asset = db.find_asset_by_tag("E200AA").await.unwrap().unwrap();
        assert_eq!(asset.reading_count, 1);
    }

    #[test]
    fn test_millis_roundtrip() {
        let now = RfidFlowDb::now_millis();
        assert_eq!(RfidFlowDb::millis_to_datetime(now).timestamp_millis(), now);
    }
}
