//! # Opening the Store Database
//!
//! One SQLite file per till. The register opens it once at startup and hands
//! clones of [`Database`] to every command.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  DbConfig::new("till.db")          DbConfig::in_memory()                │
//! │       │  WAL, busy timeout              │  one pinned connection        │
//! │       └──────────────┬──────────────────┘                               │
//! │                      ▼                                                  │
//! │           Database::new(config).await                                   │
//! │                      │  foreign_keys = ON, migrations applied           │
//! │                      ▼                                                  │
//! │   products()   customers()   sales()   refund_log()                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A sale commit and a shell lookup may overlap (the seed tool can also run
//! against a live file), so file databases use WAL and wait on a busy lock
//! instead of failing. An in-memory database lives only as long as its single
//! connection, so that connection is never recycled.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::customer::CustomerRepository;
use crate::repository::product::ProductRepository;
use crate::repository::refund_log::RefundLogRepository;
use crate::repository::sale::SaleRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbLocation {
    /// A file on disk, created on first open.
    File(PathBuf),
    /// A private in-memory database, gone when the pool closes.
    Memory,
}

/// How to open the store database.
///
/// ```rust,ignore
/// let db = Database::new(DbConfig::new("till.db").with_max_connections(2)).await?;
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub location: DbLocation,

    /// Pool size. A single register rarely needs more than a handful.
    pub max_connections: u32,

    /// How long a writer waits on a locked database before giving up.
    pub busy_timeout: Duration,

    /// Apply embedded migrations while opening.
    pub migrate: bool,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            location: DbLocation::File(path.into()),
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
            migrate: true,
        }
    }

    /// Fresh empty database for tests.
    pub fn in_memory() -> Self {
        DbConfig {
            location: DbLocation::Memory,
            max_connections: 1,
            busy_timeout: Duration::from_secs(1),
            migrate: true,
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Opens without touching the schema.
    pub fn without_migrations(mut self) -> Self {
        self.migrate = false;
        self
    }

    pub fn is_memory(&self) -> bool {
        self.location == DbLocation::Memory
    }

    /// The file path, if this is a file database.
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            DbLocation::File(path) => Some(path),
            DbLocation::Memory => None,
        }
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let options = match &self.location {
            DbLocation::File(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal),
            DbLocation::Memory => SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?,
        };
        Ok(options
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(self.busy_timeout)
            // Off by default in SQLite; sale_lines and refund_log rely on them.
            .foreign_keys(true))
    }
}

// =============================================================================
// Database
// =============================================================================

/// Handle to the store database. Clones share one pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (and, unless disabled, migrates) the database.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        match config.path() {
            Some(path) => info!(path = %path.display(), "Opening store database"),
            None => info!("Opening in-memory store database"),
        }

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .acquire_timeout(config.busy_timeout * 2);
        if config.is_memory() {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(config.connect_options()?)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
        debug!(max_connections = config.max_connections, "Pool ready");

        let db = Database { pool };
        if config.migrate {
            migrations::run_migrations(&db.pool).await?;
        }
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    pub fn customers(&self) -> CustomerRepository {
        CustomerRepository::new(self.pool.clone())
    }

    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.pool.clone())
    }

    pub fn refund_log(&self) -> RefundLogRepository {
        RefundLogRepository::new(self.pool.clone())
    }

    /// Waits for in-flight queries, then closes every connection.
    pub async fn close(&self) {
        debug!("Closing store database");
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_database_starts_empty() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);
        assert_eq!(db.products().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("till.db");

        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        db.close().await;
        assert!(path.exists());

        // Schema already present; opening without migrations still works.
        let reopened = Database::new(DbConfig::new(&path).without_migrations())
            .await
            .unwrap();
        assert!(reopened.health_check().await);
        assert_eq!(reopened.products().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_closed_database_fails_checks() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;
        assert!(!db.health_check().await);
    }

    #[test]
    fn test_config_shape() {
        let config = DbConfig::new("/tmp/till.db")
            .with_max_connections(0)
            .with_busy_timeout(Duration::from_millis(250));
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert_eq!(config.path(), Some(Path::new("/tmp/till.db")));
        assert!(config.migrate);

        let memory = DbConfig::in_memory();
        assert!(memory.is_memory());
        assert_eq!(memory.path(), None);
    }
}
