//! Local SQLite store: a product cache and an outbox of stock movements.
//!
//! The two tables are independent:
//! - `products`: `product_id` → JSON document, replaced on every write.
//! - `stock_movements`: append-only outbox keyed by an AUTOINCREMENT id, so
//!   ids grow with insertion order and are never reused.
//!
//! # Schema changes
//!
//! The schema version lives in SQLite's `user_version`. Opening a file written
//! with a different version **drops both tables**, discarding cached products
//! and any movements that were never delivered. The reset is logged at `warn`
//! with the number of discarded movements. A data-preserving migration is
//! needed before the schema changes in a release that may have pending
//! movements on devices.

mod cache;
mod lock;
mod outbox;

pub use lock::DrainLock;
pub use outbox::QueuedOperation;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Current on-disk schema version.
pub const SCHEMA_VERSION: i64 = 1;

const CREATE_PRODUCTS: &str = r#"
    CREATE TABLE IF NOT EXISTS products (
        product_id TEXT PRIMARY KEY,
        product_data TEXT
    )
"#;

const CREATE_STOCK_MOVEMENTS: &str = r#"
    CREATE TABLE IF NOT EXISTS stock_movements (
        movement_id INTEGER PRIMARY KEY AUTOINCREMENT,
        movement_data TEXT
    )
"#;

/// Durable store for cached reads and queued writes.
#[derive(Clone)]
pub struct LocalStore {
    pool: SqlitePool,
    lock_path: PathBuf,
}

impl LocalStore {
    /// Opens (creating if missing) the database at `path`.
    ///
    /// Creates the parent directory if needed and brings the schema to
    /// [`SCHEMA_VERSION`].
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::Io(parent.to_path_buf(), e))?;
        }

        // WAL keeps readers on the last committed state while a write is in progress.
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            lock_path: lock::lock_path(path),
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Closes the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let (version,): (i64,) = sqlx::query_as("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;

        if version == SCHEMA_VERSION {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        if version != 0 {
            let (outbox_exists,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'stock_movements'",
            )
            .fetch_one(&mut *tx)
            .await?;

            let discarded: i64 = if outbox_exists > 0 {
                let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM stock_movements")
                    .fetch_one(&mut *tx)
                    .await?;
                count
            } else {
                0
            };

            warn!(
                from_version = version,
                to_version = SCHEMA_VERSION,
                discarded_movements = discarded,
                "Local schema version changed, dropping cached products and queued movements"
            );

            sqlx::query("DROP TABLE IF EXISTS products")
                .execute(&mut *tx)
                .await?;
            sqlx::query("DROP TABLE IF EXISTS stock_movements")
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(CREATE_PRODUCTS).execute(&mut *tx).await?;
        sqlx::query(CREATE_STOCK_MOVEMENTS).execute(&mut *tx).await?;
        sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(version = SCHEMA_VERSION, "Initialized local store schema");
        Ok(())
    }
}

/// Errors from the local store. These are fatal to the calling operation.
#[derive(Debug)]
pub enum StoreError {
    /// SQLite error.
    Database(sqlx::Error),
    /// Failed to create the database directory.
    Io(PathBuf, io::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "Database error: {}", e),
            StoreError::Io(path, e) => write!(f, "I/O error for {}: {}", path.display(), e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database(e) => Some(e),
            StoreError::Io(_, e) => Some(e),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}
