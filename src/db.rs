//! SQLite store behind the lookup cache.
//!
//! Opening a [`Database`] creates the file and its directory when missing, switches
//! the journal to WAL, sets a busy timeout and applies the embedded migrations from
//! `migrations/`.
//!
//! ```no_run
//! use std::path::Path;
//! use titlesync_core::{CachePolicy, Database, LookupCache};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(Path::new("titlesync-cache.db")).await?;
//! let cache = LookupCache::load(db, CachePolicy::default()).await?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, instrument};

/// Pool size for the on-disk store. Flushes are serialized by the cache, so a
/// handful of connections is plenty.
const MAX_CONNECTIONS: u32 = 4;

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors opening or migrating the store.
#[derive(Error, Debug)]
pub enum DbError {
    /// Connecting or configuring the connection failed.
    #[error("failed to open lookup cache database: {0}")]
    Connection(#[from] sqlx::Error),

    /// Applying the schema failed.
    #[error("failed to migrate lookup cache schema: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The directory holding the database file could not be created.
    #[error("failed to create cache directory {path}: {source}")]
    Directory {
        /// Directory that could not be created.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Handle to the cache database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the database at `db_path`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Directory`] when the parent directory cannot be created,
    /// [`DbError::Connection`] when SQLite refuses the file and
    /// [`DbError::Migration`] when the schema cannot be applied.
    #[instrument(skip(db_path), fields(path = %db_path.display()))]
    pub async fn new(db_path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| DbError::Directory {
                    path: parent.display().to_string(),
                    source,
                })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        Self::migrated(pool).await
    }

    /// Opens a private in-memory database. Contents vanish with the handle.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] or [`DbError::Migration`].
    #[instrument]
    pub async fn new_in_memory() -> Result<Self, DbError> {
        // One connection: every in-memory connection would be its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self, DbError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!("lookup cache schema up to date");
        Ok(Self { pool })
    }

    /// Underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Whether the store runs in WAL mode.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] if the pragma cannot be read.
    pub async fn is_wal_enabled(&self) -> Result<bool, DbError> {
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&self.pool)
            .await?;
        Ok(mode.eq_ignore_ascii_case("wal"))
    }

    /// Closes every pooled connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}
