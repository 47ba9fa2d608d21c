//! SQLite storage backend for turnstile
//!
//! Lockout records live in a single `lockout_accounts` table keyed by
//! identifier. Use [`SqliteStorage::connect`] with a URL such as
//! `sqlite://lockout.db` or `sqlite::memory:`, run [`SqliteStorage::migrate`]
//! once, then hand the provider to the lockout service.
//!
//! ```rust,ignore
//! let storage = SqliteStorage::connect("sqlite://lockout.db").await?;
//! storage.migrate().await?;
//! let provider = Arc::new(storage.into_repository_provider());
//! ```
pub mod migrations;
pub mod repositories;

use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use turnstile_core::{
    Error,
    error::{RecordAccessError, utilities::DatabaseResultExt},
};

pub use migrations::SchemaManager;
pub use repositories::{SqliteAccountRepository, SqliteRepositoryProvider};

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool for `database_url`, creating the database file if needed.
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_db_err_with_context("Invalid SQLite connection URL")?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, database_url, "Failed to connect to SQLite");
                Error::RecordAccess(RecordAccessError::Connection(
                    "Failed to connect to SQLite".to_string(),
                ))
            })?;

        tracing::debug!(database_url, "Connected to SQLite");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply pending schema steps, returning the versions applied.
    pub async fn migrate(&self) -> Result<Vec<i64>, Error> {
        SchemaManager::new(self.pool.clone()).migrate().await
    }

    /// Current schema version, `None` before the first migration.
    pub async fn schema_version(&self) -> Result<Option<i64>, Error> {
        SchemaManager::new(self.pool.clone()).current_version().await
    }

    pub fn into_repository_provider(self) -> SqliteRepositoryProvider {
        SqliteRepositoryProvider::new(self.pool)
    }
}
