//! Repository implementations for SQLite storage

pub mod account;

pub use account::SqliteAccountRepository;

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use turnstile_core::{
    Error,
    error::utilities::DatabaseResultExt,
    repositories::{AccountRepositoryProvider, RepositoryProvider},
};

use crate::migrations::SchemaManager;

/// Repository provider implementation for SQLite
pub struct SqliteRepositoryProvider {
    pool: SqlitePool,
    account: Arc<SqliteAccountRepository>,
}

impl SqliteRepositoryProvider {
    pub fn new(pool: SqlitePool) -> Self {
        let account = Arc::new(SqliteAccountRepository::new(pool.clone()));
        Self { pool, account }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl AccountRepositoryProvider for SqliteRepositoryProvider {
    type AccountRepo = SqliteAccountRepository;

    fn account(&self) -> &Self::AccountRepo {
        &self.account
    }
}

#[async_trait]
impl RepositoryProvider for SqliteRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        SchemaManager::new(self.pool.clone()).migrate().await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_db_err()?;
        Ok(())
    }
}
