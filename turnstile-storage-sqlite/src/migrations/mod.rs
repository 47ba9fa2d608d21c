//! Versioned schema for the lockout tables.
//!
//! The schema is a fixed list of [`SchemaMigration`]s, each a handful of
//! statements applied in one transaction. The highest applied version is the
//! schema version; `_turnstile_schema` records one row per applied step.

use chrono::Utc;
use sqlx::SqlitePool;
use turnstile_core::{Error, error::RecordAccessError};

const SCHEMA_TABLE: &str = "_turnstile_schema";

/// One step of the schema.
#[derive(Debug, Clone, Copy)]
pub struct SchemaMigration {
    pub version: i64,
    pub name: &'static str,
    up: &'static [&'static str],
    down: &'static [&'static str],
}

/// Every schema step, in version order.
pub const MIGRATIONS: &[SchemaMigration] = &[
    SchemaMigration {
        version: 1,
        name: "create_lockout_accounts",
        // Timestamps are unix milliseconds
        up: &[r#"
            CREATE TABLE IF NOT EXISTS lockout_accounts (
                identifier TEXT PRIMARY KEY NOT NULL,
                failed_attempts INTEGER NOT NULL DEFAULT 0,
                locked INTEGER NOT NULL DEFAULT 0,
                locked_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )"#],
        down: &["DROP TABLE IF EXISTS lockout_accounts"],
    },
    SchemaMigration {
        version: 2,
        name: "index_locked_accounts",
        up: &[
            "CREATE INDEX IF NOT EXISTS idx_lockout_accounts_locked ON lockout_accounts(locked, locked_at)",
        ],
        down: &["DROP INDEX IF EXISTS idx_lockout_accounts_locked"],
    },
];

/// A schema step recorded as applied.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AppliedMigration {
    pub version: i64,
    pub name: String,
    /// Unix milliseconds
    pub applied_at: i64,
}

#[derive(Clone, Copy)]
enum Direction {
    Up,
    Down,
}

fn migration_error(context: String) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| {
        tracing::error!(error = %e, "{context}");
        Error::RecordAccess(RecordAccessError::Migration(context))
    }
}

/// Brings a SQLite database to the current lockout schema.
pub struct SchemaManager {
    pool: SqlitePool,
}

impl SchemaManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn ensure_schema_table(&self) -> Result<(), Error> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {SCHEMA_TABLE} (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at INTEGER NOT NULL
            )"#
        ))
        .execute(&self.pool)
        .await
        .map_err(migration_error(
            "Failed to create schema version table".to_string(),
        ))?;
        Ok(())
    }

    /// Highest applied version, or `None` for an empty database.
    pub async fn current_version(&self) -> Result<Option<i64>, Error> {
        self.ensure_schema_table().await?;
        sqlx::query_scalar(&format!("SELECT MAX(version) FROM {SCHEMA_TABLE}"))
            .fetch_one(&self.pool)
            .await
            .map_err(migration_error("Failed to read schema version".to_string()))
    }

    /// Applied steps, oldest first.
    pub async fn applied(&self) -> Result<Vec<AppliedMigration>, Error> {
        self.ensure_schema_table().await?;
        sqlx::query_as::<_, AppliedMigration>(&format!(
            "SELECT version, name, applied_at FROM {SCHEMA_TABLE} ORDER BY version"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(migration_error("Failed to list applied migrations".to_string()))
    }

    /// Apply every pending step. Returns the versions applied by this call.
    pub async fn migrate(&self) -> Result<Vec<i64>, Error> {
        self.migrate_with(MIGRATIONS).await
    }

    /// Revert every step above `target`, newest first. Returns the versions reverted.
    pub async fn rollback_to(&self, target: i64) -> Result<Vec<i64>, Error> {
        let current = self.current_version().await?.unwrap_or(0);
        let mut reverted = Vec::new();
        for step in MIGRATIONS
            .iter()
            .rev()
            .filter(|m| m.version > target && m.version <= current)
        {
            self.run(step, Direction::Down).await?;
            reverted.push(step.version);
        }
        Ok(reverted)
    }

    async fn migrate_with(&self, migrations: &[SchemaMigration]) -> Result<Vec<i64>, Error> {
        let current = self.current_version().await?.unwrap_or(0);
        let mut applied = Vec::new();
        for step in migrations.iter().filter(|m| m.version > current) {
            self.run(step, Direction::Up).await?;
            applied.push(step.version);
        }

        if !applied.is_empty() {
            tracing::info!(from = current, to = ?applied.last(), "Lockout schema migrated");
        }
        Ok(applied)
    }

    async fn run(&self, step: &SchemaMigration, direction: Direction) -> Result<(), Error> {
        let (statements, verb) = match direction {
            Direction::Up => (step.up, "apply"),
            Direction::Down => (step.down, "revert"),
        };
        let context = || format!("Failed to {verb} migration {} ({})", step.version, step.name);

        tracing::info!(version = step.version, name = step.name, "Running migration ({verb})");

        let mut tx = self.pool.begin().await.map_err(migration_error(context()))?;
        for statement in statements {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(migration_error(context()))?;
        }

        let bookkeeping = match direction {
            Direction::Up => sqlx::query(&format!(
                "INSERT INTO {SCHEMA_TABLE} (version, name, applied_at) VALUES (?, ?, ?)"
            ))
            .bind(step.version)
            .bind(step.name)
            .bind(Utc::now().timestamp_millis())
            .execute(&mut *tx)
            .await,
            Direction::Down => sqlx::query(&format!("DELETE FROM {SCHEMA_TABLE} WHERE version = ?"))
                .bind(step.version)
                .execute(&mut *tx)
                .await,
        };
        bookkeeping.map_err(migration_error(context()))?;

        tx.commit().await.map_err(migration_error(context()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn manager() -> SchemaManager {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create pool");
        SchemaManager::new(pool)
    }

    async fn object_exists(manager: &SchemaManager, kind: &str, name: &str) -> bool {
        let found: Option<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = ? AND name = ?")
                .bind(kind)
                .bind(name)
                .fetch_optional(&manager.pool)
                .await
                .unwrap();
        found.is_some()
    }

    #[test]
    fn test_versions_are_strictly_increasing() {
        assert!(MIGRATIONS.windows(2).all(|w| w[0].version < w[1].version));
        assert!(MIGRATIONS.iter().all(|m| m.version > 0));
    }

    #[tokio::test]
    async fn test_migrate_applies_pending_steps_once() {
        let manager = manager().await;
        assert_eq!(manager.current_version().await.unwrap(), None);

        assert_eq!(manager.migrate().await.unwrap(), vec![1, 2]);
        assert!(manager.migrate().await.unwrap().is_empty());
        assert_eq!(manager.current_version().await.unwrap(), Some(2));

        let applied = manager.applied().await.unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].name, "create_lockout_accounts");
        assert!(object_exists(&manager, "index", "idx_lockout_accounts_locked").await);
    }

    #[tokio::test]
    async fn test_rollback_reverts_newest_first() {
        let manager = manager().await;
        manager.migrate().await.unwrap();

        assert_eq!(manager.rollback_to(1).await.unwrap(), vec![2]);
        assert!(!object_exists(&manager, "index", "idx_lockout_accounts_locked").await);
        assert!(object_exists(&manager, "table", "lockout_accounts").await);
        assert_eq!(manager.current_version().await.unwrap(), Some(1));

        assert_eq!(manager.rollback_to(0).await.unwrap(), vec![1]);
        assert!(!object_exists(&manager, "table", "lockout_accounts").await);
        assert_eq!(manager.current_version().await.unwrap(), None);

        // Back up again from nothing
        assert_eq!(manager.migrate().await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_failed_step_is_not_recorded() {
        let manager = manager().await;
        let broken = [
            MIGRATIONS[0],
            SchemaMigration {
                version: 2,
                name: "broken",
                up: &[
                    "CREATE TABLE half_done (id INTEGER)",
                    "CREATE INDEX idx_missing ON no_such_table(id)",
                ],
                down: &[],
            },
        ];

        let err = manager.migrate_with(&broken).await.unwrap_err();
        assert!(matches!(
            err,
            Error::RecordAccess(RecordAccessError::Migration(ref message))
                if message == "Failed to apply migration 2 (broken)"
        ));

        // Step 1 committed, step 2 rolled back as a whole
        assert_eq!(manager.current_version().await.unwrap(), Some(1));
        assert!(!object_exists(&manager, "table", "half_done").await);
    }
}
