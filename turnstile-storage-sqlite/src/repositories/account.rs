//! SQLite implementation of the account lockout repository.
//!
//! Failure and reset transitions are single statements, so concurrent
//! sign-ins against the same identifier never lose an increment.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use turnstile_core::{
    AccountId, AccountRecord, AccountUpdate, Error, FailureTransition, ResetTransition,
    error::{RecordAccessError, utilities::DatabaseResultExt},
    repositories::AccountRepository,
};

const COLUMNS: &str = "identifier, failed_attempts, locked, locked_at, created_at, updated_at";

pub struct SqliteAccountRepository {
    pool: SqlitePool,
}

impl SqliteAccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Row as stored; timestamps are unix milliseconds.
#[derive(Debug, sqlx::FromRow)]
struct SqliteAccountRecord {
    identifier: String,
    failed_attempts: i64,
    locked: bool,
    locked_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

fn timestamp(millis: i64) -> Result<DateTime<Utc>, RecordAccessError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| RecordAccessError::Malformed(format!("invalid timestamp {millis}")))
}

impl TryFrom<SqliteAccountRecord> for AccountRecord {
    type Error = RecordAccessError;

    fn try_from(row: SqliteAccountRecord) -> Result<Self, Self::Error> {
        let identifier = AccountId::parse(&row.identifier)
            .map_err(|e| RecordAccessError::Malformed(e.to_string()))?;
        let failed_attempts = u32::try_from(row.failed_attempts).map_err(|_| {
            RecordAccessError::Malformed(format!(
                "failed_attempts out of range for {identifier}: {}",
                row.failed_attempts
            ))
        })?;

        Ok(AccountRecord {
            identifier,
            failed_attempts,
            locked: row.locked,
            locked_at: row.locked_at.map(timestamp).transpose()?,
            created_at: timestamp(row.created_at)?,
            updated_at: timestamp(row.updated_at)?,
        })
    }
}

fn into_record(row: SqliteAccountRecord) -> Result<AccountRecord, Error> {
    AccountRecord::try_from(row).map_err(|e| {
        tracing::error!(error = %e, "Malformed account record");
        Error::RecordAccess(e)
    })
}

#[async_trait]
impl AccountRepository for SqliteAccountRepository {
    async fn get(&self, identifier: &AccountId) -> Result<Option<AccountRecord>, Error> {
        let row = sqlx::query_as::<_, SqliteAccountRecord>(&format!(
            "SELECT {COLUMNS} FROM lockout_accounts WHERE identifier = ?"
        ))
        .bind(identifier.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_db_err_with_context("Failed to get account record")?;

        row.map(into_record).transpose()
    }

    async fn create(&self, record: AccountRecord) -> Result<AccountRecord, Error> {
        let result = sqlx::query_as::<_, SqliteAccountRecord>(&format!(
            "INSERT INTO lockout_accounts ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?) RETURNING {COLUMNS}"
        ))
        .bind(record.identifier.as_str())
        .bind(i64::from(record.failed_attempts))
        .bind(record.locked)
        .bind(record.locked_at.map(|t| t.timestamp_millis()))
        .bind(record.created_at.timestamp_millis())
        .bind(record.updated_at.timestamp_millis())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => into_record(row),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(Error::RecordAccess(
                RecordAccessError::Conflict(record.identifier.to_string()),
            )),
            Err(e) => Err(e).map_db_err_with_context("Failed to create account record"),
        }
    }

    async fn update(
        &self,
        identifier: &AccountId,
        update: AccountUpdate,
    ) -> Result<AccountRecord, Error> {
        let (set_locked_at, locked_at) = match update.locked_at {
            Some(value) => (true, value.map(|t| t.timestamp_millis())),
            None => (false, None),
        };

        let row = sqlx::query_as::<_, SqliteAccountRecord>(&format!(
            r#"
            UPDATE lockout_accounts
            SET failed_attempts = COALESCE(?, failed_attempts),
                locked = COALESCE(?, locked),
                locked_at = CASE WHEN ? THEN ? ELSE locked_at END,
                updated_at = ?
            WHERE identifier = ?
            RETURNING {COLUMNS}
            "#
        ))
        .bind(update.failed_attempts.map(i64::from))
        .bind(update.locked)
        .bind(set_locked_at)
        .bind(locked_at)
        .bind(Utc::now().timestamp_millis())
        .bind(identifier.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_db_err_with_context("Failed to update account record")?;

        match row {
            Some(row) => into_record(row),
            None => Err(Error::RecordAccess(RecordAccessError::NotFound)),
        }
    }

    async fn register_failure(
        &self,
        identifier: &AccountId,
        threshold: u32,
    ) -> Result<FailureTransition, Error> {
        // A locked row fails the DO UPDATE guard and returns nothing
        let row = sqlx::query_as::<_, SqliteAccountRecord>(&format!(
            r#"
            INSERT INTO lockout_accounts ({COLUMNS})
            VALUES (
                ?1,
                CASE WHEN ?2 <= 1 THEN 0 ELSE 1 END,
                CASE WHEN ?2 <= 1 THEN 1 ELSE 0 END,
                CASE WHEN ?2 <= 1 THEN ?3 ELSE NULL END,
                ?3,
                ?3
            )
            ON CONFLICT(identifier) DO UPDATE SET
                locked = CASE WHEN lockout_accounts.failed_attempts + 1 >= ?2 THEN 1 ELSE 0 END,
                locked_at = CASE WHEN lockout_accounts.failed_attempts + 1 >= ?2 THEN ?3 ELSE NULL END,
                failed_attempts = CASE
                    WHEN lockout_accounts.failed_attempts + 1 >= ?2 THEN 0
                    ELSE lockout_accounts.failed_attempts + 1
                END,
                updated_at = ?3
            WHERE lockout_accounts.locked = 0
            RETURNING {COLUMNS}
            "#
        ))
        .bind(identifier.as_str())
        .bind(i64::from(threshold))
        .bind(Utc::now().timestamp_millis())
        .fetch_optional(&self.pool)
        .await
        .map_db_err_with_context("Failed to register failed attempt")?;

        if let Some(row) = row {
            let record = into_record(row)?;
            return Ok(if record.locked {
                FailureTransition::Locked(record)
            } else {
                FailureTransition::Counted(record)
            });
        }

        match self.get(identifier).await? {
            Some(record) => Ok(FailureTransition::AlreadyLocked(record)),
            None => Err(Error::RecordAccess(RecordAccessError::NotFound)),
        }
    }

    async fn reset_failures(&self, identifier: &AccountId) -> Result<ResetTransition, Error> {
        let row = sqlx::query_as::<_, SqliteAccountRecord>(&format!(
            r#"
            UPDATE lockout_accounts
            SET failed_attempts = 0, updated_at = ?
            WHERE identifier = ? AND locked = 0
            RETURNING {COLUMNS}
            "#
        ))
        .bind(Utc::now().timestamp_millis())
        .bind(identifier.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_db_err_with_context("Failed to reset failed attempts")?;

        if let Some(row) = row {
            return Ok(ResetTransition::Reset(into_record(row)?));
        }

        Ok(match self.get(identifier).await? {
            None => ResetTransition::Missing,
            Some(record) if record.locked => ResetTransition::AlreadyLocked(record),
            // Unlocked between the two statements
            Some(record) => ResetTransition::Reset(record),
        })
    }

    async fn unlock(&self, identifier: &AccountId) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            UPDATE lockout_accounts
            SET locked = 0, failed_attempts = 0, locked_at = NULL, updated_at = ?
            WHERE identifier = ? AND locked = 1
            "#,
        )
        .bind(Utc::now().timestamp_millis())
        .bind(identifier.as_str())
        .execute(&self.pool)
        .await
        .map_db_err_with_context("Failed to unlock account")?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_locked(&self) -> Result<Vec<AccountRecord>, Error> {
        let rows = sqlx::query_as::<_, SqliteAccountRecord>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM lockout_accounts
            WHERE locked = 1
            ORDER BY locked_at DESC, identifier ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await
        .map_db_err_with_context("Failed to list locked accounts")?;

        rows.into_iter().map(into_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::SchemaManager;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;
    use turnstile_core::{
        CounterUpdate, LockoutConfig, LockoutDecision, LockoutService, Outcome,
    };

    async fn setup_test_db() -> SqlitePool {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        // One connection keeps the shared in-memory database free of lock contention
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create pool");

        SchemaManager::new(pool.clone())
            .migrate()
            .await
            .expect("Failed to run migrations");

        pool
    }

    fn id(s: &str) -> AccountId {
        AccountId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_create_get_and_conflict() {
        let repo = SqliteAccountRepository::new(setup_test_db().await);

        let created = repo
            .create(AccountRecord::first_failure(id("user-1")))
            .await
            .unwrap();
        assert_eq!(created.failed_attempts, 1);
        assert!(!created.locked);

        let fetched = repo.get(&id("user-1")).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert!(repo.get(&id("user-2")).await.unwrap().is_none());

        let duplicate = repo
            .create(AccountRecord::first_failure(id("user-1")))
            .await;
        assert!(matches!(
            duplicate,
            Err(Error::RecordAccess(RecordAccessError::Conflict(_)))
        ));
    }

    #[tokio::test]
    async fn test_update() {
        let repo = SqliteAccountRepository::new(setup_test_db().await);
        repo.create(AccountRecord::first_failure(id("user-1")))
            .await
            .unwrap();

        let updated = repo
            .update(&id("user-1"), AccountUpdate::failed_attempts(2))
            .await
            .unwrap();
        assert_eq!(updated.failed_attempts, 2);
        assert!(!updated.locked);
        assert!(updated.locked_at.is_none());

        let locked = repo.update(&id("user-1"), AccountUpdate::lock()).await.unwrap();
        assert!(locked.locked);
        assert_eq!(locked.failed_attempts, 0);
        assert!(locked.locked_at.is_some());

        let unlocked = repo
            .update(&id("user-1"), AccountUpdate::unlock())
            .await
            .unwrap();
        assert!(!unlocked.locked);
        assert!(unlocked.locked_at.is_none());

        let missing = repo
            .update(&id("ghost"), AccountUpdate::failed_attempts(1))
            .await;
        assert!(matches!(
            missing,
            Err(Error::RecordAccess(RecordAccessError::NotFound))
        ));
    }

    #[tokio::test]
    async fn test_register_failure_sequence() {
        let repo = SqliteAccountRepository::new(setup_test_db().await);

        let first = repo.register_failure(&id("user-1"), 3).await.unwrap();
        assert!(matches!(first, FailureTransition::Counted(ref r) if r.failed_attempts == 1));

        let second = repo.register_failure(&id("user-1"), 3).await.unwrap();
        assert!(matches!(second, FailureTransition::Counted(ref r) if r.failed_attempts == 2));

        let third = repo.register_failure(&id("user-1"), 3).await.unwrap();
        assert!(
            matches!(third, FailureTransition::Locked(ref r) if r.locked && r.failed_attempts == 0 && r.locked_at.is_some())
        );

        let fourth = repo.register_failure(&id("user-1"), 3).await.unwrap();
        assert!(matches!(fourth, FailureTransition::AlreadyLocked(_)));
        assert_eq!(fourth.record(), third.record());
    }

    #[tokio::test]
    async fn test_register_failure_threshold_one() {
        let repo = SqliteAccountRepository::new(setup_test_db().await);
        let transition = repo.register_failure(&id("user-1"), 1).await.unwrap();
        assert!(matches!(transition, FailureTransition::Locked(ref r) if r.failed_attempts == 0));

        let stored = repo.get(&id("user-1")).await.unwrap().unwrap();
        assert!(stored.locked);
    }

    #[tokio::test]
    async fn test_reset_failures() {
        let repo = SqliteAccountRepository::new(setup_test_db().await);
        assert_eq!(
            repo.reset_failures(&id("user-1")).await.unwrap(),
            ResetTransition::Missing
        );
        assert!(repo.get(&id("user-1")).await.unwrap().is_none());

        repo.register_failure(&id("user-1"), 5).await.unwrap();
        repo.register_failure(&id("user-1"), 5).await.unwrap();
        let reset = repo.reset_failures(&id("user-1")).await.unwrap();
        assert!(matches!(reset, ResetTransition::Reset(ref r) if r.failed_attempts == 0));

        repo.register_failure(&id("user-2"), 1).await.unwrap();
        let reset = repo.reset_failures(&id("user-2")).await.unwrap();
        assert!(matches!(reset, ResetTransition::AlreadyLocked(ref r) if r.locked));
    }

    #[tokio::test]
    async fn test_unlock_and_list_locked() {
        let repo = SqliteAccountRepository::new(setup_test_db().await);
        let now = Utc::now();
        for (name, minutes_ago) in [("a", 10), ("b", 1), ("c", 5)] {
            let mut record = AccountRecord::locked_on_creation(id(name));
            record.locked_at = Some(now - chrono::Duration::minutes(minutes_ago));
            repo.create(record).await.unwrap();
        }
        repo.create(AccountRecord::first_failure(id("d")))
            .await
            .unwrap();

        let locked: Vec<String> = repo
            .list_locked()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.identifier.into_inner())
            .collect();
        assert_eq!(locked, vec!["b", "c", "a"]);

        assert!(repo.unlock(&id("c")).await.unwrap());
        assert!(!repo.unlock(&id("c")).await.unwrap());
        assert!(!repo.unlock(&id("d")).await.unwrap());
        assert!(!repo.unlock(&id("missing")).await.unwrap());

        let record = repo.get(&id("c")).await.unwrap().unwrap();
        assert!(!record.locked);
        assert_eq!(record.failed_attempts, 0);
        assert!(record.locked_at.is_none());
        assert_eq!(repo.list_locked().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_rows() {
        let pool = setup_test_db().await;
        let repo = SqliteAccountRepository::new(pool.clone());

        sqlx::query(
            "INSERT INTO lockout_accounts (identifier, failed_attempts, locked, created_at, updated_at) VALUES ('negative', -1, 0, 0, 0)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let result = repo.get(&id("negative")).await;
        assert!(matches!(
            result,
            Err(Error::RecordAccess(RecordAccessError::Malformed(_)))
        ));

        sqlx::query(
            "INSERT INTO lockout_accounts (identifier, failed_attempts, locked, locked_at, created_at, updated_at) VALUES ('', 0, 1, 0, 0, 0)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let result = repo.list_locked().await;
        assert!(matches!(
            result,
            Err(Error::RecordAccess(RecordAccessError::Malformed(_)))
        ));
    }

    #[tokio::test]
    async fn test_service_on_sqlite_in_both_counter_modes() {
        for mode in [CounterUpdate::Atomic, CounterUpdate::ReadModifyWrite] {
            let repo = Arc::new(SqliteAccountRepository::new(setup_test_db().await));
            let service =
                LockoutService::new(repo.clone(), LockoutConfig::default().with_counter_update(mode));

            for _ in 0..2 {
                assert_eq!(
                    service.check_and_lock("user@example.com", Outcome::Attempt).await.unwrap(),
                    LockoutDecision::NotLocked
                );
            }
            assert_eq!(
                service.check_and_lock("user@example.com", Outcome::Attempt).await.unwrap(),
                LockoutDecision::Locked
            );
            assert_eq!(
                service.check_and_lock("user@example.com", Outcome::Success).await.unwrap(),
                LockoutDecision::Locked
            );
            assert_eq!(
                service.check_and_lock("other@example.com", Outcome::Check).await.unwrap(),
                LockoutDecision::NotLocked
            );
            assert!(repo.get(&id("other@example.com")).await.unwrap().is_none());

            assert!(service.unlock_account("user@example.com").await.unwrap());
            assert_eq!(
                service.check_and_lock("user@example.com", Outcome::Check).await.unwrap(),
                LockoutDecision::NotLocked
            );
        }
    }

    #[tokio::test]
    async fn test_failures_from_many_tasks_are_not_lost() {
        let pool = setup_test_db().await;
        let repo = Arc::new(SqliteAccountRepository::new(pool));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.register_failure(&AccountId::parse("shared").unwrap(), 1000)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let record = repo.get(&id("shared")).await.unwrap().unwrap();
        assert_eq!(record.failed_attempts, 20);
    }
}
