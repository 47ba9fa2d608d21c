//! Builder pattern for constructing Turnstile instances
//!
//! Storage must be chosen before [`TurnstileBuilder::build`] is available; the
//! type parameter tracks whether it has been.
//!
//! ```rust,no_run
//! use turnstile::{FailurePolicy, TurnstileBuilder};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let turnstile = TurnstileBuilder::new()
//!     .with_sqlite("sqlite::memory:")
//!     .await?
//!     .with_threshold(5)
//!     .with_failure_policy(FailurePolicy::FailClosed)
//!     .apply_migrations(true)
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use turnstile_core::{
    CounterUpdate, EventBus, FailurePolicy, LockoutConfig, RepositoryProvider,
    repositories::InMemoryRepositoryProvider,
};

use crate::Turnstile;

/// Errors that can occur when building a Turnstile instance.
#[derive(Debug, thiserror::Error)]
pub enum TurnstileBuilderError {
    /// Failed to connect to storage backend
    #[error("Storage connection failed: {0}")]
    StorageConnection(String),

    /// Failed to run database migrations
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Invalid configuration provided
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// No storage configured yet.
pub struct NoStorage;

/// Storage configured; the builder can build.
pub struct WithStorage<R: RepositoryProvider> {
    repositories: Arc<R>,
}

/// A type-safe builder for [`Turnstile`] instances.
///
/// # Defaults
///
/// - Lockout: enabled, threshold 3
/// - Counter updates: atomic
/// - Failure policy: fail closed
/// - Apply migrations: false
pub struct TurnstileBuilder<Storage> {
    storage: Storage,
    config: LockoutConfig,
    event_bus: Option<EventBus>,
    apply_migrations: bool,
}

impl Default for TurnstileBuilder<NoStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnstileBuilder<NoStorage> {
    pub fn new() -> Self {
        Self {
            storage: NoStorage,
            config: LockoutConfig::default(),
            event_bus: None,
            apply_migrations: false,
        }
    }

    /// Use any repository provider as storage.
    pub fn with_repositories<R: RepositoryProvider>(
        self,
        repositories: Arc<R>,
    ) -> TurnstileBuilder<WithStorage<R>> {
        TurnstileBuilder {
            storage: WithStorage { repositories },
            config: self.config,
            event_bus: self.event_bus,
            apply_migrations: self.apply_migrations,
        }
    }

    /// Keep records in process memory. They are lost on restart.
    pub fn with_memory(self) -> TurnstileBuilder<WithStorage<InMemoryRepositoryProvider>> {
        self.with_repositories(Arc::new(InMemoryRepositoryProvider::new()))
    }
}

#[cfg(feature = "sqlite")]
impl TurnstileBuilder<NoStorage> {
    /// Configure SQLite storage by connecting to the given URL.
    ///
    /// # Arguments
    ///
    /// * `url` - SQLite connection URL (e.g., "sqlite::memory:" or "sqlite://path/to/lockout.db")
    pub async fn with_sqlite(
        self,
        url: &str,
    ) -> Result<
        TurnstileBuilder<WithStorage<crate::SqliteRepositoryProvider>>,
        TurnstileBuilderError,
    > {
        let storage = crate::SqliteStorage::connect(url)
            .await
            .map_err(|e| TurnstileBuilderError::StorageConnection(e.to_string()))?;

        Ok(self.with_repositories(Arc::new(storage.into_repository_provider())))
    }

    /// Configure SQLite storage with an existing connection pool.
    pub fn with_sqlite_pool(
        self,
        pool: sqlx::SqlitePool,
    ) -> TurnstileBuilder<WithStorage<crate::SqliteRepositoryProvider>> {
        self.with_repositories(Arc::new(crate::SqliteRepositoryProvider::new(pool)))
    }
}

impl<Storage> TurnstileBuilder<Storage> {
    /// Replace the whole lockout configuration.
    pub fn with_config(mut self, config: LockoutConfig) -> Self {
        self.config = config;
        self
    }

    /// Consecutive failures that lock an account.
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.config = self.config.with_threshold(threshold);
        self
    }

    pub fn with_counter_update(mut self, counter_update: CounterUpdate) -> Self {
        self.config = self.config.with_counter_update(counter_update);
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.config = self.config.with_failure_policy(failure_policy);
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Run storage migrations during [`build`](TurnstileBuilder::build).
    pub fn apply_migrations(mut self, apply: bool) -> Self {
        self.apply_migrations = apply;
        self
    }
}

impl<R: RepositoryProvider> TurnstileBuilder<WithStorage<R>> {
    /// Validate the configuration, optionally migrate, and build.
    pub async fn build(self) -> Result<Turnstile<R>, TurnstileBuilderError> {
        // Reject a bad configuration before touching storage
        self.config
            .validate()
            .map_err(|e| TurnstileBuilderError::InvalidConfiguration(e.to_string()))?;

        if self.apply_migrations {
            tracing::debug!("Applying storage migrations");
            self.storage
                .repositories
                .migrate()
                .await
                .map_err(|e| TurnstileBuilderError::Migration(e.to_string()))?;
        }

        tracing::debug!(
            threshold = self.config.lockout_threshold,
            enabled = self.config.enabled,
            "Building turnstile"
        );
        let turnstile = Turnstile::new(self.storage.repositories)
            .with_config(self.config)
            .map_err(|e| TurnstileBuilderError::InvalidConfiguration(e.to_string()))?;
        Ok(match self.event_bus {
            Some(bus) => turnstile.with_event_bus(bus),
            None => turnstile,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_with_memory_defaults() {
        let turnstile = TurnstileBuilder::new().with_memory().build().await.unwrap();
        assert_eq!(turnstile.config(), &LockoutConfig::default());
        turnstile.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn test_build_rejects_zero_threshold() {
        let result = TurnstileBuilder::new()
            .with_threshold(0)
            .with_memory()
            .build()
            .await;
        assert!(matches!(
            result,
            Err(TurnstileBuilderError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_settings_survive_storage_transition() {
        let turnstile = TurnstileBuilder::new()
            .with_threshold(7)
            .with_counter_update(CounterUpdate::ReadModifyWrite)
            .with_memory()
            .with_failure_policy(FailurePolicy::FailOpen)
            .build()
            .await
            .unwrap();

        let config = turnstile.config();
        assert_eq!(config.lockout_threshold, 7);
        assert_eq!(config.counter_update, CounterUpdate::ReadModifyWrite);
        assert_eq!(config.failure_policy, FailurePolicy::FailOpen);
    }
}
