//! # Turnstile
//!
//! Turnstile locks an account after too many consecutive failed sign-in
//! attempts. Every sign-in path asks it one question before and after checking
//! credentials, and it answers `Locked` or `NotLocked` while keeping a per
//! account failure counter in storage.
//!
//! Locks do not expire. An administrator clears them with
//! [`Turnstile::unlock_account`] or the `turnstile unlock` command.
//!
//! ## Storage Support
//!
//! - SQLite (feature `sqlite`, enabled by default)
//! - In-memory, for tests and single-process deployments
//!
//! ## Example
//!
//! ```rust,no_run
//! use turnstile::{Outcome, TurnstileBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let turnstile = TurnstileBuilder::new()
//!         .with_sqlite("sqlite://lockout.db")
//!         .await?
//!         .with_threshold(3)
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     if turnstile
//!         .check_and_lock("user@example.com", Outcome::Check)
//!         .await?
//!         .is_locked()
//!     {
//!         println!("Account locked");
//!     }
//!     Ok(())
//! }
//! ```
mod builder;

use std::sync::Arc;

use turnstile_core::{
    error::{AuthError, RecordAccessError},
    repositories::AccountRepositoryAdapter,
};

pub use builder::{NoStorage, TurnstileBuilder, TurnstileBuilderError, WithStorage};

/// Re-export core types from turnstile_core
pub use turnstile_core::{
    AccountId, AccountRecord, CounterUpdate, CredentialVerifier, Event, EventBus, EventHandler,
    FailurePolicy, LockoutConfig, LockoutDecision, LockoutService, LockoutStatus, Outcome,
    RepositoryProvider, SignInService,
    config::DEFAULT_LOCKOUT_THRESHOLD,
    repositories::{InMemoryAccountRepository, InMemoryRepositoryProvider},
};

/// Re-export storage backends
#[cfg(feature = "sqlite")]
pub use turnstile_storage_sqlite::{SqliteRepositoryProvider, SqliteStorage};

/// Errors returned by the [`Turnstile`] facade.
#[derive(Debug, thiserror::Error)]
pub enum TurnstileError {
    /// The account is locked, or this attempt locked it
    #[error("Account locked")]
    AccountLocked,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Auth error: {0}")]
    AuthError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    /// Error when interacting with storage
    #[error("Storage error: {0}")]
    StorageError(String),
}

impl From<turnstile_core::Error> for TurnstileError {
    fn from(error: turnstile_core::Error) -> Self {
        use turnstile_core::Error;

        match error {
            Error::Auth(AuthError::AccountLocked) => TurnstileError::AccountLocked,
            Error::Auth(AuthError::InvalidCredentials) => TurnstileError::InvalidCredentials,
            Error::Auth(e) => TurnstileError::AuthError(e.to_string()),
            Error::Validation(e) => TurnstileError::ValidationError(e.to_string()),
            Error::RecordAccess(e) => TurnstileError::StorageError(e.to_string()),
            Error::Event(e) => TurnstileError::StorageError(e.to_string()),
        }
    }
}

impl From<RecordAccessError> for TurnstileError {
    fn from(error: RecordAccessError) -> Self {
        TurnstileError::StorageError(error.to_string())
    }
}

type AccountRepo<R> = AccountRepositoryAdapter<R>;

/// Account lockout over a repository provider.
///
/// Cloning is cheap; clones share the provider and the event bus.
pub struct Turnstile<R: RepositoryProvider> {
    repositories: Arc<R>,
    lockout_service: Arc<LockoutService<AccountRepo<R>>>,
    config: LockoutConfig,
    event_bus: Option<EventBus>,
}

impl<R: RepositoryProvider> Clone for Turnstile<R> {
    fn clone(&self) -> Self {
        Self {
            repositories: self.repositories.clone(),
            lockout_service: self.lockout_service.clone(),
            config: self.config.clone(),
            event_bus: self.event_bus.clone(),
        }
    }
}

impl<R: RepositoryProvider> Turnstile<R> {
    /// Create a new Turnstile instance with the default configuration.
    pub fn new(repositories: Arc<R>) -> Self {
        let config = LockoutConfig::default();
        Self {
            lockout_service: Self::lockout_service_for(&repositories, &config, None),
            repositories,
            config,
            event_bus: None,
        }
    }

    /// Replace the lockout configuration.
    ///
    /// # Errors
    ///
    /// [`TurnstileError::ValidationError`] if the configuration is invalid,
    /// e.g. a threshold of 0.
    pub fn with_config(mut self, config: LockoutConfig) -> Result<Self, TurnstileError> {
        config
            .validate()
            .map_err(|e| TurnstileError::ValidationError(e.to_string()))?;
        self.config = config;
        self.rebuild();
        Ok(self)
    }

    /// Publish lockout events to `event_bus`.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self.rebuild();
        self
    }

    fn rebuild(&mut self) {
        self.lockout_service =
            Self::lockout_service_for(&self.repositories, &self.config, self.event_bus.clone());
    }

    fn lockout_service_for(
        repositories: &Arc<R>,
        config: &LockoutConfig,
        event_bus: Option<EventBus>,
    ) -> Arc<LockoutService<AccountRepo<R>>> {
        let repo = Arc::new(AccountRepositoryAdapter::new(repositories.clone()));
        let service = LockoutService::new(repo, config.clone());
        Arc::new(match event_bus {
            Some(bus) => service.with_event_bus(bus),
            None => service,
        })
    }

    pub fn config(&self) -> &LockoutConfig {
        &self.config
    }

    pub fn lockout_service(&self) -> Arc<LockoutService<AccountRepo<R>>> {
        self.lockout_service.clone()
    }

    /// Run migrations for all repositories
    pub async fn migrate(&self) -> Result<(), TurnstileError> {
        self.repositories
            .migrate()
            .await
            .map_err(|e| TurnstileError::StorageError(e.to_string()))
    }

    /// Health check for all repositories
    pub async fn health_check(&self) -> Result<(), TurnstileError> {
        self.repositories
            .health_check()
            .await
            .map_err(|e| TurnstileError::StorageError(e.to_string()))
    }

    /// Evaluate one sign-in event for `identifier`.
    ///
    /// See [`LockoutService::check_and_lock`].
    pub async fn check_and_lock(
        &self,
        identifier: &str,
        outcome: Outcome,
    ) -> Result<LockoutDecision, TurnstileError> {
        Ok(self
            .lockout_service
            .check_and_lock(identifier, outcome)
            .await?)
    }

    pub async fn lockout_status(&self, identifier: &str) -> Result<LockoutStatus, TurnstileError> {
        Ok(self.lockout_service.lockout_status(identifier).await?)
    }

    pub async fn is_locked(&self, identifier: &str) -> Result<bool, TurnstileError> {
        Ok(self.lockout_service.is_locked(identifier).await?)
    }

    /// Clear the lock and counter for `identifier`.
    ///
    /// Returns `true` if the account was locked.
    pub async fn unlock_account(&self, identifier: &str) -> Result<bool, TurnstileError> {
        Ok(self.lockout_service.unlock_account(identifier).await?)
    }

    /// All locked accounts, most recently locked first.
    pub async fn locked_accounts(&self) -> Result<Vec<AccountRecord>, TurnstileError> {
        Ok(self.lockout_service.locked_accounts().await?)
    }

    /// A sign-in service that guards `verifier` with this instance's lockout policy.
    pub fn sign_in_service<V: CredentialVerifier>(
        &self,
        verifier: Arc<V>,
    ) -> SignInService<AccountRepo<R>, V> {
        SignInService::new(self.lockout_service.clone(), verifier)
    }

    /// Sign in through `verifier`, enforcing lockout.
    ///
    /// A locked account is rejected with [`TurnstileError::AccountLocked`]
    /// before the verifier runs.
    pub async fn sign_in<V: CredentialVerifier>(
        &self,
        verifier: Arc<V>,
        identifier: &str,
        secret: &str,
    ) -> Result<V::Principal, TurnstileError> {
        Ok(self
            .sign_in_service(verifier)
            .sign_in(identifier, secret)
            .await?)
    }
}
