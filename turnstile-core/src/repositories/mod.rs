//! Repository traits for data access layer
//!
//! This module defines the repository interfaces that services use to interact with storage.
//!
//! # Trait Hierarchy
//!
//! - [`AccountRepository`] defines the operations on account lockout records
//! - [`AccountRepositoryProvider`] gives access to a backend's account repository
//! - [`RepositoryProvider`] adds lifecycle methods (migrations, health checks)
//!
//! [`AccountRepositoryAdapter`] turns any `RepositoryProvider` back into an
//! `AccountRepository` so services can be generic over the repository alone.

pub mod account;
pub mod adapter;
pub mod memory;

pub use account::AccountRepository;
pub use adapter::AccountRepositoryAdapter;
pub use memory::{InMemoryAccountRepository, InMemoryRepositoryProvider};

use async_trait::async_trait;

use crate::Error;

/// Provider trait for account repository access.
pub trait AccountRepositoryProvider: Send + Sync + 'static {
    /// The account repository implementation type
    type AccountRepo: AccountRepository;

    /// Get the account repository
    fn account(&self) -> &Self::AccountRepo;
}

/// Provider trait that storage implementations must implement.
///
/// # Implementing a Custom Storage Backend
///
/// 1. Implement [`AccountRepository`] for your backend
/// 2. Implement [`AccountRepositoryProvider`]
/// 3. Implement `RepositoryProvider` with `migrate()` and `health_check()`
///
/// # Example
///
/// ```rust,ignore
/// use turnstile_core::repositories::*;
///
/// struct MyStorage { /* ... */ }
///
/// impl AccountRepositoryProvider for MyStorage {
///     type AccountRepo = MyAccountRepository;
///     fn account(&self) -> &Self::AccountRepo { &self.accounts }
/// }
///
/// #[async_trait]
/// impl RepositoryProvider for MyStorage {
///     async fn migrate(&self) -> Result<(), Error> { /* ... */ }
///     async fn health_check(&self) -> Result<(), Error> { /* ... */ }
/// }
/// ```
#[async_trait]
pub trait RepositoryProvider: AccountRepositoryProvider {
    /// Run migrations for all repositories
    async fn migrate(&self) -> Result<(), Error>;

    /// Health check for all repositories
    async fn health_check(&self) -> Result<(), Error>;
}
