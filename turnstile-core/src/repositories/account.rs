//! Repository trait for account lockout records.

use async_trait::async_trait;

use crate::{
    Error,
    account::{AccountId, AccountRecord, AccountUpdate, FailureTransition, ResetTransition},
};

/// Repository for account lockout records.
///
/// The plain `get`/`create`/`update` operations are the minimal document-store
/// interface. `register_failure` and `reset_failures` must be implemented as
/// single conditional writes so that concurrent sign-ins cannot lose updates.
#[async_trait]
pub trait AccountRepository: Send + Sync + 'static {
    /// Look up the record for an identifier.
    async fn get(&self, identifier: &AccountId) -> Result<Option<AccountRecord>, Error>;

    /// Insert a new record.
    ///
    /// Fails with `RecordAccessError::Conflict` if the identifier already has one.
    async fn create(&self, record: AccountRecord) -> Result<AccountRecord, Error>;

    /// Apply a partial update to an existing record.
    ///
    /// Fails with `RecordAccessError::NotFound` if there is no record.
    async fn update(
        &self,
        identifier: &AccountId,
        update: AccountUpdate,
    ) -> Result<AccountRecord, Error>;

    /// Atomically count one failed attempt.
    ///
    /// Creates the record when missing. Leaves a locked record untouched.
    /// When `failed_attempts + 1 >= threshold` the record becomes locked and
    /// its counter resets to zero.
    async fn register_failure(
        &self,
        identifier: &AccountId,
        threshold: u32,
    ) -> Result<FailureTransition, Error>;

    /// Atomically reset the counter of an unlocked record.
    async fn reset_failures(&self, identifier: &AccountId) -> Result<ResetTransition, Error>;

    /// Clear the lock and counter.
    ///
    /// # Returns
    ///
    /// `true` if the record existed and was locked.
    async fn unlock(&self, identifier: &AccountId) -> Result<bool, Error>;

    /// All currently locked records, most recently locked first.
    async fn list_locked(&self) -> Result<Vec<AccountRecord>, Error>;
}
