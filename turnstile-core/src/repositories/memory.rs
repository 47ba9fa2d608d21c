//! In-memory account repository
//!
//! Records live in a [`DashMap`] keyed by identifier. Per-key transitions go
//! through the map's entry API, which holds the shard lock for the duration of
//! the read-compare-write, so `register_failure` and `reset_failures` are
//! atomic with respect to each other.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    Error,
    account::{AccountId, AccountRecord, AccountUpdate, FailureTransition, ResetTransition},
    error::RecordAccessError,
    repositories::{AccountRepository, AccountRepositoryProvider, RepositoryProvider},
};

#[derive(Default)]
pub struct InMemoryAccountRepository {
    accounts: DashMap<AccountId, AccountRecord>,
    unavailable: AtomicBool,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, replacing any existing one.
    pub fn insert(&self, record: AccountRecord) {
        self.accounts.insert(record.identifier.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Make every subsequent call fail with a connection error.
    ///
    /// Used to exercise fail-open and fail-closed sign-in handling.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::RecordAccess(RecordAccessError::Connection(
                "In-memory store is unavailable".to_string(),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn get(&self, identifier: &AccountId) -> Result<Option<AccountRecord>, Error> {
        self.ensure_available()?;
        Ok(self.accounts.get(identifier).map(|r| r.clone()))
    }

    async fn create(&self, record: AccountRecord) -> Result<AccountRecord, Error> {
        self.ensure_available()?;
        match self.accounts.entry(record.identifier.clone()) {
            Entry::Occupied(_) => Err(Error::RecordAccess(RecordAccessError::Conflict(
                record.identifier.to_string(),
            ))),
            Entry::Vacant(vacant) => Ok(vacant.insert(record).clone()),
        }
    }

    async fn update(
        &self,
        identifier: &AccountId,
        update: AccountUpdate,
    ) -> Result<AccountRecord, Error> {
        self.ensure_available()?;
        let mut record = self
            .accounts
            .get_mut(identifier)
            .ok_or(Error::RecordAccess(RecordAccessError::NotFound))?;
        record.apply(&update);
        Ok(record.clone())
    }

    async fn register_failure(
        &self,
        identifier: &AccountId,
        threshold: u32,
    ) -> Result<FailureTransition, Error> {
        self.ensure_available()?;
        let transition = match self.accounts.entry(identifier.clone()) {
            Entry::Vacant(vacant) => {
                if threshold <= 1 {
                    let record = AccountRecord::locked_on_creation(identifier.clone());
                    FailureTransition::Locked(vacant.insert(record).clone())
                } else {
                    let record = AccountRecord::first_failure(identifier.clone());
                    FailureTransition::Counted(vacant.insert(record).clone())
                }
            }
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                match record.next_failure(threshold) {
                    None => FailureTransition::AlreadyLocked(record.clone()),
                    Some(update) => {
                        record.apply(&update);
                        if update.is_lock() {
                            FailureTransition::Locked(record.clone())
                        } else {
                            FailureTransition::Counted(record.clone())
                        }
                    }
                }
            }
        };
        Ok(transition)
    }

    async fn reset_failures(&self, identifier: &AccountId) -> Result<ResetTransition, Error> {
        self.ensure_available()?;
        let Some(mut record) = self.accounts.get_mut(identifier) else {
            return Ok(ResetTransition::Missing);
        };

        if record.locked {
            return Ok(ResetTransition::AlreadyLocked(record.clone()));
        }

        record.apply(&AccountUpdate::failed_attempts(0));
        Ok(ResetTransition::Reset(record.clone()))
    }

    async fn unlock(&self, identifier: &AccountId) -> Result<bool, Error> {
        self.ensure_available()?;
        let Some(mut record) = self.accounts.get_mut(identifier) else {
            return Ok(false);
        };

        let was_locked = record.locked;
        if was_locked {
            record.apply(&AccountUpdate::unlock());
        }
        Ok(was_locked)
    }

    async fn list_locked(&self) -> Result<Vec<AccountRecord>, Error> {
        self.ensure_available()?;
        let mut locked: Vec<AccountRecord> = self
            .accounts
            .iter()
            .filter(|r| r.locked)
            .map(|r| r.clone())
            .collect();
        locked.sort_by(|a, b| {
            b.locked_at
                .cmp(&a.locked_at)
                .then_with(|| a.identifier.as_str().cmp(b.identifier.as_str()))
        });
        Ok(locked)
    }
}

/// Repository provider backed by [`InMemoryAccountRepository`].
#[derive(Default)]
pub struct InMemoryRepositoryProvider {
    accounts: Arc<InMemoryAccountRepository>,
}

impl InMemoryRepositoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an existing repository, e.g. to seed or inspect it in tests.
    pub fn with_repository(accounts: Arc<InMemoryAccountRepository>) -> Self {
        Self { accounts }
    }
}

impl AccountRepositoryProvider for InMemoryRepositoryProvider {
    type AccountRepo = InMemoryAccountRepository;

    fn account(&self) -> &Self::AccountRepo {
        &self.accounts
    }
}

#[async_trait]
impl RepositoryProvider for InMemoryRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        self.accounts.ensure_available()?;
        tracing::debug!(accounts = self.accounts.len(), "In-memory store healthy");
        Ok(())
    }
}
