use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    Error,
    account::{AccountId, AccountRecord, AccountUpdate, FailureTransition, ResetTransition},
    repositories::{AccountRepository, RepositoryProvider},
};

/// Adapter that wraps a RepositoryProvider and implements [`AccountRepository`]
pub struct AccountRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> AccountRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> AccountRepository for AccountRepositoryAdapter<R> {
    async fn get(&self, identifier: &AccountId) -> Result<Option<AccountRecord>, Error> {
        self.provider.account().get(identifier).await
    }

    async fn create(&self, record: AccountRecord) -> Result<AccountRecord, Error> {
        self.provider.account().create(record).await
    }

    async fn update(
        &self,
        identifier: &AccountId,
        update: AccountUpdate,
    ) -> Result<AccountRecord, Error> {
        self.provider.account().update(identifier, update).await
    }

    async fn register_failure(
        &self,
        identifier: &AccountId,
        threshold: u32,
    ) -> Result<FailureTransition, Error> {
        self.provider
            .account()
            .register_failure(identifier, threshold)
            .await
    }

    async fn reset_failures(&self, identifier: &AccountId) -> Result<ResetTransition, Error> {
        self.provider.account().reset_failures(identifier).await
    }

    async fn unlock(&self, identifier: &AccountId) -> Result<bool, Error> {
        self.provider.account().unlock(identifier).await
    }

    async fn list_locked(&self) -> Result<Vec<AccountRecord>, Error> {
        self.provider.account().list_locked().await
    }
}
