//! Account lockout service.
//!
//! This module implements the per-account failure budget that gates credential
//! verification. Each account has two states:
//!
//! - `UNLOCKED(n)`: `n` consecutive failures so far
//! - `LOCKED`: terminal until an administrator unlocks the account
//!
//! `UNLOCKED(n) -> LOCKED` fires when `n + 1` reaches the configured threshold,
//! and the counter resets to zero at that point. A successful sign-in resets
//! the counter of an unlocked account.
//!
//! # Example
//!
//! ```rust,ignore
//! use turnstile_core::account::Outcome;
//! use turnstile_core::config::LockoutConfig;
//! use turnstile_core::services::LockoutService;
//!
//! let service = LockoutService::new(repository, LockoutConfig::default());
//!
//! // Gate before verifying credentials
//! if service.check_and_lock("user@example.com", Outcome::Check).await?.is_locked() {
//!     // Reject with a generic "account locked" message
//! }
//!
//! // Record a failed verification
//! let decision = service.check_and_lock("user@example.com", Outcome::Attempt).await?;
//! ```

use std::sync::Arc;

use chrono::Utc;

use crate::{
    Error,
    account::{
        AccountId, AccountRecord, AccountUpdate, FailureTransition, LockoutDecision, LockoutStatus,
        Outcome, ResetTransition,
    },
    config::{CounterUpdate, LockoutConfig},
    error::RecordAccessError,
    events::{Event, EventBus},
    repositories::AccountRepository,
};

/// Service that evaluates and maintains account lockout state.
///
/// # Thread Safety
///
/// The service is `Send + Sync` and can be shared across tasks. In
/// [`CounterUpdate::Atomic`] mode concurrent failures for one identifier are
/// never lost; in [`CounterUpdate::ReadModifyWrite`] mode they can be.
pub struct LockoutService<R: AccountRepository> {
    repository: Arc<R>,
    config: LockoutConfig,
    event_bus: Option<EventBus>,
}

impl<R: AccountRepository> LockoutService<R> {
    /// Create a new LockoutService.
    ///
    /// # Arguments
    ///
    /// * `repository` - The repository holding account records
    /// * `config` - Lockout configuration; validate it with [`LockoutConfig::validate`] first
    ///
    /// The configuration is taken as given. A `lockout_threshold` of 0 is not
    /// rejected here and behaves like 1: the first failure locks the account.
    pub fn new(repository: Arc<R>, config: LockoutConfig) -> Self {
        Self {
            repository,
            config,
            event_bus: None,
        }
    }

    /// Emit security events to the given bus.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Get the current configuration.
    pub fn config(&self) -> &LockoutConfig {
        &self.config
    }

    /// Check if lockout is enforced.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Decide whether the caller may proceed and update the failure counter.
    ///
    /// # Arguments
    ///
    /// * `identifier` - Opaque account key; must not be empty
    /// * `outcome` - What triggered this call
    ///
    /// # Returns
    ///
    /// [`LockoutDecision::Locked`] if the account is (or just became) locked.
    /// Store failures are returned as errors and never turned into a decision.
    pub async fn check_and_lock(
        &self,
        identifier: &str,
        outcome: Outcome,
    ) -> Result<LockoutDecision, Error> {
        let id = AccountId::parse(identifier)?;

        if !self.config.enabled {
            return Ok(LockoutDecision::NotLocked);
        }

        match outcome {
            Outcome::Check => self.check(&id).await,
            Outcome::Attempt => self.record_failure(&id).await,
            Outcome::Success => self.record_success(&id).await,
        }
    }

    /// Get the current lockout status for an identifier.
    ///
    /// Never writes. If lockout is disabled, always reports an unlocked status.
    pub async fn lockout_status(&self, identifier: &str) -> Result<LockoutStatus, Error> {
        let id = AccountId::parse(identifier)?;
        let threshold = self.config.lockout_threshold;

        if !self.config.enabled {
            return Ok(LockoutStatus::unlocked(identifier, threshold));
        }

        Ok(match self.repository.get(&id).await? {
            Some(record) => LockoutStatus::from_record(&record, threshold),
            None => LockoutStatus::unlocked(identifier, threshold),
        })
    }

    /// Check if an account is currently locked (convenience method).
    pub async fn is_locked(&self, identifier: &str) -> Result<bool, Error> {
        Ok(self.lockout_status(identifier).await?.is_locked)
    }

    /// Unlock an account (administrative action).
    ///
    /// Clears the lock and the failure counter.
    ///
    /// # Returns
    ///
    /// `true` if the account was previously locked, `false` otherwise.
    pub async fn unlock_account(&self, identifier: &str) -> Result<bool, Error> {
        let id = AccountId::parse(identifier)?;
        let was_locked = self.repository.unlock(&id).await?;

        if was_locked {
            tracing::info!(identifier = %id, "Account unlocked");
            self.emit(Event::AccountUnlocked {
                identifier: id.into_inner(),
                timestamp: Utc::now(),
            })
            .await;
        }

        Ok(was_locked)
    }

    /// All currently locked accounts, most recently locked first.
    pub async fn locked_accounts(&self) -> Result<Vec<AccountRecord>, Error> {
        self.repository.list_locked().await
    }

    async fn check(&self, id: &AccountId) -> Result<LockoutDecision, Error> {
        match self.repository.get(id).await? {
            Some(record) if record.locked => {
                self.reject_locked(id).await;
                Ok(LockoutDecision::Locked)
            }
            _ => Ok(LockoutDecision::NotLocked),
        }
    }

    async fn record_failure(&self, id: &AccountId) -> Result<LockoutDecision, Error> {
        let threshold = self.config.lockout_threshold;
        let transition = match self.config.counter_update {
            CounterUpdate::Atomic => self.repository.register_failure(id, threshold).await?,
            CounterUpdate::ReadModifyWrite => self.record_failure_unguarded(id, threshold).await?,
        };

        match &transition {
            FailureTransition::AlreadyLocked(_) => {
                self.reject_locked(id).await;
            }
            FailureTransition::Counted(record) => {
                tracing::debug!(
                    identifier = %id,
                    failed_attempts = record.failed_attempts,
                    threshold,
                    "Failed sign-in counted"
                );
                self.emit(Event::LoginFailed {
                    identifier: id.to_string(),
                    failed_attempts: record.failed_attempts,
                    timestamp: Utc::now(),
                })
                .await;
            }
            FailureTransition::Locked(_) => {
                tracing::info!(identifier = %id, threshold, "Account locked");
                self.emit(Event::AccountLocked {
                    identifier: id.to_string(),
                    threshold,
                    timestamp: Utc::now(),
                })
                .await;
            }
        }

        Ok(transition.decision())
    }

    /// Separate read then write, as a plain document store would do it.
    ///
    /// Concurrent callers can overwrite each other's increments. A lost race
    /// undercounts; it never surfaces as an error.
    async fn record_failure_unguarded(
        &self,
        id: &AccountId,
        threshold: u32,
    ) -> Result<FailureTransition, Error> {
        if let Some(record) = self.repository.get(id).await? {
            return self.apply_failure(record, threshold).await;
        }

        let record = if threshold <= 1 {
            AccountRecord::locked_on_creation(id.clone())
        } else {
            AccountRecord::first_failure(id.clone())
        };

        match self.repository.create(record.clone()).await {
            Ok(created) if created.locked => Ok(FailureTransition::Locked(created)),
            Ok(created) => Ok(FailureTransition::Counted(created)),
            Err(Error::RecordAccess(RecordAccessError::Conflict(_))) => {
                tracing::debug!(identifier = %id, "Record created concurrently, counting against it");
                match self.repository.get(id).await? {
                    Some(existing) => self.apply_failure(existing, threshold).await,
                    // Removed again before the re-read
                    None => Ok(FailureTransition::Counted(record)),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn apply_failure(
        &self,
        record: AccountRecord,
        threshold: u32,
    ) -> Result<FailureTransition, Error> {
        let Some(update) = record.next_failure(threshold) else {
            return Ok(FailureTransition::AlreadyLocked(record));
        };

        let locks = update.is_lock();
        let updated = match self.repository.update(&record.identifier, update.clone()).await {
            Ok(updated) => updated,
            Err(Error::RecordAccess(RecordAccessError::NotFound)) => {
                tracing::debug!(identifier = %record.identifier, "Record removed before update, failure not stored");
                let mut stale = record;
                stale.apply(&update);
                stale
            }
            Err(e) => return Err(e),
        };

        Ok(if locks {
            FailureTransition::Locked(updated)
        } else {
            FailureTransition::Counted(updated)
        })
    }

    async fn record_success(&self, id: &AccountId) -> Result<LockoutDecision, Error> {
        let transition = match self.config.counter_update {
            CounterUpdate::Atomic => self.repository.reset_failures(id).await?,
            CounterUpdate::ReadModifyWrite => match self.repository.get(id).await? {
                None => ResetTransition::Missing,
                Some(record) if record.locked => ResetTransition::AlreadyLocked(record),
                Some(record) if record.failed_attempts == 0 => ResetTransition::Reset(record),
                Some(_) => match self
                    .repository
                    .update(id, AccountUpdate::failed_attempts(0))
                    .await
                {
                    Ok(updated) => ResetTransition::Reset(updated),
                    Err(Error::RecordAccess(RecordAccessError::NotFound)) => {
                        ResetTransition::Missing
                    }
                    Err(e) => return Err(e),
                },
            },
        };

        match &transition {
            ResetTransition::AlreadyLocked(_) => self.reject_locked(id).await,
            ResetTransition::Reset(_) => {
                tracing::debug!(identifier = %id, "Failed sign-in counter reset");
            }
            ResetTransition::Missing => {}
        }

        Ok(transition.decision())
    }

    async fn reject_locked(&self, id: &AccountId) {
        tracing::debug!(identifier = %id, "Rejected call for locked account");
        self.emit(Event::LockedAttemptRejected {
            identifier: id.to_string(),
            timestamp: Utc::now(),
        })
        .await;
    }

    async fn emit(&self, event: Event) {
        if let Some(event_bus) = &self.event_bus {
            if let Err(e) = event_bus.emit(&event).await {
                tracing::warn!(
                    error = %e,
                    identifier = event.identifier(),
                    "Failed to deliver lockout event"
                );
            }
        }
    }
}
