//! Sign-in flow guarded by account lockout.
//!
//! [`SignInService`] runs the caller protocol around a [`CredentialVerifier`]:
//!
//! 1. Gate with [`Outcome::Check`]; a locked account is rejected before the
//!    verifier runs.
//! 2. Verify the credentials.
//! 3. On failure, count the attempt with [`Outcome::Attempt`].
//! 4. On success, clear the counter with [`Outcome::Success`].
use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    Error,
    account::{LockoutDecision, Outcome},
    config::FailurePolicy,
    error::AuthError,
    repositories::AccountRepository,
    services::LockoutService,
};

/// Verifies an identifier and secret against the authentication provider.
#[async_trait]
pub trait CredentialVerifier: Send + Sync + 'static {
    /// What a successful verification yields (a user, a claims set, ...)
    type Principal: Send;

    /// Verify credentials.
    ///
    /// # Returns
    ///
    /// `Ok(Some(principal))` when the credentials are valid, `Ok(None)` when
    /// they are not, and `Err` when the provider itself failed. Only `Ok(None)`
    /// counts as a failed attempt.
    async fn verify(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<Option<Self::Principal>, Error>;
}

/// Service that signs users in through a verifier while enforcing lockout.
pub struct SignInService<R: AccountRepository, V: CredentialVerifier> {
    lockout: Arc<LockoutService<R>>,
    verifier: Arc<V>,
}

impl<R: AccountRepository, V: CredentialVerifier> SignInService<R, V> {
    pub fn new(lockout: Arc<LockoutService<R>>, verifier: Arc<V>) -> Self {
        Self { lockout, verifier }
    }

    pub fn lockout(&self) -> &LockoutService<R> {
        &self.lockout
    }

    /// Sign in with an identifier and secret.
    ///
    /// # Errors
    ///
    /// - `AuthError::AccountLocked` if the account is locked, or this failure locked it
    /// - `AuthError::InvalidCredentials` for a failure below the threshold
    /// - Verifier errors, unchanged and without counting an attempt
    /// - `RecordAccessError` from the store, unless the policy is fail-open
    pub async fn sign_in(&self, identifier: &str, secret: &str) -> Result<V::Principal, Error> {
        if self.gate(identifier, Outcome::Check).await?.is_locked() {
            return Err(Error::Auth(AuthError::AccountLocked));
        }

        let Some(principal) = self.verifier.verify(identifier, secret).await? else {
            return match self.gate(identifier, Outcome::Attempt).await? {
                LockoutDecision::Locked => Err(Error::Auth(AuthError::AccountLocked)),
                LockoutDecision::NotLocked => Err(Error::Auth(AuthError::InvalidCredentials)),
            };
        };

        if self.gate(identifier, Outcome::Success).await?.is_locked() {
            // Locked by a concurrent sign-in between the gate and this reset
            return Err(Error::Auth(AuthError::AccountLocked));
        }

        Ok(principal)
    }

    /// Run one lockout step, applying the configured failure policy to store errors.
    async fn gate(&self, identifier: &str, outcome: Outcome) -> Result<LockoutDecision, Error> {
        match self.lockout.check_and_lock(identifier, outcome).await {
            Err(e) if e.is_record_access_error() => match self.lockout.config().failure_policy {
                FailurePolicy::FailClosed => {
                    tracing::error!(
                        error = %e,
                        identifier,
                        %outcome,
                        "Account store unavailable, rejecting sign-in"
                    );
                    Err(e)
                }
                FailurePolicy::FailOpen => {
                    tracing::warn!(
                        error = %e,
                        identifier,
                        %outcome,
                        "Account store unavailable, continuing without lockout"
                    );
                    Ok(LockoutDecision::NotLocked)
                }
            },
            other => other,
        }
    }
}
