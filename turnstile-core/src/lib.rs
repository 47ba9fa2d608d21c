//! Core functionality for turnstile
//!
//! This crate contains the account lockout policy: the persisted
//! [`AccountRecord`], the [`LockoutService`] that decides on every sign-in
//! attempt whether the caller may proceed, and the [`SignInService`] that wires
//! the policy around a [`CredentialVerifier`].
//!
//! Storage backends implement [`repositories::AccountRepository`] and
//! [`RepositoryProvider`]. An in-memory backend ships in
//! [`repositories::memory`].
pub mod account;
pub mod config;
pub mod error;
pub mod events;
pub mod repositories;
pub mod services;
pub mod validation;

pub use account::{
    AccountId, AccountRecord, AccountUpdate, FailureTransition, LockoutDecision, LockoutStatus,
    Outcome, ResetTransition,
};
pub use config::{CounterUpdate, FailurePolicy, LockoutConfig};
pub use error::Error;
pub use events::{Event, EventBus, EventHandler};
pub use repositories::RepositoryProvider;
pub use services::{CredentialVerifier, LockoutService, SignInService};
