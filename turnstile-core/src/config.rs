//! Lockout policy configuration
//!
//! # Example
//!
//! ```rust
//! use turnstile_core::config::{CounterUpdate, FailurePolicy, LockoutConfig};
//!
//! let config = LockoutConfig::default()
//!     .with_threshold(2)
//!     .with_counter_update(CounterUpdate::ReadModifyWrite)
//!     .with_failure_policy(FailurePolicy::FailOpen);
//!
//! assert!(config.validate().is_ok());
//! ```
use serde::{Deserialize, Serialize};

use crate::{error::ValidationError, validation::validate_threshold};

/// Default number of consecutive failures that locks an account.
pub const DEFAULT_LOCKOUT_THRESHOLD: u32 = 3;

/// How failure counters are written to the repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterUpdate {
    /// One conditional write performs the increment and the threshold comparison.
    #[default]
    Atomic,
    /// Separate read then create/update calls.
    ///
    /// Two concurrent failures for the same identifier can both read `n` and
    /// both write `n + 1`, undercounting.
    ReadModifyWrite,
}

/// What a sign-in does when the account store cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Reject the sign-in and surface the store error.
    #[default]
    FailClosed,
    /// Log the store error and treat the account as unlocked.
    FailOpen,
}

/// Configuration for account lockout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutConfig {
    /// Whether lockout is enforced at all
    pub enabled: bool,
    /// Consecutive failed attempts that lock an account (at least 1)
    pub lockout_threshold: u32,
    /// How the failure counter is persisted
    pub counter_update: CounterUpdate,
    /// Fail-open or fail-closed handling of store errors during sign-in
    pub failure_policy: FailurePolicy,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lockout_threshold: DEFAULT_LOCKOUT_THRESHOLD,
            counter_update: CounterUpdate::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl LockoutConfig {
    /// A configuration that never locks and never writes.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.lockout_threshold = threshold;
        self
    }

    pub fn with_counter_update(mut self, counter_update: CounterUpdate) -> Self {
        self.counter_update = counter_update;
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_threshold(self.lockout_threshold)
    }
}
