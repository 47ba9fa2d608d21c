//! Account records and lockout decisions
//!
//! An account record is the persisted lockout state for one identifier:
//!
//! | Field             | Type               | Description                                          |
//! | ----------------- | ------------------ | ---------------------------------------------------- |
//! | `identifier`      | `AccountId`        | Opaque key of the account (email or user id).        |
//! | `failed_attempts` | `u32`              | Consecutive failed sign-ins since the last reset.    |
//! | `locked`          | `bool`             | Whether sign-in is blocked until an admin unlocks.   |
//! | `locked_at`       | `Option<DateTime>` | When the account was last locked.                    |
//! | `created_at`      | `DateTime`         | When the record was created (first failure).         |
//! | `updated_at`      | `DateTime`         | When the record was last written.                    |
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::ValidationError, validation::validate_identifier};

/// Opaque key of an account record.
///
/// The value is used verbatim as the storage key. Construct it with
/// [`AccountId::parse`] to reject empty identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    /// Validate and wrap an identifier
    pub fn parse(identifier: &str) -> Result<Self, ValidationError> {
        validate_identifier(identifier)?;
        Ok(Self(identifier.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<&str> for AccountId {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<String> for AccountId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_identifier(&value)?;
        Ok(Self(value))
    }
}

impl From<AccountId> for String {
    fn from(value: AccountId) -> Self {
        value.0
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted lockout state for one account.
///
/// Documents written by older clients may omit `failed_attempts` and `locked`;
/// both default when deserialised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub identifier: AccountId,

    #[serde(default)]
    pub failed_attempts: u32,

    #[serde(default)]
    pub locked: bool,

    #[serde(default)]
    pub locked_at: Option<DateTime<Utc>>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl AccountRecord {
    /// A fresh record for the first failed attempt on an identifier.
    pub fn first_failure(identifier: AccountId) -> Self {
        let now = Utc::now();
        Self {
            identifier,
            failed_attempts: 1,
            locked: false,
            locked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A fresh record that is locked on creation (threshold of one).
    pub fn locked_on_creation(identifier: AccountId) -> Self {
        let now = Utc::now();
        Self {
            identifier,
            failed_attempts: 0,
            locked: true,
            locked_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update in place and bump `updated_at`.
    pub fn apply(&mut self, update: &AccountUpdate) {
        if let Some(failed_attempts) = update.failed_attempts {
            self.failed_attempts = failed_attempts;
        }
        if let Some(locked) = update.locked {
            self.locked = locked;
        }
        if let Some(locked_at) = update.locked_at {
            self.locked_at = locked_at;
        }
        self.updated_at = Utc::now();
    }

    /// Compute the failure transition for this record under `threshold`.
    ///
    /// Returns `None` when the record is already locked.
    pub fn next_failure(&self, threshold: u32) -> Option<AccountUpdate> {
        if self.locked {
            return None;
        }

        let next = self.failed_attempts.saturating_add(1);
        if next >= threshold {
            Some(AccountUpdate::lock())
        } else {
            Some(AccountUpdate::failed_attempts(next))
        }
    }
}

/// Partial update of an account record.
///
/// `None` leaves a field unchanged. `locked_at` is doubly optional so that it
/// can be cleared (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_attempts: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<Option<DateTime<Utc>>>,
}

impl AccountUpdate {
    pub fn failed_attempts(count: u32) -> Self {
        Self {
            failed_attempts: Some(count),
            ..Default::default()
        }
    }

    /// Lock the account and reset its counter.
    pub fn lock() -> Self {
        Self {
            failed_attempts: Some(0),
            locked: Some(true),
            locked_at: Some(Some(Utc::now())),
        }
    }

    /// Clear the lock and the counter.
    pub fn unlock() -> Self {
        Self {
            failed_attempts: Some(0),
            locked: Some(false),
            locked_at: Some(None),
        }
    }

    pub fn is_lock(&self) -> bool {
        self.locked == Some(true)
    }
}

/// What triggered a call to the lockout evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Gate before credential verification. Never mutates state.
    Check,
    /// Credential verification failed.
    Attempt,
    /// Credential verification succeeded.
    Success,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Check => write!(f, "check"),
            Outcome::Attempt => write!(f, "attempt"),
            Outcome::Success => write!(f, "success"),
        }
    }
}

/// Whether the caller may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockoutDecision {
    Locked,
    NotLocked,
}

impl LockoutDecision {
    pub fn is_locked(&self) -> bool {
        matches!(self, LockoutDecision::Locked)
    }
}

/// Result of an atomic failure registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureTransition {
    /// The record was already locked and was left untouched.
    AlreadyLocked(AccountRecord),
    /// The counter was incremented (or the record created) below the threshold.
    Counted(AccountRecord),
    /// This failure reached the threshold and locked the account.
    Locked(AccountRecord),
}

impl FailureTransition {
    pub fn record(&self) -> &AccountRecord {
        match self {
            FailureTransition::AlreadyLocked(record)
            | FailureTransition::Counted(record)
            | FailureTransition::Locked(record) => record,
        }
    }

    pub fn decision(&self) -> LockoutDecision {
        match self {
            FailureTransition::Counted(_) => LockoutDecision::NotLocked,
            FailureTransition::AlreadyLocked(_) | FailureTransition::Locked(_) => {
                LockoutDecision::Locked
            }
        }
    }
}

/// Result of an atomic counter reset after a successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetTransition {
    /// No record exists for the identifier; nothing was written.
    Missing,
    /// The record is locked and was left untouched.
    AlreadyLocked(AccountRecord),
    /// The counter was reset to zero.
    Reset(AccountRecord),
}

impl ResetTransition {
    pub fn decision(&self) -> LockoutDecision {
        match self {
            ResetTransition::AlreadyLocked(_) => LockoutDecision::Locked,
            ResetTransition::Missing | ResetTransition::Reset(_) => LockoutDecision::NotLocked,
        }
    }
}

/// Read-only view of an account's lockout state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutStatus {
    pub identifier: String,
    pub failed_attempts: u32,
    pub is_locked: bool,
    pub locked_at: Option<DateTime<Utc>>,
    /// Failures left before the account locks; zero when locked.
    pub remaining_attempts: u32,
}

impl LockoutStatus {
    pub fn unlocked(identifier: &str, threshold: u32) -> Self {
        Self {
            identifier: identifier.to_string(),
            failed_attempts: 0,
            is_locked: false,
            locked_at: None,
            remaining_attempts: threshold,
        }
    }

    pub fn from_record(record: &AccountRecord, threshold: u32) -> Self {
        let remaining_attempts = if record.locked {
            0
        } else {
            threshold.saturating_sub(record.failed_attempts)
        };

        Self {
            identifier: record.identifier.to_string(),
            failed_attempts: record.failed_attempts,
            is_locked: record.locked,
            locked_at: record.locked_at,
            remaining_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> AccountId {
        AccountId::parse(s).unwrap()
    }

    #[test]
    fn test_account_id_rejects_empty() {
        assert!(AccountId::parse("").is_err());
        assert!(AccountId::try_from(String::new()).is_err());
        assert_eq!(AccountId::parse("u1").unwrap().as_str(), "u1");
    }

    #[test]
    fn test_record_defaults_when_fields_absent() {
        let record: AccountRecord =
            serde_json::from_str(r#"{ "identifier": "u1" }"#).expect("partial document");
        assert_eq!(record.failed_attempts, 0);
        assert!(!record.locked);
        assert!(record.locked_at.is_none());
    }

    #[test]
    fn test_record_reads_camel_case_document() {
        let record: AccountRecord = serde_json::from_str(
            r#"{ "identifier": "u2", "failedAttempts": 2, "locked": true }"#,
        )
        .unwrap();
        assert_eq!(record.identifier, id("u2"));
        assert_eq!(record.failed_attempts, 2);
        assert!(record.locked);
    }

    #[test]
    fn test_record_rejects_empty_identifier() {
        let record: Result<AccountRecord, _> = serde_json::from_str(r#"{ "identifier": "" }"#);
        assert!(record.is_err());
    }

    #[test]
    fn test_record_rejects_negative_counter() {
        let record: Result<AccountRecord, _> =
            serde_json::from_str(r#"{ "identifier": "u3", "failedAttempts": -1 }"#);
        assert!(record.is_err());
    }

    #[test]
    fn test_next_failure_below_threshold() {
        let record = AccountRecord::first_failure(id("u1"));
        let update = record.next_failure(3).unwrap();
        assert_eq!(update.failed_attempts, Some(2));
        assert!(!update.is_lock());
    }

    #[test]
    fn test_next_failure_reaches_threshold() {
        let mut record = AccountRecord::first_failure(id("u1"));
        record.failed_attempts = 2;
        let update = record.next_failure(3).unwrap();
        assert!(update.is_lock());
        assert_eq!(update.failed_attempts, Some(0));
    }

    #[test]
    fn test_next_failure_on_locked_record() {
        let record = AccountRecord::locked_on_creation(id("u1"));
        assert!(record.next_failure(3).is_none());
    }

    #[test]
    fn test_apply_partial_update() {
        let mut record = AccountRecord::first_failure(id("u1"));
        record.apply(&AccountUpdate::lock());
        assert!(record.locked);
        assert_eq!(record.failed_attempts, 0);
        assert!(record.locked_at.is_some());

        record.apply(&AccountUpdate::unlock());
        assert!(!record.locked);
        assert!(record.locked_at.is_none());

        // Empty update only touches updated_at
        let before = record.clone();
        record.apply(&AccountUpdate::default());
        assert_eq!(record.failed_attempts, before.failed_attempts);
        assert_eq!(record.locked, before.locked);
    }

    #[test]
    fn test_update_serializes_only_set_fields() {
        let json = serde_json::to_value(AccountUpdate::failed_attempts(4)).unwrap();
        assert_eq!(json, serde_json::json!({ "failedAttempts": 4 }));
    }

    #[test]
    fn test_status_remaining_attempts() {
        let mut record = AccountRecord::first_failure(id("u1"));
        let status = LockoutStatus::from_record(&record, 3);
        assert_eq!(status.remaining_attempts, 2);
        assert!(!status.is_locked);

        record.apply(&AccountUpdate::lock());
        let status = LockoutStatus::from_record(&record, 3);
        assert_eq!(status.remaining_attempts, 0);
        assert!(status.is_locked);
    }

    #[test]
    fn test_transition_decisions() {
        let record = AccountRecord::first_failure(id("u1"));
        assert_eq!(
            FailureTransition::Counted(record.clone()).decision(),
            LockoutDecision::NotLocked
        );
        assert_eq!(
            FailureTransition::Locked(record.clone()).decision(),
            LockoutDecision::Locked
        );
        assert_eq!(
            ResetTransition::AlreadyLocked(record).decision(),
            LockoutDecision::Locked
        );
        assert_eq!(ResetTransition::Missing.decision(), LockoutDecision::NotLocked);
    }
}
