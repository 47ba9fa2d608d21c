pub mod utilities;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Record access error: {0}")]
    RecordAccess(#[from] RecordAccessError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),
}

/// Failure to read or write an account record.
///
/// These are always propagated to the caller. The lockout service never turns
/// a store failure into a locked or unlocked decision on its own.
#[derive(Debug, Error)]
pub enum RecordAccessError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Malformed record: {0}")]
    Malformed(String),

    #[error("Record not found")]
    NotFound,

    #[error("Record already exists: {0}")]
    Conflict(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Account locked")]
    AccountLocked,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Credential verifier failed: {0}")]
    Verifier(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingIdentifier(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid lockout threshold: {0}")]
    InvalidThreshold(u32),
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Event bus error: {0}")]
    BusError(String),

    #[error("Event handler error: {0}")]
    HandlerError(String),
}

impl Error {
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    pub fn is_locked_error(&self) -> bool {
        matches!(self, Error::Auth(AuthError::AccountLocked))
    }

    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub fn is_record_access_error(&self) -> bool {
        matches!(self, Error::RecordAccess(_))
    }
}
