use crate::{Error, error::RecordAccessError};

/// Extension trait for Result types to simplify database error mapping
///
/// Storage backends use this to turn driver errors into [`RecordAccessError`]
/// values with a stable message, logging the underlying error once.
///
/// # Example
///
/// ```rust,ignore
/// use turnstile_core::error::utilities::DatabaseResultExt;
///
/// query.execute(&pool).await.map_db_err_with_context("Failed to unlock account")?;
/// ```
pub trait DatabaseResultExt<T> {
    /// Convert a database error to a record access error
    fn map_db_err(self) -> Result<T, Error>;

    /// Convert a database error to a record access error with a fixed message
    ///
    /// The driver error is logged, not returned, so callers never see
    /// backend-specific text.
    fn map_db_err_with_context(self, context: &str) -> Result<T, Error>;
}

impl<T, E: std::fmt::Display> DatabaseResultExt<T> for Result<T, E> {
    fn map_db_err(self) -> Result<T, Error> {
        self.map_err(|e| Error::RecordAccess(RecordAccessError::Database(e.to_string())))
    }

    fn map_db_err_with_context(self, context: &str) -> Result<T, Error> {
        self.map_err(|e| {
            tracing::error!(error = %e, "{context}");
            Error::RecordAccess(RecordAccessError::Database(context.to_string()))
        })
    }
}
