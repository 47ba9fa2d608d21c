use crate::error::ValidationError;

/// Validation utilities for account identifiers and lockout configuration.
///
/// Identifiers are opaque: they are never normalised, lower-cased or parsed.
/// The only requirements are that they carry at least one visible character
/// and fit the storage column.
pub const MAX_IDENTIFIER_LENGTH: usize = 320;

/// Validates an account identifier
///
/// # Arguments
///
/// * `identifier` - The opaque account key (an email address or a user id)
///
/// # Returns
///
/// Returns `Ok(())` if the identifier is usable, or a `ValidationError` otherwise.
///
/// # Examples
///
/// ```rust
/// use turnstile_core::validation::validate_identifier;
///
/// assert!(validate_identifier("user@example.com").is_ok());
/// assert!(validate_identifier("").is_err());
/// ```
pub fn validate_identifier(identifier: &str) -> Result<(), ValidationError> {
    if identifier.is_empty() {
        return Err(ValidationError::MissingIdentifier(
            "Identifier is required".to_string(),
        ));
    }

    if identifier.trim().is_empty() {
        return Err(ValidationError::InvalidIdentifier(
            "Identifier cannot be blank".to_string(),
        ));
    }

    if identifier.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::InvalidIdentifier(format!(
            "Identifier cannot exceed {MAX_IDENTIFIER_LENGTH} bytes"
        )));
    }

    if identifier.chars().any(char::is_control) {
        return Err(ValidationError::InvalidIdentifier(
            "Identifier cannot contain control characters".to_string(),
        ));
    }

    Ok(())
}

/// Validates a lockout threshold
///
/// A threshold of zero would lock accounts that have never failed, so the
/// smallest accepted value is one.
pub fn validate_threshold(threshold: u32) -> Result<(), ValidationError> {
    if threshold == 0 {
        return Err(ValidationError::InvalidThreshold(threshold));
    }
    Ok(())
}
