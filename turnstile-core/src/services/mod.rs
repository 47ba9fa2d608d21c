//! Service layer for business logic
//!
//! This module contains the lockout evaluator and the sign-in flow built on it.

pub mod lockout;
pub mod sign_in;

pub use lockout::LockoutService;
pub use sign_in::{CredentialVerifier, SignInService};
