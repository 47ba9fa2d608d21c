//! Sign-in flow through the facade with a stub credential verifier

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use turnstile::{
    CredentialVerifier, FailurePolicy, InMemoryAccountRepository, InMemoryRepositoryProvider,
    Turnstile, TurnstileBuilder, TurnstileError,
};

#[derive(Debug, Clone, PartialEq)]
struct User {
    email: String,
}

struct PasswordTable {
    passwords: HashMap<&'static str, &'static str>,
    calls: AtomicUsize,
}

impl PasswordTable {
    fn new() -> Self {
        Self {
            passwords: HashMap::from([("test@example.com", "password")]),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialVerifier for PasswordTable {
    type Principal = User;

    async fn verify(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<Option<User>, turnstile_core::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(match self.passwords.get(identifier) {
            Some(password) if *password == secret => Some(User {
                email: identifier.to_string(),
            }),
            _ => None,
        })
    }
}

async fn setup() -> (Turnstile<InMemoryRepositoryProvider>, Arc<PasswordTable>) {
    let turnstile = TurnstileBuilder::new()
        .with_memory()
        .build()
        .await
        .expect("Failed to build Turnstile");
    (turnstile, Arc::new(PasswordTable::new()))
}

#[tokio::test]
async fn test_sign_in_success() {
    let (turnstile, verifier) = setup().await;
    let user = turnstile
        .sign_in(verifier, "test@example.com", "password")
        .await
        .unwrap();
    assert_eq!(user.email, "test@example.com");
}

#[tokio::test]
async fn test_sign_in_locks_after_three_failures() {
    let (turnstile, verifier) = setup().await;

    for _ in 0..2 {
        let result = turnstile
            .sign_in(verifier.clone(), "test@example.com", "wrong")
            .await;
        assert!(matches!(result, Err(TurnstileError::InvalidCredentials)));
    }
    let result = turnstile
        .sign_in(verifier.clone(), "test@example.com", "wrong")
        .await;
    assert!(matches!(result, Err(TurnstileError::AccountLocked)));

    // The right password no longer helps, and the verifier is not consulted
    let result = turnstile
        .sign_in(verifier.clone(), "test@example.com", "password")
        .await;
    assert!(matches!(result, Err(TurnstileError::AccountLocked)));
    assert_eq!(verifier.calls(), 3);

    turnstile.unlock_account("test@example.com").await.unwrap();
    turnstile
        .sign_in(verifier, "test@example.com", "password")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_success_restarts_the_count() {
    let (turnstile, verifier) = setup().await;
    let service = turnstile.sign_in_service(verifier);

    for _ in 0..2 {
        assert!(service.sign_in("test@example.com", "wrong").await.is_err());
    }
    service.sign_in("test@example.com", "password").await.unwrap();
    for _ in 0..2 {
        assert!(service.sign_in("test@example.com", "wrong").await.is_err());
    }

    assert!(!turnstile.is_locked("test@example.com").await.unwrap());
}

#[tokio::test]
async fn test_fail_open_when_store_unavailable() {
    let accounts = Arc::new(InMemoryAccountRepository::new());
    let provider = Arc::new(InMemoryRepositoryProvider::with_repository(accounts.clone()));
    let verifier = Arc::new(PasswordTable::new());

    let fail_open = TurnstileBuilder::new()
        .with_repositories(provider.clone())
        .with_failure_policy(FailurePolicy::FailOpen)
        .build()
        .await
        .unwrap();
    let fail_closed = TurnstileBuilder::new()
        .with_repositories(provider)
        .build()
        .await
        .unwrap();

    accounts.set_unavailable(true);

    fail_open
        .sign_in(verifier.clone(), "test@example.com", "password")
        .await
        .unwrap();

    let result = fail_closed
        .sign_in(verifier, "test@example.com", "password")
        .await;
    assert!(matches!(result, Err(TurnstileError::StorageError(_))));
}
