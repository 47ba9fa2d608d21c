use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::EventError;

/// Security events emitted by the lockout service
///
/// Events carry the identifier they concern and when they happened. They are
/// meant for audit logging and alerting; a failing handler never changes a
/// lockout decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A failed sign-in was counted and the account is still unlocked.
    LoginFailed {
        /// The identifier that was attempted
        identifier: String,
        /// Consecutive failures after this one
        failed_attempts: u32,
        /// When the attempt occurred
        timestamp: DateTime<Utc>,
    },

    /// A failed sign-in reached the threshold and locked the account.
    ///
    /// This is a security-critical event that should trigger alerts.
    AccountLocked {
        /// The identifier that was locked
        identifier: String,
        /// The threshold that was reached
        threshold: u32,
        /// When the lockout was triggered
        timestamp: DateTime<Utc>,
    },

    /// A call was refused because the account is already locked.
    LockedAttemptRejected {
        identifier: String,
        timestamp: DateTime<Utc>,
    },

    /// An administrator unlocked the account.
    AccountUnlocked {
        identifier: String,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn identifier(&self) -> &str {
        match self {
            Event::LoginFailed { identifier, .. }
            | Event::AccountLocked { identifier, .. }
            | Event::LockedAttemptRejected { identifier, .. }
            | Event::AccountUnlocked { identifier, .. } => identifier,
        }
    }
}

/// A trait for handling events emitted by the event bus
///
/// Implementors of this trait can be registered with the [`EventBus`] to receive and process events.
///
/// # Examples
///
/// ```
/// # use turnstile_core::events::{Event, EventHandler};
/// # use turnstile_core::error::EventError;
/// # use async_trait::async_trait;
/// struct AuditLog;
///
/// #[async_trait]
/// impl EventHandler for AuditLog {
///     async fn handle_event(&self, event: &Event) -> Result<(), EventError> {
///         println!("{event:?}");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle_event(&self, event: &Event) -> Result<(), EventError>;
}

/// Event bus that fans events out to registered handlers
#[derive(Clone)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register an event handler with the event bus
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().await.push(handler);
    }

    /// Emit an event to all registered handlers
    ///
    /// Stops at the first handler error and returns it.
    pub async fn emit(&self, event: &Event) -> Result<(), EventError> {
        for handler in self.handlers.read().await.iter() {
            handler.handle_event(event).await?;
        }

        Ok(())
    }
}
