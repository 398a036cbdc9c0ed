//! Error types for event delivery.

use thiserror::Error;

/// Errors that can occur while subscribing to or handling events.
#[derive(Error, Debug)]
pub enum EventError {
    /// No subscription with this id.
    #[error("subscription not found: {0}")]
    NotFound(u64),

    /// A handler rejected an event.
    #[error("handler failed: {0}")]
    Handler(String),

    /// Lock poisoned (thread panicked while holding lock).
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Result type alias for event operations.
pub type Result<T> = std::result::Result<T, EventError>;
