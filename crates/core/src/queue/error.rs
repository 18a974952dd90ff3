//! Queue operation errors.

use thiserror::Error;

use crate::store::StoreError;

/// Error type for queue lifecycle operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The owner already holds a live ticket in this scope.
    /// User-recoverable: show the existing ticket instead.
    #[error("owner {0} already holds a ticket in this queue")]
    AlreadyJoined(String),

    /// The referenced ticket does not exist (or is already gone).
    #[error("ticket not found: {0}")]
    NotFound(String),

    /// The presented token does not match the ticket's stored token.
    /// Terminal for the caller; rejoin to obtain a new ticket.
    #[error("active token mismatch")]
    InvalidToken,

    /// The ticket is not in the Active state (never promoted, already
    /// completed, or expired). Terminal for the caller.
    #[error("ticket is not active")]
    NotActive,

    /// Joins are rejected while the queue is paused (only under the
    /// reject join policy; the default policy enqueues instead).
    #[error("queue is paused")]
    Paused,

    /// Transient store failure; retry with backoff where idempotent.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueueError {
    /// Returns true for errors the caller may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::Store(StoreError::Unavailable(_)))
    }
}
