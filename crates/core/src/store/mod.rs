//! Queue store: atomic, race-free primitives over shared queue state.
//!
//! The store never encodes queue policy. Every method is atomic with
//! respect to concurrent callers on the same scope; multi-structure
//! operations (promotion claims, purges) either use a single critical
//! section (memory backend) or a transaction (SQLite backend).

mod memory;
mod sqlite;

pub use memory::MemoryQueueStore;
pub use sqlite::SqliteQueueStore;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::queue::TicketRecord;
use crate::scope::ScopeId;

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The ticket is already present in the ordering.
    #[error("ticket already queued: {0}")]
    AlreadyQueued(String),

    /// The referenced ticket does not exist.
    #[error("ticket not found: {0}")]
    NotFound(String),

    /// Transient backend failure. Retryable for idempotent operations
    /// (remove, purge); surfaced to the caller for non-idempotent ones.
    #[error("queue store unavailable: {0}")]
    Unavailable(String),
}

/// Trait for queue storage backends.
///
/// One instance serves every scope; all keys are namespaced by
/// [`ScopeId`]. Methods are synchronous: both backends resolve in
/// microseconds and are called from async contexts without yielding.
pub trait QueueStore: Send + Sync {
    // ------------------------------------------------------------------
    // Waiting ordering
    // ------------------------------------------------------------------

    /// Insert a ticket into the waiting ordering.
    ///
    /// Ordering is by `joined_at`, ties broken by insertion order.
    /// Fails with [`StoreError::AlreadyQueued`] if the ticket is
    /// already present.
    fn enqueue(
        &self,
        scope: &ScopeId,
        ticket_id: &str,
        joined_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Zero-based position among waiting tickets, or None if absent.
    fn rank_of(&self, scope: &ScopeId, ticket_id: &str) -> Result<Option<u64>, StoreError>;

    /// Remove and return the lowest-ordered ticket id, or None if the
    /// ordering is empty. Remove-and-return is a single atomic step, so
    /// two concurrent callers always pop distinct entries.
    fn pop_front(&self, scope: &ScopeId) -> Result<Option<String>, StoreError>;

    /// Remove a ticket from the ordering. Idempotent.
    fn remove(&self, scope: &ScopeId, ticket_id: &str) -> Result<(), StoreError>;

    /// Number of tickets currently in the waiting ordering.
    fn waiting_count(&self, scope: &ScopeId) -> Result<u64, StoreError>;

    // ------------------------------------------------------------------
    // Ticket records
    // ------------------------------------------------------------------

    /// Write (insert or overwrite) a ticket record.
    fn put_ticket(&self, record: &TicketRecord) -> Result<(), StoreError>;

    /// Read a ticket record.
    fn get_ticket(
        &self,
        scope: &ScopeId,
        ticket_id: &str,
    ) -> Result<Option<TicketRecord>, StoreError>;

    /// Delete a ticket record. Idempotent.
    fn delete_ticket(&self, scope: &ScopeId, ticket_id: &str) -> Result<(), StoreError>;

    /// Ids of tickets whose record status is Active.
    fn active_ticket_ids(&self, scope: &ScopeId) -> Result<Vec<String>, StoreError>;

    /// Union of every ticket id referenced in the scope: ordering,
    /// owner index, and ticket records. A ticket may appear in more
    /// than one structure; the result is deduplicated.
    fn all_ticket_ids(&self, scope: &ScopeId) -> Result<Vec<String>, StoreError>;

    // ------------------------------------------------------------------
    // Owner index (one live ticket per owner per scope)
    // ------------------------------------------------------------------

    fn map_owner(&self, scope: &ScopeId, owner_id: &str, ticket_id: &str)
        -> Result<(), StoreError>;

    fn unmap_owner(&self, scope: &ScopeId, owner_id: &str) -> Result<(), StoreError>;

    fn owner_ticket(&self, scope: &ScopeId, owner_id: &str) -> Result<Option<String>, StoreError>;

    // ------------------------------------------------------------------
    // Scope counters and flags
    // ------------------------------------------------------------------

    /// Increment and return the scope's broadcast sequence number.
    fn next_sequence(&self, scope: &ScopeId) -> Result<u64, StoreError>;

    /// The last sequence number assigned, without advancing it.
    /// Returns 0 for a scope that has never published.
    fn current_sequence(&self, scope: &ScopeId) -> Result<u64, StoreError>;

    /// Rolling average active-session duration, if one has been written.
    fn avg_service_ms(&self, scope: &ScopeId) -> Result<Option<f64>, StoreError>;

    fn set_avg_service_ms(&self, scope: &ScopeId, avg_ms: f64) -> Result<(), StoreError>;

    fn set_paused(&self, scope: &ScopeId, paused: bool) -> Result<(), StoreError>;

    fn is_paused(&self, scope: &ScopeId) -> Result<bool, StoreError>;

    /// Atomically claim one admission slot: increments the scope's
    /// active-slot counter iff it is below `capacity` and returns
    /// whether the claim succeeded. This is the primitive that keeps
    /// two concurrent promotion triggers from double-filling one slot.
    fn claim_active_slot(&self, scope: &ScopeId, capacity: u32) -> Result<bool, StoreError>;

    /// Release one previously claimed slot (floor at zero).
    fn release_active_slot(&self, scope: &ScopeId) -> Result<(), StoreError>;

    /// Count of Active ticket records (recounted, not the slot
    /// counter). Used by snapshots and invariant checks.
    fn active_count(&self, scope: &ScopeId) -> Result<u64, StoreError>;

    // ------------------------------------------------------------------
    // Scope lifecycle
    // ------------------------------------------------------------------

    /// Reset the scope's sequence counter, rolling average, pause flag
    /// and slot counter, and mark it initialized. Idempotent; callers
    /// wanting to preserve metrics check [`QueueStore::is_initialized`]
    /// first.
    fn init_scope(&self, scope: &ScopeId) -> Result<(), StoreError>;

    fn is_initialized(&self, scope: &ScopeId) -> Result<bool, StoreError>;

    /// Number of store keys held by the scope (tickets, ordering
    /// entries, owner mappings, counters). Used by dry-run cleanup.
    fn count_scope_keys(&self, scope: &ScopeId) -> Result<u64, StoreError>;

    /// Delete every key belonging to the scope; returns the count
    /// deleted. Idempotent; purging an empty scope returns 0.
    fn purge_scope(&self, scope: &ScopeId) -> Result<u64, StoreError>;

    /// Every scope id referenced anywhere in the store.
    fn scope_ids(&self) -> Result<Vec<ScopeId>, StoreError>;
}
