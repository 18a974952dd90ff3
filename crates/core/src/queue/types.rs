//! Core queue data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scope::ScopeId;

// ============================================================================
// Ticket
// ============================================================================

/// Current status of a ticket.
///
/// State machine flow:
/// ```text
/// Waiting --promote--> Active
/// Waiting --leave/close--> Terminated
/// Active  --complete--> Completed
/// Active  --window elapsed--> Expired
/// Active  --leave/close--> Terminated
/// ```
///
/// Completed, Expired and Terminated are terminal; terminal tickets are
/// deleted from the store once their outcome has been reported.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// In the FIFO ordering, holding a position.
    Waiting,
    /// Admitted; holds an active token until the window expires.
    Active,
    /// Finished reserving within the active window (terminal).
    Completed,
    /// Active window elapsed without completion (terminal).
    Expired,
    /// Voluntarily left, or evicted by a scope close (terminal).
    Terminated,
}

impl TicketStatus {
    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TicketStatus::Completed | TicketStatus::Expired | TicketStatus::Terminated
        )
    }

    /// Returns the status as a string (for logs and metric labels).
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Waiting => "waiting",
            TicketStatus::Active => "active",
            TicketStatus::Completed => "completed",
            TicketStatus::Expired => "expired",
            TicketStatus::Terminated => "terminated",
        }
    }
}

/// One client's claim in a queue.
///
/// Invariants:
/// - exactly one live ticket per (scope, owner), enforced through the
///   owner index in the store
/// - `active_token` and `active_expires_at` are present iff status is
///   `Active`
/// - `joined_at` never changes after creation; FIFO position derives
///   from it, with store insertion order breaking equal timestamps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketRecord {
    /// Unique opaque identifier (UUID).
    pub ticket_id: String,
    /// The performance instance this ticket belongs to.
    pub scope: ScopeId,
    /// Authenticated user id, or a stable guest id.
    pub owner_id: String,
    /// Join timestamp; the FIFO ordering key.
    pub joined_at: DateTime<Utc>,
    /// Current state-machine status.
    pub status: TicketStatus,
    /// Single-use admission token, present only while Active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_token: Option<String>,
    /// Hard wall-clock deadline of the active window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_expires_at: Option<DateTime<Utc>>,
    /// When the ticket was promoted (measures session duration).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
}

impl TicketRecord {
    /// Create a fresh waiting ticket.
    pub fn new_waiting(
        scope: ScopeId,
        owner_id: impl Into<String>,
        joined_at: DateTime<Utc>,
    ) -> Self {
        Self {
            ticket_id: uuid::Uuid::new_v4().to_string(),
            scope,
            owner_id: owner_id.into(),
            joined_at,
            status: TicketStatus::Waiting,
            active_token: None,
            active_expires_at: None,
            activated_at: None,
        }
    }

    /// Returns true if this ticket is Active but its window has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == TicketStatus::Active
            && self.active_expires_at.map(|t| now > t).unwrap_or(false)
    }

    /// Remaining active-window time in milliseconds, clamped at zero.
    pub fn remaining_ms(&self, now: DateTime<Utc>) -> i64 {
        self.active_expires_at
            .map(|t| (t - now).num_milliseconds().max(0))
            .unwrap_or(0)
    }
}

// ============================================================================
// Operation results
// ============================================================================

/// Why a scope was closed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Sales window closed normally.
    Closed,
    /// The performance was cancelled.
    Cancelled,
}

impl CloseReason {
    /// Client-facing message broadcast with the close event.
    pub fn message(&self) -> &'static str {
        match self {
            CloseReason::Closed => "Ticket sales for this performance have closed.",
            CloseReason::Cancelled => "This performance has been cancelled.",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Closed => "closed",
            CloseReason::Cancelled => "cancelled",
        }
    }
}

/// Result of a join call.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JoinOutcome {
    pub ticket_id: String,
    pub status: TicketStatus,
    /// Zero-based position among waiting tickets (Waiting only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<u64>,
    /// Estimated wait in milliseconds (Waiting only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_ms: Option<u64>,
    /// Admission token (Active only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_token: Option<String>,
    /// Active-window deadline (Active only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Point-in-time view returned by a status poll.
///
/// `Expired` is reported once; the poll that observes the expiry also
/// removes the ticket, so a later poll reports `NotJoined`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueueStatus {
    Waiting {
        ticket_id: String,
        rank: u64,
        eta_ms: u64,
    },
    Active {
        ticket_id: String,
        active_token: String,
        expires_at: DateTime<Utc>,
        remaining_ms: i64,
    },
    Expired {
        ticket_id: String,
    },
    /// The scope is closed (or was never opened).
    Closed,
    /// This owner holds no ticket in the scope.
    NotJoined,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Waiting { .. } => "waiting",
            QueueStatus::Active { .. } => "active",
            QueueStatus::Expired { .. } => "expired",
            QueueStatus::Closed => "closed",
            QueueStatus::NotJoined => "not_joined",
        }
    }
}

/// Details of a validated active session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveSession {
    pub ticket_id: String,
    pub active_token: String,
    pub expires_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub owner_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn scope() -> ScopeId {
        ScopeId::new("show", "sched").unwrap()
    }

    #[test]
    fn test_waiting_is_not_terminal() {
        assert!(!TicketStatus::Waiting.is_terminal());
        assert!(!TicketStatus::Active.is_terminal());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TicketStatus::Completed.is_terminal());
        assert!(TicketStatus::Expired.is_terminal());
        assert!(TicketStatus::Terminated.is_terminal());
    }

    #[test]
    fn test_new_waiting_has_no_token() {
        let ticket = TicketRecord::new_waiting(scope(), "owner-1", Utc::now());
        assert_eq!(ticket.status, TicketStatus::Waiting);
        assert!(ticket.active_token.is_none());
        assert!(ticket.active_expires_at.is_none());
        assert!(!ticket.ticket_id.is_empty());
    }

    #[test]
    fn test_is_expired_at() {
        let now = Utc::now();
        let mut ticket = TicketRecord::new_waiting(scope(), "owner-1", now);
        // Waiting tickets never expire.
        assert!(!ticket.is_expired_at(now + Duration::hours(1)));

        ticket.status = TicketStatus::Active;
        ticket.active_expires_at = Some(now + Duration::seconds(30));
        assert!(!ticket.is_expired_at(now));
        assert!(ticket.is_expired_at(now + Duration::seconds(31)));
    }

    #[test]
    fn test_remaining_ms_clamped_at_zero() {
        let now = Utc::now();
        let mut ticket = TicketRecord::new_waiting(scope(), "owner-1", now);
        ticket.status = TicketStatus::Active;
        ticket.active_expires_at = Some(now - Duration::seconds(5));
        assert_eq!(ticket.remaining_ms(now), 0);

        ticket.active_expires_at = Some(now + Duration::seconds(5));
        assert!(ticket.remaining_ms(now) > 4_000);
    }

    #[test]
    fn test_queue_status_serialization() {
        let status = QueueStatus::Waiting {
            ticket_id: "t1".to_string(),
            rank: 3,
            eta_ms: 180_000,
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains(r#""status":"waiting""#));
        assert!(json.contains(r#""rank":3"#));

        let back: QueueStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn test_close_reason_messages_differ() {
        assert_ne!(
            CloseReason::Closed.message(),
            CloseReason::Cancelled.message()
        );
        assert_eq!(CloseReason::Cancelled.as_str(), "cancelled");
    }

    #[test]
    fn test_ticket_record_serialization_skips_absent_token() {
        let ticket = TicketRecord::new_waiting(scope(), "owner-1", Utc::now());
        let json = serde_json::to_string(&ticket).unwrap();
        assert!(!json.contains("active_token"));

        let back: TicketRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ticket);
    }
}
