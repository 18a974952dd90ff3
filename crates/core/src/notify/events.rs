//! Broadcast event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::queue::CloseReason;
use crate::scope::ScopeId;

/// Event published on a queue's public channel or on a ticket's
/// private channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// Full authoritative state; emitted on demand and re-fetched by
    /// subscribers that detect a sequence gap.
    Snapshot {
        waiting: u64,
        active: u64,
        paused: bool,
    },

    /// Aggregate counts changed (join, leave, completion, expiry).
    QueueUpdate { waiting: u64, active: u64 },

    /// A ticket moved to the front and became active (public notice).
    Promoted { ticket_id: String },

    /// Private notice to the promoted ticket, carrying its credentials.
    Admitted {
        ticket_id: String,
        active_token: String,
        expires_at: DateTime<Utc>,
    },

    /// Private notice that a ticket's active window ended unused.
    ExpiryNotice { ticket_id: String },

    /// The queue was torn down; broadcast on the public channel and on
    /// every ticket's private channel.
    QueueClosed {
        reason: CloseReason,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl QueueEvent {
    /// Event kind as a string (for logs and metric labels).
    pub fn kind(&self) -> &'static str {
        match self {
            QueueEvent::Snapshot { .. } => "snapshot",
            QueueEvent::QueueUpdate { .. } => "queue_update",
            QueueEvent::Promoted { .. } => "promoted",
            QueueEvent::Admitted { .. } => "admitted",
            QueueEvent::ExpiryNotice { .. } => "expiry_notice",
            QueueEvent::QueueClosed { .. } => "queue_closed",
        }
    }
}

/// Wire envelope: every published event carries the scope and the
/// scope's sequence number at publish time. Subscribers that see a gap
/// in `seq` discard incremental assumptions and re-fetch a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub scope: ScopeId,
    pub seq: u64,
    #[serde(flatten)]
    pub event: QueueEvent,
}
