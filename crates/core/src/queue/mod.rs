//! Ticket lifecycle: FIFO waiting queue, bounded active set, expiring
//! admission tokens.

mod admission;
mod error;
mod eta;
mod manager;
mod types;

pub use error::QueueError;
pub use eta::EtaEstimator;
pub use manager::{PausedJoinPolicy, QueueManager, QueueSettings};
pub use types::{
    ActiveSession, CloseReason, JoinOutcome, QueueStatus, TicketRecord, TicketStatus,
};
