//! Sequence-numbered event broadcasting.
//!
//! Every queue mutation is assigned a monotonically increasing
//! per-scope sequence number and fanned out on a public channel (queue
//! depth, promotions, closure) and, for ticket-specific events, on a
//! private per-ticket channel. Consumers that observe a sequence gap
//! should re-fetch status rather than reconstruct missed events.

mod events;
mod notifier;

pub use events::{Envelope, QueueEvent};
pub use notifier::QueueNotifier;
