//! Per-scope broadcast channels.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;
use tracing::debug;

use super::{Envelope, QueueEvent};
use crate::metrics::EVENTS_PUBLISHED;
use crate::scope::ScopeId;

/// Publishes queue events to one public channel per scope and one
/// private channel per ticket.
///
/// Publishing is fire-and-forget: a send with no subscribers (or a
/// lagging subscriber) never fails the state mutation that triggered
/// it. A missed broadcast is recoverable by polling for a snapshot.
pub struct QueueNotifier {
    capacity: usize,
    public: RwLock<HashMap<ScopeId, broadcast::Sender<Envelope>>>,
    private: RwLock<HashMap<(ScopeId, String), broadcast::Sender<Envelope>>>,
}

impl QueueNotifier {
    /// Create a notifier whose channels buffer `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            public: RwLock::new(HashMap::new()),
            private: RwLock::new(HashMap::new()),
        }
    }

    /// Publish to the scope's public channel.
    pub fn publish_public(&self, scope: &ScopeId, seq: u64, event: QueueEvent) {
        EVENTS_PUBLISHED
            .with_label_values(&["public", event.kind()])
            .inc();
        let sender = {
            let mut channels = self.public.write().unwrap_or_else(|e| e.into_inner());
            channels
                .entry(scope.clone())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .clone()
        };
        // Ignore send errors - they just mean no one is listening.
        let _ = sender.send(Envelope {
            scope: scope.clone(),
            seq,
            event,
        });
    }

    /// Publish to one ticket's private channel.
    pub fn publish_ticket(&self, scope: &ScopeId, ticket_id: &str, seq: u64, event: QueueEvent) {
        EVENTS_PUBLISHED
            .with_label_values(&["private", event.kind()])
            .inc();
        let sender = {
            let mut channels = self.private.write().unwrap_or_else(|e| e.into_inner());
            channels
                .entry((scope.clone(), ticket_id.to_string()))
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .clone()
        };
        let _ = sender.send(Envelope {
            scope: scope.clone(),
            seq,
            event,
        });
    }

    /// Subscribe to the scope's public channel.
    pub fn subscribe_public(&self, scope: &ScopeId) -> broadcast::Receiver<Envelope> {
        let mut channels = self.public.write().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(scope.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Subscribe to one ticket's private channel.
    pub fn subscribe_ticket(&self, scope: &ScopeId, ticket_id: &str) -> broadcast::Receiver<Envelope> {
        let mut channels = self.private.write().unwrap_or_else(|e| e.into_inner());
        channels
            .entry((scope.clone(), ticket_id.to_string()))
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Drop one ticket's private channel.
    pub fn drop_ticket(&self, scope: &ScopeId, ticket_id: &str) {
        let mut channels = self.private.write().unwrap_or_else(|e| e.into_inner());
        channels.remove(&(scope.clone(), ticket_id.to_string()));
    }

    /// Tear down every channel belonging to a scope; returns the number
    /// of channels dropped. Dropping the senders disconnects all
    /// remaining subscribers.
    pub fn drop_scope(&self, scope: &ScopeId) -> usize {
        let mut dropped = 0;
        {
            let mut channels = self.public.write().unwrap_or_else(|e| e.into_inner());
            if channels.remove(scope).is_some() {
                dropped += 1;
            }
        }
        {
            let mut channels = self.private.write().unwrap_or_else(|e| e.into_inner());
            let before = channels.len();
            channels.retain(|(s, _), _| s != scope);
            dropped += before - channels.len();
        }
        debug!(%scope, dropped, "dropped scope channels");
        dropped
    }
}

impl Default for QueueNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}
