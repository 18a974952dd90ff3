//! Queue lifecycle manager.
//!
//! One [`QueueManager`] serves every scope; it owns the policy layer
//! (FIFO fairness, one ticket per owner, token checks, lifecycle
//! hooks) over the store's atomic primitives. All mutations publish a
//! sequence-numbered event through the notifier.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::metrics::{
    ACTIVE_SESSIONS, JOINS_TOTAL, LEAVES_TOTAL, QUEUE_DEPTH, SERVICE_TIME, SESSIONS_ENDED,
};
use crate::notify::{QueueEvent, QueueNotifier};
use crate::queue::eta::EtaEstimator;
use crate::queue::{
    ActiveSession, CloseReason, JoinOutcome, QueueError, QueueStatus, TicketRecord, TicketStatus,
};
use crate::scope::ScopeId;
use crate::store::QueueStore;

// ============================================================================
// Settings
// ============================================================================

/// What happens to a join while the scope is paused.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PausedJoinPolicy {
    /// Accept the join; the ticket waits until resume. Default.
    #[default]
    Enqueue,
    /// Reject the join with a retryable error.
    Reject,
}

/// Tuning knobs for the queue policy layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Maximum concurrent active sessions per scope.
    pub capacity: u32,
    /// Active-window length in seconds.
    pub active_window_secs: u64,
    /// Assumed average service time before any session completes.
    pub default_avg_service_ms: f64,
    /// EMA smoothing factor for observed service times.
    pub ema_alpha: f64,
    /// Join behavior while paused.
    pub paused_join_policy: PausedJoinPolicy,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            capacity: 100,
            active_window_secs: 600,
            default_avg_service_ms: 60_000.0,
            ema_alpha: 0.2,
            paused_join_policy: PausedJoinPolicy::Enqueue,
        }
    }
}

// ============================================================================
// Manager
// ============================================================================

pub struct QueueManager {
    pub(crate) store: Arc<dyn QueueStore>,
    pub(crate) notifier: Arc<QueueNotifier>,
    pub(crate) settings: QueueSettings,
    pub(crate) estimator: EtaEstimator,
}

impl QueueManager {
    pub fn new(
        store: Arc<dyn QueueStore>,
        notifier: Arc<QueueNotifier>,
        settings: QueueSettings,
    ) -> Self {
        let estimator = EtaEstimator::new(settings.default_avg_service_ms, settings.ema_alpha);
        Self {
            store,
            notifier,
            settings,
            estimator,
        }
    }

    pub fn notifier(&self) -> &Arc<QueueNotifier> {
        &self.notifier
    }

    // ------------------------------------------------------------------
    // Join
    // ------------------------------------------------------------------

    /// Join the scope's queue as `owner_id`.
    ///
    /// One live ticket per owner per scope: a second join while the
    /// first ticket is Waiting or Active fails with
    /// [`QueueError::AlreadyJoined`]. If a free slot exists the ticket
    /// is promoted immediately and the outcome carries its credentials.
    pub fn join(&self, scope: &ScopeId, owner_id: &str) -> Result<JoinOutcome, QueueError> {
        let now = Utc::now();

        // First touch of a scope brings it up with clean counters.
        if !self.store.is_initialized(scope)? {
            self.store.init_scope(scope)?;
        }

        if self.store.is_paused(scope)?
            && self.settings.paused_join_policy == PausedJoinPolicy::Reject
        {
            JOINS_TOTAL.with_label_values(&["rejected"]).inc();
            return Err(QueueError::Paused);
        }

        // Duplicate check through the owner index. A mapping whose
        // record is gone is stale (purge raced a poll) and yields.
        if let Some(existing) = self.store.owner_ticket(scope, owner_id)? {
            if self.store.get_ticket(scope, &existing)?.is_some() {
                JOINS_TOTAL.with_label_values(&["duplicate"]).inc();
                return Err(QueueError::AlreadyJoined(owner_id.to_string()));
            }
            self.store.unmap_owner(scope, owner_id)?;
        }

        let record = TicketRecord::new_waiting(scope.clone(), owner_id, now);
        let ticket_id = record.ticket_id.clone();
        self.store.put_ticket(&record)?;
        self.store.enqueue(scope, &ticket_id, now).map_err(|e| {
            // Roll the record back so a retry starts clean.
            let _ = self.store.delete_ticket(scope, &ticket_id);
            QueueError::from(e)
        })?;
        self.store.map_owner(scope, owner_id, &ticket_id)?;

        info!(%scope, ticket_id, owner_id, "ticket joined queue");

        // The new ticket may land straight in a free slot.
        self.promote_up_to_capacity(scope, now)?;
        self.publish_queue_update(scope)?;

        match self.store.get_ticket(scope, &ticket_id)? {
            Some(record) if record.status == TicketStatus::Active => {
                JOINS_TOTAL.with_label_values(&["admitted"]).inc();
                Ok(JoinOutcome {
                    ticket_id,
                    status: TicketStatus::Active,
                    rank: None,
                    eta_ms: None,
                    active_token: record.active_token,
                    expires_at: record.active_expires_at,
                })
            }
            _ => {
                JOINS_TOTAL.with_label_values(&["queued"]).inc();
                let rank = self.store.rank_of(scope, &ticket_id)?.unwrap_or(0);
                let avg = self.store.avg_service_ms(scope)?;
                Ok(JoinOutcome {
                    ticket_id,
                    status: TicketStatus::Waiting,
                    rank: Some(rank),
                    eta_ms: Some(self.estimator.estimate_ms(rank, avg)),
                    active_token: None,
                    expires_at: None,
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    /// Point-in-time status of a ticket.
    ///
    /// Expiry is applied lazily here: the poll that first observes a
    /// lapsed window tears the session down, frees the slot for the
    /// next waiter, and reports `Expired` exactly once.
    pub fn status(&self, scope: &ScopeId, ticket_id: &str) -> Result<QueueStatus, QueueError> {
        let now = Utc::now();
        let Some(record) = self.store.get_ticket(scope, ticket_id)? else {
            if !self.store.is_initialized(scope)? {
                return Ok(QueueStatus::Closed);
            }
            return Ok(QueueStatus::NotJoined);
        };

        match record.status {
            TicketStatus::Waiting => {
                let Some(rank) = self.store.rank_of(scope, ticket_id)? else {
                    // Record without an ordering entry; clean it up.
                    warn!(%scope, ticket_id, "waiting record missing ordering entry");
                    self.store.unmap_owner(scope, &record.owner_id)?;
                    self.store.delete_ticket(scope, ticket_id)?;
                    return Ok(QueueStatus::NotJoined);
                };
                let avg = self.store.avg_service_ms(scope)?;
                Ok(QueueStatus::Waiting {
                    ticket_id: ticket_id.to_string(),
                    rank,
                    eta_ms: self.estimator.estimate_ms(rank, avg),
                })
            }
            TicketStatus::Active => {
                if record.is_expired_at(now) {
                    self.expire_active(record)?;
                    self.store.delete_ticket(scope, ticket_id)?;
                    self.promote_up_to_capacity(scope, now)?;
                    self.publish_queue_update(scope)?;
                    return Ok(QueueStatus::Expired {
                        ticket_id: ticket_id.to_string(),
                    });
                }
                Ok(QueueStatus::Active {
                    ticket_id: ticket_id.to_string(),
                    active_token: record.active_token.clone().unwrap_or_default(),
                    expires_at: record.active_expires_at.unwrap_or(now),
                    remaining_ms: record.remaining_ms(now),
                })
            }
            // Reclaimed by a promotion trigger before this poll; the
            // expiry is reported once and the record dropped.
            TicketStatus::Expired => {
                self.store.delete_ticket(scope, ticket_id)?;
                Ok(QueueStatus::Expired {
                    ticket_id: ticket_id.to_string(),
                })
            }
            TicketStatus::Completed | TicketStatus::Terminated => {
                self.store.delete_ticket(scope, ticket_id)?;
                Ok(QueueStatus::NotJoined)
            }
        }
    }

    /// Status looked up by owner instead of ticket id.
    pub fn status_for_owner(
        &self,
        scope: &ScopeId,
        owner_id: &str,
    ) -> Result<QueueStatus, QueueError> {
        match self.store.owner_ticket(scope, owner_id)? {
            Some(ticket_id) => self.status(scope, &ticket_id),
            None if !self.store.is_initialized(scope)? => Ok(QueueStatus::Closed),
            None => Ok(QueueStatus::NotJoined),
        }
    }

    // ------------------------------------------------------------------
    // Active-session gate
    // ------------------------------------------------------------------

    /// Validate an active token for a protected purchase call.
    pub fn validate_active(
        &self,
        scope: &ScopeId,
        ticket_id: &str,
        token: &str,
    ) -> Result<ActiveSession, QueueError> {
        let now = Utc::now();
        let record = self
            .store
            .get_ticket(scope, ticket_id)?
            .ok_or_else(|| QueueError::NotFound(ticket_id.to_string()))?;

        if record.status != TicketStatus::Active {
            return Err(QueueError::NotActive);
        }
        if record.is_expired_at(now) {
            self.expire_active(record)?;
            self.store.delete_ticket(scope, ticket_id)?;
            self.promote_up_to_capacity(scope, now)?;
            self.publish_queue_update(scope)?;
            return Err(QueueError::NotActive);
        }
        if record.active_token.as_deref() != Some(token) {
            return Err(QueueError::InvalidToken);
        }

        Ok(ActiveSession {
            ticket_id: record.ticket_id,
            active_token: token.to_string(),
            expires_at: record.active_expires_at.unwrap_or(now),
            started_at: record.activated_at.unwrap_or(now),
            owner_id: record.owner_id,
        })
    }

    /// Finish an active session successfully (purchase completed).
    /// Frees the slot and promotes the next waiter.
    pub fn complete(
        &self,
        scope: &ScopeId,
        ticket_id: &str,
        token: &str,
    ) -> Result<(), QueueError> {
        let now = Utc::now();
        let record = self
            .store
            .get_ticket(scope, ticket_id)?
            .ok_or_else(|| QueueError::NotFound(ticket_id.to_string()))?;

        if record.status != TicketStatus::Active {
            return Err(QueueError::NotActive);
        }
        if record.is_expired_at(now) {
            self.expire_active(record)?;
            self.store.delete_ticket(scope, ticket_id)?;
            self.promote_up_to_capacity(scope, now)?;
            self.publish_queue_update(scope)?;
            return Err(QueueError::NotActive);
        }
        if record.active_token.as_deref() != Some(token) {
            return Err(QueueError::InvalidToken);
        }

        let session_ms = record
            .activated_at
            .map(|t| (now - t).num_milliseconds().max(0) as f64)
            .unwrap_or(0.0);
        self.fold_service_sample(scope, session_ms)?;
        self.store.release_active_slot(scope)?;
        self.store.unmap_owner(scope, &record.owner_id)?;
        self.store.delete_ticket(scope, ticket_id)?;
        self.notifier.drop_ticket(scope, ticket_id);

        SESSIONS_ENDED.with_label_values(&["completed"]).inc();
        SERVICE_TIME
            .with_label_values(&["completed"])
            .observe(session_ms / 1000.0);
        info!(%scope, ticket_id, session_ms, "active session completed");

        self.promote_up_to_capacity(scope, now)?;
        self.publish_queue_update(scope)?;
        Ok(())
    }

    /// Leave the queue or give up an active session. Idempotent: a
    /// ticket that is already gone is a success. An Active ticket must
    /// present its token; Waiting tickets need none.
    pub fn terminate(
        &self,
        scope: &ScopeId,
        ticket_id: &str,
        token: Option<&str>,
    ) -> Result<(), QueueError> {
        let now = Utc::now();
        let Some(record) = self.store.get_ticket(scope, ticket_id)? else {
            return Ok(());
        };

        match record.status {
            TicketStatus::Waiting => {
                self.store.remove(scope, ticket_id)?;
                self.store.unmap_owner(scope, &record.owner_id)?;
                self.store.delete_ticket(scope, ticket_id)?;
                self.notifier.drop_ticket(scope, ticket_id);
                LEAVES_TOTAL.inc();
                info!(%scope, ticket_id, "waiting ticket left queue");
                self.publish_queue_update(scope)?;
                Ok(())
            }
            TicketStatus::Active => {
                if record.is_expired_at(now) {
                    self.expire_active(record)?;
                    self.store.delete_ticket(scope, ticket_id)?;
                    self.promote_up_to_capacity(scope, now)?;
                    self.publish_queue_update(scope)?;
                    return Ok(());
                }
                if record.active_token.as_deref() != token {
                    return Err(QueueError::InvalidToken);
                }
                let session_ms = record
                    .activated_at
                    .map(|t| (now - t).num_milliseconds().max(0) as f64)
                    .unwrap_or(0.0);
                self.fold_service_sample(scope, session_ms)?;
                self.store.release_active_slot(scope)?;
                self.store.unmap_owner(scope, &record.owner_id)?;
                self.store.delete_ticket(scope, ticket_id)?;
                self.notifier.drop_ticket(scope, ticket_id);
                SESSIONS_ENDED.with_label_values(&["terminated"]).inc();
                SERVICE_TIME
                    .with_label_values(&["terminated"])
                    .observe(session_ms / 1000.0);
                info!(%scope, ticket_id, "active session terminated");
                self.promote_up_to_capacity(scope, now)?;
                self.publish_queue_update(scope)?;
                Ok(())
            }
            // Terminal leftovers just get swept.
            _ => {
                self.store.unmap_owner(scope, &record.owner_id)?;
                self.store.delete_ticket(scope, ticket_id)?;
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Scope lifecycle hooks
    // ------------------------------------------------------------------

    /// Open (or re-open) the scope with clean counters. Idempotent in
    /// effect: repeating it resets sequence, average and pause state.
    pub fn initialize(&self, scope: &ScopeId) -> Result<(), QueueError> {
        self.store.init_scope(scope)?;
        info!(%scope, "scope initialized");
        self.publish_queue_update(scope)?;
        Ok(())
    }

    /// Tear the scope down: broadcast the closure to everyone (public
    /// channel plus every ticket's private channel), then purge every
    /// key the scope holds. Returns the number of keys deleted.
    pub fn close(&self, scope: &ScopeId, reason: CloseReason) -> Result<u64, QueueError> {
        let now = Utc::now();
        let ticket_ids = self.store.all_ticket_ids(scope)?;
        let event = QueueEvent::QueueClosed {
            reason,
            message: reason.message().to_string(),
            timestamp: now,
        };

        let seq = self.store.next_sequence(scope)?;
        self.notifier.publish_public(scope, seq, event.clone());
        for ticket_id in &ticket_ids {
            self.notifier
                .publish_ticket(scope, ticket_id, seq, event.clone());
        }

        let purged = self.store.purge_scope(scope)?;
        let dropped = self.notifier.drop_scope(scope);
        QUEUE_DEPTH.with_label_values(&[&scope.to_string()]).set(0);
        ACTIVE_SESSIONS
            .with_label_values(&[&scope.to_string()])
            .set(0);
        info!(
            %scope,
            reason = reason.as_str(),
            tickets = ticket_ids.len(),
            purged,
            dropped,
            "scope closed"
        );
        Ok(purged)
    }

    /// Halt promotions; waiting tickets keep their positions.
    pub fn pause(&self, scope: &ScopeId) -> Result<(), QueueError> {
        self.store.set_paused(scope, true)?;
        info!(%scope, "scope paused");
        self.publish_queue_update(scope)?;
        Ok(())
    }

    /// Resume promotions and immediately fill any free slots.
    pub fn resume(&self, scope: &ScopeId) -> Result<(), QueueError> {
        self.store.set_paused(scope, false)?;
        info!(%scope, "scope resumed");
        self.promote_up_to_capacity(scope, Utc::now())?;
        self.publish_queue_update(scope)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Authoritative counts for a subscriber joining (or resyncing
    /// after a sequence gap).
    pub fn snapshot(&self, scope: &ScopeId) -> Result<QueueEvent, QueueError> {
        Ok(QueueEvent::Snapshot {
            waiting: self.store.waiting_count(scope)?,
            active: self.store.active_count(scope)?,
            paused: self.store.is_paused(scope)?,
        })
    }

    /// Snapshot stamped with the scope's current sequence number, read
    /// without advancing it: any event with a higher seq postdates the
    /// snapshot, and established subscribers see no gap from a new
    /// connection.
    pub fn stamped_snapshot(&self, scope: &ScopeId) -> Result<(u64, QueueEvent), QueueError> {
        let event = self.snapshot(scope)?;
        let seq = self.store.current_sequence(scope)?;
        Ok((seq, event))
    }

    fn publish_queue_update(&self, scope: &ScopeId) -> Result<(), QueueError> {
        let waiting = self.store.waiting_count(scope)?;
        let active = self.store.active_count(scope)?;
        QUEUE_DEPTH
            .with_label_values(&[&scope.to_string()])
            .set(waiting as i64);
        ACTIVE_SESSIONS
            .with_label_values(&[&scope.to_string()])
            .set(active as i64);
        let seq = self.store.next_sequence(scope)?;
        self.notifier
            .publish_public(scope, seq, QueueEvent::QueueUpdate { waiting, active });
        Ok(())
    }
}
