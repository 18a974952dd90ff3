//! Admission control: promotion into the bounded active set.
//!
//! Promotion is triggered by any event that can free or fill a slot
//! (join, completion, termination, observed expiry, resume). The slot
//! claim is the only gate: [`crate::store::QueueStore::claim_active_slot`]
//! is a compare-and-increment, so two concurrent triggers can never
//! push the active set past capacity; the loser of the race simply
//! finds no slot and stops.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::metrics::{PROMOTIONS_TOTAL, SERVICE_TIME, SESSIONS_ENDED};
use crate::notify::QueueEvent;
use crate::queue::manager::QueueManager;
use crate::queue::{QueueError, TicketRecord, TicketStatus};
use crate::scope::ScopeId;

impl QueueManager {
    /// Fill free active slots from the front of the waiting ordering.
    /// Returns the number of tickets promoted. No-op while paused.
    pub(crate) fn promote_up_to_capacity(
        &self,
        scope: &ScopeId,
        now: DateTime<Utc>,
    ) -> Result<u64, QueueError> {
        if self.store.is_paused(scope)? {
            return Ok(0);
        }

        // Reclaim slots held by sessions whose window already passed,
        // so a promotion trigger is never starved by abandonments.
        self.reclaim_expired(scope, now)?;

        let mut promoted = 0;
        while self
            .store
            .claim_active_slot(scope, self.settings.capacity)?
        {
            let Some(record) = self.take_front_waiting(scope)? else {
                // Claimed a slot but the queue is empty; give it back.
                self.store.release_active_slot(scope)?;
                break;
            };
            self.activate(record, now)?;
            promoted += 1;
        }

        if promoted > 0 {
            debug!(%scope, promoted, "promoted waiting tickets");
        }
        Ok(promoted)
    }

    /// Pop the first ordering entry that still has a Waiting record.
    /// Entries whose record vanished (purged, raced) are dropped.
    ///
    /// The pop is atomic in the store, so concurrent promotion triggers
    /// each take a distinct entry; no ticket is ever activated twice.
    fn take_front_waiting(&self, scope: &ScopeId) -> Result<Option<TicketRecord>, QueueError> {
        loop {
            let Some(ticket_id) = self.store.pop_front(scope)? else {
                return Ok(None);
            };
            match self.store.get_ticket(scope, &ticket_id)? {
                Some(record) if record.status == TicketStatus::Waiting => {
                    return Ok(Some(record));
                }
                _ => {
                    warn!(%scope, ticket_id, "dropped stale ordering entry");
                }
            }
        }
    }

    /// Turn a Waiting record into an Active session holding the slot
    /// the caller already claimed.
    fn activate(&self, mut record: TicketRecord, now: DateTime<Utc>) -> Result<(), QueueError> {
        let scope = record.scope.clone();
        record.status = TicketStatus::Active;
        record.active_token = Some(uuid::Uuid::new_v4().to_string());
        record.active_expires_at = Some(now + self.active_window());
        record.activated_at = Some(now);
        self.store.put_ticket(&record)?;

        PROMOTIONS_TOTAL.inc();
        info!(
            %scope,
            ticket_id = record.ticket_id,
            expires_at = %record.active_expires_at.unwrap_or(now),
            "ticket promoted to active"
        );

        // Credentials go on the private channel only; the public
        // channel learns that a promotion happened, not the token.
        let seq = self.store.next_sequence(&scope)?;
        self.notifier.publish_ticket(
            &scope,
            &record.ticket_id,
            seq,
            QueueEvent::Admitted {
                ticket_id: record.ticket_id.clone(),
                active_token: record.active_token.clone().unwrap_or_default(),
                expires_at: record.active_expires_at.unwrap_or(now),
            },
        );
        let seq = self.store.next_sequence(&scope)?;
        self.notifier.publish_public(
            &scope,
            seq,
            QueueEvent::Promoted {
                ticket_id: record.ticket_id.clone(),
            },
        );
        Ok(())
    }

    /// Expire every Active session whose window has passed, releasing
    /// their slots. Returns the number reclaimed.
    ///
    /// The Expired record is kept (with the owner mapping dropped) so
    /// the owner's next status poll can report the expiry once before
    /// the record is deleted.
    pub(crate) fn reclaim_expired(
        &self,
        scope: &ScopeId,
        now: DateTime<Utc>,
    ) -> Result<u64, QueueError> {
        let mut reclaimed = 0;
        for ticket_id in self.store.active_ticket_ids(scope)? {
            let Some(record) = self.store.get_ticket(scope, &ticket_id)? else {
                continue;
            };
            if record.is_expired_at(now) {
                self.expire_active(record)?;
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    /// Tear down one expired Active session: release its slot, fold the
    /// full window into the service-time average, notify the ticket,
    /// and leave the record Expired for a single status report.
    pub(crate) fn expire_active(&self, mut record: TicketRecord) -> Result<(), QueueError> {
        let scope = record.scope.clone();

        // The slot was occupied for the entire window; counting the
        // full window keeps the ETA honest about abandonments.
        let window_ms = self.active_window().num_milliseconds() as f64;
        self.fold_service_sample(&scope, window_ms)?;
        self.store.release_active_slot(&scope)?;
        self.store.unmap_owner(&scope, &record.owner_id)?;

        record.status = TicketStatus::Expired;
        record.active_token = None;
        self.store.put_ticket(&record)?;

        SESSIONS_ENDED.with_label_values(&["expired"]).inc();
        SERVICE_TIME
            .with_label_values(&["expired"])
            .observe(window_ms / 1000.0);
        info!(%scope, ticket_id = record.ticket_id, "active session expired");

        let seq = self.store.next_sequence(&scope)?;
        self.notifier.publish_ticket(
            &scope,
            &record.ticket_id,
            seq,
            QueueEvent::ExpiryNotice {
                ticket_id: record.ticket_id.clone(),
            },
        );
        Ok(())
    }

    /// Fold one observed session duration into the scope's EMA.
    pub(crate) fn fold_service_sample(
        &self,
        scope: &ScopeId,
        sample_ms: f64,
    ) -> Result<(), QueueError> {
        let current = self.store.avg_service_ms(scope)?;
        let updated = self.estimator.update(current, sample_ms);
        self.store.set_avg_service_ms(scope, updated)?;
        Ok(())
    }

    pub(crate) fn active_window(&self) -> Duration {
        Duration::seconds(self.settings.active_window_secs as i64)
    }
}
