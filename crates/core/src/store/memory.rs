//! In-memory queue store.
//!
//! Default backend for single-process deployments and tests. One
//! `RwLock` over the scope map doubles as the per-scope critical
//! section, which makes every primitive trivially atomic.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::{QueueStore, StoreError};
use crate::queue::{TicketRecord, TicketStatus};
use crate::scope::ScopeId;

#[derive(Default)]
struct ScopeState {
    /// Waiting ordering: (joined_at millis, ticket id), FIFO with ties
    /// resolved by insertion position.
    ordering: Vec<(i64, String)>,
    tickets: HashMap<String, TicketRecord>,
    owners: HashMap<String, String>,
    sequence: u64,
    avg_service_ms: Option<f64>,
    paused: bool,
    active_slots: u32,
    initialized: bool,
}

impl ScopeState {
    fn key_count(&self) -> u64 {
        let meta = u64::from(
            self.sequence > 0
                || self.avg_service_ms.is_some()
                || self.paused
                || self.active_slots > 0
                || self.initialized,
        );
        (self.ordering.len() + self.tickets.len() + self.owners.len()) as u64 + meta
    }
}

/// In-memory implementation of [`QueueStore`].
pub struct MemoryQueueStore {
    scopes: RwLock<HashMap<ScopeId, ScopeState>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self {
            scopes: RwLock::new(HashMap::new()),
        }
    }

    fn with_scope<T>(&self, scope: &ScopeId, f: impl FnOnce(&ScopeState) -> T) -> T {
        let scopes = self.scopes.read().unwrap_or_else(|e| e.into_inner());
        match scopes.get(scope) {
            Some(state) => f(state),
            None => f(&ScopeState::default()),
        }
    }

    fn with_scope_mut<T>(&self, scope: &ScopeId, f: impl FnOnce(&mut ScopeState) -> T) -> T {
        let mut scopes = self.scopes.write().unwrap_or_else(|e| e.into_inner());
        f(scopes.entry(scope.clone()).or_default())
    }
}

impl Default for MemoryQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueStore for MemoryQueueStore {
    fn enqueue(
        &self,
        scope: &ScopeId,
        ticket_id: &str,
        joined_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_scope_mut(scope, |state| {
            if state.ordering.iter().any(|(_, id)| id == ticket_id) {
                return Err(StoreError::AlreadyQueued(ticket_id.to_string()));
            }
            let key = joined_at.timestamp_millis();
            // Insert after any entry with an equal or earlier key so
            // equal timestamps keep their arrival order.
            let pos = state.ordering.partition_point(|(k, _)| *k <= key);
            state.ordering.insert(pos, (key, ticket_id.to_string()));
            Ok(())
        })
    }

    fn rank_of(&self, scope: &ScopeId, ticket_id: &str) -> Result<Option<u64>, StoreError> {
        Ok(self.with_scope(scope, |state| {
            state
                .ordering
                .iter()
                .position(|(_, id)| id == ticket_id)
                .map(|p| p as u64)
        }))
    }

    fn pop_front(&self, scope: &ScopeId) -> Result<Option<String>, StoreError> {
        Ok(self.with_scope_mut(scope, |state| {
            if state.ordering.is_empty() {
                None
            } else {
                Some(state.ordering.remove(0).1)
            }
        }))
    }

    fn remove(&self, scope: &ScopeId, ticket_id: &str) -> Result<(), StoreError> {
        self.with_scope_mut(scope, |state| {
            state.ordering.retain(|(_, id)| id != ticket_id);
        });
        Ok(())
    }

    fn waiting_count(&self, scope: &ScopeId) -> Result<u64, StoreError> {
        Ok(self.with_scope(scope, |state| state.ordering.len() as u64))
    }

    fn put_ticket(&self, record: &TicketRecord) -> Result<(), StoreError> {
        self.with_scope_mut(&record.scope, |state| {
            state
                .tickets
                .insert(record.ticket_id.clone(), record.clone());
        });
        Ok(())
    }

    fn get_ticket(
        &self,
        scope: &ScopeId,
        ticket_id: &str,
    ) -> Result<Option<TicketRecord>, StoreError> {
        Ok(self.with_scope(scope, |state| state.tickets.get(ticket_id).cloned()))
    }

    fn delete_ticket(&self, scope: &ScopeId, ticket_id: &str) -> Result<(), StoreError> {
        self.with_scope_mut(scope, |state| {
            state.tickets.remove(ticket_id);
        });
        Ok(())
    }

    fn active_ticket_ids(&self, scope: &ScopeId) -> Result<Vec<String>, StoreError> {
        Ok(self.with_scope(scope, |state| {
            state
                .tickets
                .values()
                .filter(|t| t.status == TicketStatus::Active)
                .map(|t| t.ticket_id.clone())
                .collect()
        }))
    }

    fn all_ticket_ids(&self, scope: &ScopeId) -> Result<Vec<String>, StoreError> {
        Ok(self.with_scope(scope, |state| {
            let mut ids: Vec<String> = state.tickets.keys().cloned().collect();
            for (_, id) in &state.ordering {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
            for id in state.owners.values() {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
            ids
        }))
    }

    fn map_owner(
        &self,
        scope: &ScopeId,
        owner_id: &str,
        ticket_id: &str,
    ) -> Result<(), StoreError> {
        self.with_scope_mut(scope, |state| {
            state
                .owners
                .insert(owner_id.to_string(), ticket_id.to_string());
        });
        Ok(())
    }

    fn unmap_owner(&self, scope: &ScopeId, owner_id: &str) -> Result<(), StoreError> {
        self.with_scope_mut(scope, |state| {
            state.owners.remove(owner_id);
        });
        Ok(())
    }

    fn owner_ticket(&self, scope: &ScopeId, owner_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.with_scope(scope, |state| state.owners.get(owner_id).cloned()))
    }

    fn next_sequence(&self, scope: &ScopeId) -> Result<u64, StoreError> {
        Ok(self.with_scope_mut(scope, |state| {
            state.sequence += 1;
            state.sequence
        }))
    }

    fn current_sequence(&self, scope: &ScopeId) -> Result<u64, StoreError> {
        Ok(self.with_scope(scope, |state| state.sequence))
    }

    fn avg_service_ms(&self, scope: &ScopeId) -> Result<Option<f64>, StoreError> {
        Ok(self.with_scope(scope, |state| state.avg_service_ms))
    }

    fn set_avg_service_ms(&self, scope: &ScopeId, avg_ms: f64) -> Result<(), StoreError> {
        self.with_scope_mut(scope, |state| state.avg_service_ms = Some(avg_ms));
        Ok(())
    }

    fn set_paused(&self, scope: &ScopeId, paused: bool) -> Result<(), StoreError> {
        self.with_scope_mut(scope, |state| state.paused = paused);
        Ok(())
    }

    fn is_paused(&self, scope: &ScopeId) -> Result<bool, StoreError> {
        Ok(self.with_scope(scope, |state| state.paused))
    }

    fn claim_active_slot(&self, scope: &ScopeId, capacity: u32) -> Result<bool, StoreError> {
        Ok(self.with_scope_mut(scope, |state| {
            if state.active_slots < capacity {
                state.active_slots += 1;
                true
            } else {
                false
            }
        }))
    }

    fn release_active_slot(&self, scope: &ScopeId) -> Result<(), StoreError> {
        self.with_scope_mut(scope, |state| {
            state.active_slots = state.active_slots.saturating_sub(1);
        });
        Ok(())
    }

    fn active_count(&self, scope: &ScopeId) -> Result<u64, StoreError> {
        Ok(self.with_scope(scope, |state| {
            state
                .tickets
                .values()
                .filter(|t| t.status == TicketStatus::Active)
                .count() as u64
        }))
    }

    fn init_scope(&self, scope: &ScopeId) -> Result<(), StoreError> {
        self.with_scope_mut(scope, |state| {
            state.sequence = 0;
            state.avg_service_ms = None;
            state.paused = false;
            state.active_slots = 0;
            state.initialized = true;
        });
        Ok(())
    }

    fn is_initialized(&self, scope: &ScopeId) -> Result<bool, StoreError> {
        Ok(self.with_scope(scope, |state| state.initialized))
    }

    fn count_scope_keys(&self, scope: &ScopeId) -> Result<u64, StoreError> {
        Ok(self.with_scope(scope, |state| state.key_count()))
    }

    fn purge_scope(&self, scope: &ScopeId) -> Result<u64, StoreError> {
        let mut scopes = self.scopes.write().unwrap_or_else(|e| e.into_inner());
        Ok(scopes.remove(scope).map(|s| s.key_count()).unwrap_or(0))
    }

    fn scope_ids(&self) -> Result<Vec<ScopeId>, StoreError> {
        let scopes = self.scopes.read().unwrap_or_else(|e| e.into_inner());
        Ok(scopes.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn scope() -> ScopeId {
        ScopeId::new("show", "sched").unwrap()
    }

    fn other_scope() -> ScopeId {
        ScopeId::new("other", "sched").unwrap()
    }

    #[test]
    fn test_enqueue_and_rank() {
        let store = MemoryQueueStore::new();
        let now = Utc::now();

        store.enqueue(&scope(), "a", now).unwrap();
        store.enqueue(&scope(), "b", now + Duration::milliseconds(1)).unwrap();

        assert_eq!(store.rank_of(&scope(), "a").unwrap(), Some(0));
        assert_eq!(store.rank_of(&scope(), "b").unwrap(), Some(1));
        assert_eq!(store.rank_of(&scope(), "missing").unwrap(), None);
        assert_eq!(store.waiting_count(&scope()).unwrap(), 2);
    }

    #[test]
    fn test_enqueue_duplicate_rejected() {
        let store = MemoryQueueStore::new();
        let now = Utc::now();
        store.enqueue(&scope(), "a", now).unwrap();

        let result = store.enqueue(&scope(), "a", now);
        assert!(matches!(result, Err(StoreError::AlreadyQueued(_))));
    }

    #[test]
    fn test_equal_timestamps_keep_arrival_order() {
        let store = MemoryQueueStore::new();
        let now = Utc::now();
        for id in ["a", "b", "c"] {
            store.enqueue(&scope(), id, now).unwrap();
        }
        assert_eq!(store.pop_front(&scope()).unwrap(), Some("a".to_string()));
        assert_eq!(store.pop_front(&scope()).unwrap(), Some("b".to_string()));
        assert_eq!(store.pop_front(&scope()).unwrap(), Some("c".to_string()));
    }

    #[test]
    fn test_pop_front_removes_in_order() {
        let store = MemoryQueueStore::new();
        let now = Utc::now();
        store.enqueue(&scope(), "a", now).unwrap();
        store.enqueue(&scope(), "b", now + Duration::milliseconds(1)).unwrap();

        assert_eq!(store.pop_front(&scope()).unwrap(), Some("a".to_string()));
        assert_eq!(store.pop_front(&scope()).unwrap(), Some("b".to_string()));
        assert_eq!(store.pop_front(&scope()).unwrap(), None);
    }

    #[test]
    fn test_concurrent_pop_front_yields_distinct_tickets() {
        use std::sync::Arc;

        let store = Arc::new(MemoryQueueStore::new());
        let now = Utc::now();
        for i in 0..8 {
            store
                .enqueue(&scope(), &format!("t{i}"), now + Duration::milliseconds(i))
                .unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                let mut popped = Vec::new();
                while let Some(id) = store.pop_front(&scope()).unwrap() {
                    popped.push(id);
                }
                popped
            }));
        }

        let mut all: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort();
        all.dedup();
        // Every entry popped exactly once across all threads.
        assert_eq!(all.len(), 8);
        assert_eq!(store.waiting_count(&scope()).unwrap(), 0);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = MemoryQueueStore::new();
        store.enqueue(&scope(), "a", Utc::now()).unwrap();
        store.remove(&scope(), "a").unwrap();
        store.remove(&scope(), "a").unwrap();
        assert_eq!(store.waiting_count(&scope()).unwrap(), 0);
    }

    #[test]
    fn test_ticket_record_round_trip() {
        let store = MemoryQueueStore::new();
        let record = TicketRecord::new_waiting(scope(), "owner-1", Utc::now());
        store.put_ticket(&record).unwrap();

        let got = store.get_ticket(&scope(), &record.ticket_id).unwrap();
        assert_eq!(got, Some(record.clone()));

        store.delete_ticket(&scope(), &record.ticket_id).unwrap();
        assert_eq!(store.get_ticket(&scope(), &record.ticket_id).unwrap(), None);
    }

    #[test]
    fn test_owner_index() {
        let store = MemoryQueueStore::new();
        store.map_owner(&scope(), "owner-1", "t1").unwrap();
        assert_eq!(
            store.owner_ticket(&scope(), "owner-1").unwrap(),
            Some("t1".to_string())
        );

        store.unmap_owner(&scope(), "owner-1").unwrap();
        assert_eq!(store.owner_ticket(&scope(), "owner-1").unwrap(), None);
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let store = MemoryQueueStore::new();
        assert_eq!(store.next_sequence(&scope()).unwrap(), 1);
        assert_eq!(store.next_sequence(&scope()).unwrap(), 2);
        // Independent per scope.
        assert_eq!(store.next_sequence(&other_scope()).unwrap(), 1);
    }

    #[test]
    fn test_current_sequence_does_not_advance() {
        let store = MemoryQueueStore::new();
        assert_eq!(store.current_sequence(&scope()).unwrap(), 0);
        store.next_sequence(&scope()).unwrap();
        assert_eq!(store.current_sequence(&scope()).unwrap(), 1);
        assert_eq!(store.current_sequence(&scope()).unwrap(), 1);
        assert_eq!(store.next_sequence(&scope()).unwrap(), 2);
    }

    #[test]
    fn test_claim_slot_respects_capacity() {
        let store = MemoryQueueStore::new();
        assert!(store.claim_active_slot(&scope(), 2).unwrap());
        assert!(store.claim_active_slot(&scope(), 2).unwrap());
        assert!(!store.claim_active_slot(&scope(), 2).unwrap());

        store.release_active_slot(&scope()).unwrap();
        assert!(store.claim_active_slot(&scope(), 2).unwrap());
    }

    #[test]
    fn test_release_slot_floors_at_zero() {
        let store = MemoryQueueStore::new();
        store.release_active_slot(&scope()).unwrap();
        assert!(store.claim_active_slot(&scope(), 1).unwrap());
    }

    #[test]
    fn test_init_scope_resets_counters() {
        let store = MemoryQueueStore::new();
        store.next_sequence(&scope()).unwrap();
        store.set_avg_service_ms(&scope(), 1234.0).unwrap();
        store.set_paused(&scope(), true).unwrap();

        store.init_scope(&scope()).unwrap();
        assert!(store.is_initialized(&scope()).unwrap());
        assert_eq!(store.next_sequence(&scope()).unwrap(), 1);
        assert_eq!(store.avg_service_ms(&scope()).unwrap(), None);
        assert!(!store.is_paused(&scope()).unwrap());
    }

    #[test]
    fn test_purge_scope_deletes_everything() {
        let store = MemoryQueueStore::new();
        let record = TicketRecord::new_waiting(scope(), "owner-1", Utc::now());
        store.enqueue(&scope(), &record.ticket_id, record.joined_at).unwrap();
        store.put_ticket(&record).unwrap();
        store.map_owner(&scope(), "owner-1", &record.ticket_id).unwrap();

        let deleted = store.purge_scope(&scope()).unwrap();
        assert!(deleted >= 3);
        assert_eq!(store.waiting_count(&scope()).unwrap(), 0);
        assert_eq!(store.count_scope_keys(&scope()).unwrap(), 0);

        // Second purge finds nothing.
        assert_eq!(store.purge_scope(&scope()).unwrap(), 0);
    }

    #[test]
    fn test_all_ticket_ids_unions_structures() {
        let store = MemoryQueueStore::new();
        let record = TicketRecord::new_waiting(scope(), "owner-1", Utc::now());
        store.put_ticket(&record).unwrap();
        store.enqueue(&scope(), &record.ticket_id, record.joined_at).unwrap();
        // Orphan mapping referencing a ticket with no record.
        store.map_owner(&scope(), "owner-2", "orphan").unwrap();

        let mut ids = store.all_ticket_ids(&scope()).unwrap();
        ids.sort();
        let mut expected = vec![record.ticket_id.clone(), "orphan".to_string()];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_scope_ids_lists_touched_scopes() {
        let store = MemoryQueueStore::new();
        store.next_sequence(&scope()).unwrap();
        store.set_paused(&other_scope(), true).unwrap();

        let mut ids = store.scope_ids().unwrap();
        ids.sort();
        assert_eq!(ids, vec![other_scope(), scope()]);
    }
}
