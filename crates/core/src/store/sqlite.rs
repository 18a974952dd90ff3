//! SQLite-backed queue store implementation.
//!
//! Persists queue state across restarts. The connection mutex
//! serializes callers, and multi-table primitives run inside a
//! transaction so a crash mid-operation cannot leave the ordering,
//! records and owner index inconsistent.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{QueueStore, StoreError};
use crate::queue::{TicketRecord, TicketStatus};
use crate::scope::ScopeId;

/// SQLite-backed implementation of [`QueueStore`].
pub struct SqliteQueueStore {
    conn: Mutex<Connection>,
}

impl SqliteQueueStore {
    /// Open (or create) the database file and initialize the schema.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS scope_meta (
                scope_id TEXT PRIMARY KEY,
                sequence INTEGER NOT NULL DEFAULT 0,
                avg_service_ms REAL,
                paused INTEGER NOT NULL DEFAULT 0,
                active_slots INTEGER NOT NULL DEFAULT 0,
                initialized INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS tickets (
                scope_id TEXT NOT NULL,
                ticket_id TEXT NOT NULL,
                status TEXT NOT NULL,
                record TEXT NOT NULL,
                PRIMARY KEY (scope_id, ticket_id)
            );

            CREATE TABLE IF NOT EXISTS queue_order (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                scope_id TEXT NOT NULL,
                ticket_id TEXT NOT NULL,
                joined_at_ms INTEGER NOT NULL,
                UNIQUE (scope_id, ticket_id)
            );

            CREATE TABLE IF NOT EXISTS owner_index (
                scope_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                ticket_id TEXT NOT NULL,
                PRIMARY KEY (scope_id, owner_id)
            );

            CREATE INDEX IF NOT EXISTS idx_queue_order_scope
                ON queue_order(scope_id, joined_at_ms, seq);
            CREATE INDEX IF NOT EXISTS idx_tickets_scope_status
                ON tickets(scope_id, status);
            "#,
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make sure the scope has a meta row so counter updates hit a row.
    fn ensure_meta(conn: &Connection, scope: &ScopeId) -> Result<(), StoreError> {
        conn.execute(
            "INSERT OR IGNORE INTO scope_meta (scope_id) VALUES (?)",
            params![scope.to_string()],
        )
        .map_err(db_err)?;
        Ok(())
    }
}

fn db_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

impl QueueStore for SqliteQueueStore {
    fn enqueue(
        &self,
        scope: &ScopeId,
        ticket_id: &str,
        joined_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.lock();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO queue_order (scope_id, ticket_id, joined_at_ms) VALUES (?, ?, ?)",
                params![scope.to_string(), ticket_id, joined_at.timestamp_millis()],
            )
            .map_err(db_err)?;
        if inserted == 0 {
            return Err(StoreError::AlreadyQueued(ticket_id.to_string()));
        }
        Ok(())
    }

    fn rank_of(&self, scope: &ScopeId, ticket_id: &str) -> Result<Option<u64>, StoreError> {
        let conn = self.lock();
        let entry: Option<(i64, i64)> = conn
            .query_row(
                "SELECT joined_at_ms, seq FROM queue_order WHERE scope_id = ? AND ticket_id = ?",
                params![scope.to_string(), ticket_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err)?;

        let Some((joined_at_ms, seq)) = entry else {
            return Ok(None);
        };

        let rank: u64 = conn
            .query_row(
                "SELECT COUNT(*) FROM queue_order
                 WHERE scope_id = ?
                   AND (joined_at_ms < ? OR (joined_at_ms = ? AND seq < ?))",
                params![scope.to_string(), joined_at_ms, joined_at_ms, seq],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(Some(rank))
    }

    fn pop_front(&self, scope: &ScopeId) -> Result<Option<String>, StoreError> {
        let conn = self.lock();
        // Remove-and-return in one statement; the bundled SQLite
        // supports DELETE .. RETURNING.
        conn.query_row(
            "DELETE FROM queue_order
             WHERE scope_id = ?1
               AND seq = (SELECT seq FROM queue_order WHERE scope_id = ?1
                          ORDER BY joined_at_ms, seq LIMIT 1)
             RETURNING ticket_id",
            params![scope.to_string()],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)
    }

    fn remove(&self, scope: &ScopeId, ticket_id: &str) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM queue_order WHERE scope_id = ? AND ticket_id = ?",
            params![scope.to_string(), ticket_id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn waiting_count(&self, scope: &ScopeId) -> Result<u64, StoreError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM queue_order WHERE scope_id = ?",
            params![scope.to_string()],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    fn put_ticket(&self, record: &TicketRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record).map_err(db_err)?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO tickets (scope_id, ticket_id, status, record) VALUES (?, ?, ?, ?)
             ON CONFLICT (scope_id, ticket_id) DO UPDATE SET status = excluded.status, record = excluded.record",
            params![
                record.scope.to_string(),
                record.ticket_id,
                record.status.as_str(),
                json
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn get_ticket(
        &self,
        scope: &ScopeId,
        ticket_id: &str,
    ) -> Result<Option<TicketRecord>, StoreError> {
        let conn = self.lock();
        let json: Option<String> = conn
            .query_row(
                "SELECT record FROM tickets WHERE scope_id = ? AND ticket_id = ?",
                params![scope.to_string(), ticket_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        json.map(|j| serde_json::from_str(&j).map_err(db_err))
            .transpose()
    }

    fn delete_ticket(&self, scope: &ScopeId, ticket_id: &str) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM tickets WHERE scope_id = ? AND ticket_id = ?",
            params![scope.to_string(), ticket_id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn active_ticket_ids(&self, scope: &ScopeId) -> Result<Vec<String>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT ticket_id FROM tickets WHERE scope_id = ? AND status = ?")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![scope.to_string(), TicketStatus::Active.as_str()],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        rows.collect::<Result<Vec<String>, _>>().map_err(db_err)
    }

    fn all_ticket_ids(&self, scope: &ScopeId) -> Result<Vec<String>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT ticket_id FROM tickets WHERE scope_id = ?1
                 UNION
                 SELECT ticket_id FROM queue_order WHERE scope_id = ?1
                 UNION
                 SELECT ticket_id FROM owner_index WHERE scope_id = ?1",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![scope.to_string()], |row| row.get(0))
            .map_err(db_err)?;
        rows.collect::<Result<Vec<String>, _>>().map_err(db_err)
    }

    fn map_owner(
        &self,
        scope: &ScopeId,
        owner_id: &str,
        ticket_id: &str,
    ) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO owner_index (scope_id, owner_id, ticket_id) VALUES (?, ?, ?)
             ON CONFLICT (scope_id, owner_id) DO UPDATE SET ticket_id = excluded.ticket_id",
            params![scope.to_string(), owner_id, ticket_id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn unmap_owner(&self, scope: &ScopeId, owner_id: &str) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM owner_index WHERE scope_id = ? AND owner_id = ?",
            params![scope.to_string(), owner_id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn owner_ticket(&self, scope: &ScopeId, owner_id: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT ticket_id FROM owner_index WHERE scope_id = ? AND owner_id = ?",
            params![scope.to_string(), owner_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)
    }

    fn next_sequence(&self, scope: &ScopeId) -> Result<u64, StoreError> {
        let conn = self.lock();
        Self::ensure_meta(&conn, scope)?;
        conn.execute(
            "UPDATE scope_meta SET sequence = sequence + 1 WHERE scope_id = ?",
            params![scope.to_string()],
        )
        .map_err(db_err)?;
        conn.query_row(
            "SELECT sequence FROM scope_meta WHERE scope_id = ?",
            params![scope.to_string()],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    fn current_sequence(&self, scope: &ScopeId) -> Result<u64, StoreError> {
        let conn = self.lock();
        let seq: Option<u64> = conn
            .query_row(
                "SELECT sequence FROM scope_meta WHERE scope_id = ?",
                params![scope.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(seq.unwrap_or(0))
    }

    fn avg_service_ms(&self, scope: &ScopeId) -> Result<Option<f64>, StoreError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT avg_service_ms FROM scope_meta WHERE scope_id = ?",
            params![scope.to_string()],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)
        .map(Option::flatten)
    }

    fn set_avg_service_ms(&self, scope: &ScopeId, avg_ms: f64) -> Result<(), StoreError> {
        let conn = self.lock();
        Self::ensure_meta(&conn, scope)?;
        conn.execute(
            "UPDATE scope_meta SET avg_service_ms = ? WHERE scope_id = ?",
            params![avg_ms, scope.to_string()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn set_paused(&self, scope: &ScopeId, paused: bool) -> Result<(), StoreError> {
        let conn = self.lock();
        Self::ensure_meta(&conn, scope)?;
        conn.execute(
            "UPDATE scope_meta SET paused = ? WHERE scope_id = ?",
            params![paused as i64, scope.to_string()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn is_paused(&self, scope: &ScopeId) -> Result<bool, StoreError> {
        let conn = self.lock();
        let paused: Option<i64> = conn
            .query_row(
                "SELECT paused FROM scope_meta WHERE scope_id = ?",
                params![scope.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(paused.unwrap_or(0) != 0)
    }

    fn claim_active_slot(&self, scope: &ScopeId, capacity: u32) -> Result<bool, StoreError> {
        let conn = self.lock();
        Self::ensure_meta(&conn, scope)?;
        // Compare-and-increment in one statement; the WHERE clause is
        // the capacity check.
        let updated = conn
            .execute(
                "UPDATE scope_meta SET active_slots = active_slots + 1
                 WHERE scope_id = ? AND active_slots < ?",
                params![scope.to_string(), capacity as i64],
            )
            .map_err(db_err)?;
        Ok(updated == 1)
    }

    fn release_active_slot(&self, scope: &ScopeId) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE scope_meta SET active_slots = MAX(active_slots - 1, 0) WHERE scope_id = ?",
            params![scope.to_string()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn active_count(&self, scope: &ScopeId) -> Result<u64, StoreError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM tickets WHERE scope_id = ? AND status = ?",
            params![scope.to_string(), TicketStatus::Active.as_str()],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    fn init_scope(&self, scope: &ScopeId) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO scope_meta (scope_id, sequence, avg_service_ms, paused, active_slots, initialized)
             VALUES (?, 0, NULL, 0, 0, 1)
             ON CONFLICT (scope_id) DO UPDATE SET
                 sequence = 0, avg_service_ms = NULL, paused = 0, active_slots = 0, initialized = 1",
            params![scope.to_string()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn is_initialized(&self, scope: &ScopeId) -> Result<bool, StoreError> {
        let conn = self.lock();
        let initialized: Option<i64> = conn
            .query_row(
                "SELECT initialized FROM scope_meta WHERE scope_id = ?",
                params![scope.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(initialized.unwrap_or(0) != 0)
    }

    fn count_scope_keys(&self, scope: &ScopeId) -> Result<u64, StoreError> {
        let conn = self.lock();
        let scope_str = scope.to_string();
        let mut total: u64 = 0;
        for table in ["tickets", "queue_order", "owner_index", "scope_meta"] {
            let count: u64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM {} WHERE scope_id = ?", table),
                    params![scope_str],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            total += count;
        }
        Ok(total)
    }

    fn purge_scope(&self, scope: &ScopeId) -> Result<u64, StoreError> {
        let mut conn = self.lock();
        let scope_str = scope.to_string();
        let tx = conn.transaction().map_err(db_err)?;
        let mut deleted: u64 = 0;
        for table in ["tickets", "queue_order", "owner_index", "scope_meta"] {
            deleted += tx
                .execute(
                    &format!("DELETE FROM {} WHERE scope_id = ?", table),
                    params![scope_str],
                )
                .map_err(db_err)? as u64;
        }
        tx.commit().map_err(db_err)?;
        Ok(deleted)
    }

    fn scope_ids(&self) -> Result<Vec<ScopeId>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT scope_id FROM scope_meta
                 UNION SELECT scope_id FROM tickets
                 UNION SELECT scope_id FROM queue_order
                 UNION SELECT scope_id FROM owner_index",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?;
        let mut scopes = Vec::new();
        for raw in rows {
            let raw = raw.map_err(db_err)?;
            // Skip rows that predate the current scope format.
            if let Ok(scope) = raw.parse() {
                scopes.push(scope);
            }
        }
        Ok(scopes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn scope() -> ScopeId {
        ScopeId::new("show", "sched").unwrap()
    }

    #[test]
    fn test_enqueue_and_rank() {
        let store = SqliteQueueStore::in_memory().unwrap();
        let now = Utc::now();
        store.enqueue(&scope(), "a", now).unwrap();
        store.enqueue(&scope(), "b", now + Duration::milliseconds(5)).unwrap();
        store.enqueue(&scope(), "c", now + Duration::milliseconds(5)).unwrap();

        assert_eq!(store.rank_of(&scope(), "a").unwrap(), Some(0));
        // Equal timestamps resolved by insertion order.
        assert_eq!(store.rank_of(&scope(), "b").unwrap(), Some(1));
        assert_eq!(store.rank_of(&scope(), "c").unwrap(), Some(2));
        assert_eq!(store.waiting_count(&scope()).unwrap(), 3);
    }

    #[test]
    fn test_enqueue_duplicate_rejected() {
        let store = SqliteQueueStore::in_memory().unwrap();
        store.enqueue(&scope(), "a", Utc::now()).unwrap();
        let result = store.enqueue(&scope(), "a", Utc::now());
        assert!(matches!(result, Err(StoreError::AlreadyQueued(_))));
    }

    #[test]
    fn test_pop_front_removes_in_order() {
        let store = SqliteQueueStore::in_memory().unwrap();
        let now = Utc::now();
        store.enqueue(&scope(), "a", now).unwrap();
        store.enqueue(&scope(), "b", now).unwrap();
        store.enqueue(&scope(), "c", now + Duration::milliseconds(1)).unwrap();

        assert_eq!(store.pop_front(&scope()).unwrap(), Some("a".to_string()));
        assert_eq!(store.pop_front(&scope()).unwrap(), Some("b".to_string()));
        assert_eq!(store.pop_front(&scope()).unwrap(), Some("c".to_string()));
        assert_eq!(store.pop_front(&scope()).unwrap(), None);
        assert_eq!(store.waiting_count(&scope()).unwrap(), 0);
    }

    #[test]
    fn test_ticket_record_round_trip() {
        let store = SqliteQueueStore::in_memory().unwrap();
        let mut record = TicketRecord::new_waiting(scope(), "owner-1", Utc::now());
        store.put_ticket(&record).unwrap();

        let got = store.get_ticket(&scope(), &record.ticket_id).unwrap().unwrap();
        assert_eq!(got.owner_id, "owner-1");
        assert_eq!(got.status, TicketStatus::Waiting);

        // Overwrite with updated status.
        record.status = TicketStatus::Active;
        record.active_token = Some("tok".to_string());
        store.put_ticket(&record).unwrap();
        let got = store.get_ticket(&scope(), &record.ticket_id).unwrap().unwrap();
        assert_eq!(got.status, TicketStatus::Active);
        assert_eq!(store.active_ticket_ids(&scope()).unwrap().len(), 1);
        assert_eq!(store.active_count(&scope()).unwrap(), 1);
    }

    #[test]
    fn test_sequence_and_slots() {
        let store = SqliteQueueStore::in_memory().unwrap();
        assert_eq!(store.current_sequence(&scope()).unwrap(), 0);
        assert_eq!(store.next_sequence(&scope()).unwrap(), 1);
        assert_eq!(store.next_sequence(&scope()).unwrap(), 2);
        assert_eq!(store.current_sequence(&scope()).unwrap(), 2);

        assert!(store.claim_active_slot(&scope(), 1).unwrap());
        assert!(!store.claim_active_slot(&scope(), 1).unwrap());
        store.release_active_slot(&scope()).unwrap();
        assert!(store.claim_active_slot(&scope(), 1).unwrap());
    }

    #[test]
    fn test_init_scope_resets() {
        let store = SqliteQueueStore::in_memory().unwrap();
        store.next_sequence(&scope()).unwrap();
        store.set_avg_service_ms(&scope(), 42.0).unwrap();
        store.set_paused(&scope(), true).unwrap();

        store.init_scope(&scope()).unwrap();
        assert!(store.is_initialized(&scope()).unwrap());
        assert_eq!(store.avg_service_ms(&scope()).unwrap(), None);
        assert!(!store.is_paused(&scope()).unwrap());
        assert_eq!(store.next_sequence(&scope()).unwrap(), 1);
    }

    #[test]
    fn test_purge_and_scope_ids() {
        let store = SqliteQueueStore::in_memory().unwrap();
        let record = TicketRecord::new_waiting(scope(), "owner-1", Utc::now());
        store.put_ticket(&record).unwrap();
        store.enqueue(&scope(), &record.ticket_id, record.joined_at).unwrap();
        store.map_owner(&scope(), "owner-1", &record.ticket_id).unwrap();
        store.next_sequence(&scope()).unwrap();

        assert_eq!(store.scope_ids().unwrap(), vec![scope()]);
        assert_eq!(store.count_scope_keys(&scope()).unwrap(), 4);

        let deleted = store.purge_scope(&scope()).unwrap();
        assert_eq!(deleted, 4);
        assert!(store.scope_ids().unwrap().is_empty());
        assert_eq!(store.purge_scope(&scope()).unwrap(), 0);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");

        {
            let store = SqliteQueueStore::new(&path).unwrap();
            let record = TicketRecord::new_waiting(scope(), "owner-1", Utc::now());
            store.put_ticket(&record).unwrap();
            store.map_owner(&scope(), "owner-1", &record.ticket_id).unwrap();
        }

        let store = SqliteQueueStore::new(&path).unwrap();
        let ticket_id = store.owner_ticket(&scope(), "owner-1").unwrap().unwrap();
        assert!(store.get_ticket(&scope(), &ticket_id).unwrap().is_some());
    }
}
