//! Shared SQLite connection handle and schema initialization.

use crate::error::StorageResult;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// A cloneable handle to the single SQLite connection backing the store.
///
/// All tables live in one database file so that a reconciliation pass can
/// update a record, its links, and its sync baseline in one transaction.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    /// Opens (or creates) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Locks and returns the underlying connection.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.conn();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (kind, id)
            );

            CREATE TABLE IF NOT EXISTS record_links (
                owner_kind TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                target_kind TEXT NOT NULL,
                target_id TEXT NOT NULL,
                UNIQUE (owner_kind, owner_id, target_kind, target_id)
            );

            CREATE TABLE IF NOT EXISTS sync_state (
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                last_synced_at TEXT NOT NULL,
                sync_source TEXT NOT NULL,
                sync_hash TEXT NOT NULL,
                conflict_detected INTEGER NOT NULL DEFAULT 0,
                conflict_resolved INTEGER NOT NULL DEFAULT 0,
                machine_id TEXT NOT NULL,
                PRIMARY KEY (entity_type, entity_id)
            );

            -- owning_entity_id is '' for whole-record tombstones: SQLite
            -- treats NULLs as distinct in UNIQUE constraints, which would
            -- defeat the one-row-per-tuple invariant.
            CREATE TABLE IF NOT EXISTS tombstones (
                owning_entity_id TEXT NOT NULL DEFAULT '',
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                deleted_at TEXT NOT NULL,
                UNIQUE (owning_entity_id, entity_type, entity_id)
            );

            CREATE TABLE IF NOT EXISTS deferred_refs (
                owning_entity_id TEXT NOT NULL,
                reference_literal TEXT NOT NULL,
                resolved_target_id TEXT,
                UNIQUE (owning_entity_id, reference_literal)
            );
            ",
        )?;
        Ok(())
    }
}

/// Serializes a timestamp for a TEXT column.
pub(crate) fn encode_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339()
}

/// Parses a timestamp from a TEXT column.
pub(crate) fn decode_time(s: &str) -> Result<DateTime<Utc>, crate::StorageError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| crate::StorageError::InvalidData(format!("bad timestamp {s:?}: {e}")))
}
