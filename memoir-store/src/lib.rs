//! SQLite storage layer for Memoir.
//!
//! One database file holds both the live relational view of the records and
//! the reconciliation bookkeeping that keeps it in step with the flat files:
//!
//! - `records` / `record_links`: records as typed JSON blobs plus their
//!   materialized associations
//! - `sync_state`: the per-record baseline digest and conflict flags
//! - `tombstones`: deletion markers with expiry
//! - `deferred_refs`: forward references awaiting a target
//!
//! The [`Store`] facade exposes one handle per table family and the
//! cross-table transactional operations the reconciliation engine needs:
//! a crash mid-pass must never leave a record updated while its baseline
//! still reflects the pre-update digest, or the reverse.

mod db;
mod deferred;
mod error;
mod records;
mod sync_state;
mod tombstones;

pub use deferred::{DeferredRefStore, DeferredReference};
pub use error::{StorageError, StorageResult};
pub use records::RecordStore;
pub use sync_state::{SyncSource, SyncState, SyncStateStore};
pub use tombstones::{Tombstone, TombstoneStats, TombstoneStore};

use chrono::Utc;
use db::Db;
use memoir_types::{Association, Record, RecordId, RecordKind};
use rusqlite::params;
use std::path::Path;

/// Facade over the single-file store.
#[derive(Clone)]
pub struct Store {
    db: Db,
}

impl Store {
    /// Opens (or creates) the store at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Ok(Self {
            db: Db::open(path)?,
        })
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Ok(Self {
            db: Db::open_in_memory()?,
        })
    }

    /// Handle for live records.
    pub fn records(&self) -> RecordStore {
        RecordStore::new(self.db.clone())
    }

    /// Handle for sync baselines.
    pub fn sync_states(&self) -> SyncStateStore {
        SyncStateStore::new(self.db.clone())
    }

    /// Handle for tombstones.
    pub fn tombstones(&self) -> TombstoneStore {
        TombstoneStore::new(self.db.clone())
    }

    /// Handle for deferred references.
    pub fn deferred(&self) -> DeferredRefStore {
        DeferredRefStore::new(self.db.clone())
    }

    /// Commits a reconciled record and its new baseline atomically:
    /// record blob, link rows, deferred-reference rows, and sync state move
    /// together or not at all. A record committed at a baseline with its
    /// reference literals missing could never register them later, since the
    /// unchanged file short-circuits every following pass.
    pub fn apply_reconciled(&self, record: &Record, state: &SyncState) -> StorageResult<()> {
        let mut conn = self.db.conn();
        let tx = conn.transaction()?;
        records::upsert_record(&tx, record)?;
        records::replace_links(&tx, record)?;
        if matches!(record, Record::Thread(_)) {
            deferred::sync_rows(&tx, &record.id(), &record.reference_literals())?;
        }
        sync_state::upsert_row(&tx, state)?;
        tx.commit()?;
        Ok(())
    }

    /// Commits a store-side association removal atomically: the rewritten
    /// record, the dropped link, the tombstone, and the new baseline.
    pub fn apply_removal(
        &self,
        record: &Record,
        removed: &Association,
        state: &SyncState,
    ) -> StorageResult<()> {
        let owner = record.id();
        let mut conn = self.db.conn();
        let tx = conn.transaction()?;
        records::upsert_record(&tx, record)?;
        tx.execute(
            "DELETE FROM record_links
             WHERE owner_kind = ?1 AND owner_id = ?2 AND target_kind = ?3 AND target_id = ?4",
            params![
                record.kind().as_str(),
                owner.as_str(),
                removed.kind.as_str(),
                removed.id.as_str(),
            ],
        )?;
        tombstones::insert_row(&tx, Some(&owner), removed.kind, &removed.id, Utc::now())?;
        sync_state::upsert_row(&tx, state)?;
        tx.commit()?;
        Ok(())
    }

    /// Permanently removes a record, its links, and its baseline, leaving a
    /// whole-record tombstone so stale files cannot resurrect it.
    pub fn purge_record(&self, kind: RecordKind, id: &RecordId) -> StorageResult<()> {
        let mut conn = self.db.conn();
        let tx = conn.transaction()?;
        records::delete_record(&tx, kind, id)?;
        sync_state::remove_row(&tx, kind, id)?;
        tx.execute(
            "DELETE FROM deferred_refs WHERE owning_entity_id = ?1",
            params![id.as_str()],
        )?;
        tombstones::insert_row(&tx, None, kind, id, Utc::now())?;
        tx.commit()?;
        Ok(())
    }
}
