//! Deletion markers with expiry.
//!
//! A tombstone records that a human deliberately removed an association (or
//! a whole record), so a stale flat file merged in later cannot silently
//! reintroduce it. Tombstones are reaped after a retention window; once
//! reaped, the suppression guarantee lapses by design.

use crate::db::{decode_time, encode_time, Db};
use crate::error::StorageResult;
use chrono::{DateTime, Duration, Utc};
use memoir_types::{RecordId, RecordKind};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// A single deletion marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tombstone {
    /// The parent record the association belonged to; `None` for a
    /// whole-record tombstone.
    pub owning_entity_id: Option<RecordId>,
    pub entity_type: RecordKind,
    pub entity_id: RecordId,
    pub deleted_at: DateTime<Utc>,
}

/// Operational counts over the tombstone table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TombstoneStats {
    /// Counts keyed by entity type tag.
    pub by_type: BTreeMap<String, usize>,
    /// Deleted within the last 7 days.
    pub fresh: usize,
    /// Deleted between 7 and 30 days ago.
    pub aging: usize,
    /// Older than 30 days (reapable under the default retention).
    pub expired: usize,
}

/// Handle for recording, consulting, and reaping tombstones.
#[derive(Clone)]
pub struct TombstoneStore {
    db: Db,
}

impl TombstoneStore {
    pub(crate) fn new(db: Db) -> Self {
        Self { db }
    }

    /// Records a deletion observed now.
    pub fn record(
        &self,
        owner: Option<&RecordId>,
        kind: RecordKind,
        id: &RecordId,
    ) -> StorageResult<()> {
        self.record_at(owner, kind, id, Utc::now())
    }

    /// Records a deletion with an explicit timestamp (historical imports,
    /// tests). Recording the same tuple again keeps the earliest timestamp.
    pub fn record_at(
        &self,
        owner: Option<&RecordId>,
        kind: RecordKind,
        id: &RecordId,
        deleted_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let conn = self.db.conn();
        insert_row(&conn, owner, kind, id, deleted_at)
    }

    /// Returns true if a tombstone exists for the exact tuple. Age plays no
    /// part here; expiry is enacted by [`reap`](TombstoneStore::reap).
    pub fn is_tombstoned(
        &self,
        owner: Option<&RecordId>,
        kind: RecordKind,
        id: &RecordId,
    ) -> StorageResult<bool> {
        let conn = self.db.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tombstones
             WHERE owning_entity_id = ?1 AND entity_type = ?2 AND entity_id = ?3",
            params![owner_key(owner), kind.as_str(), id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Returns every tombstoned (kind, id) target under an owner record.
    pub fn tombstoned_for_owner(
        &self,
        owner: &RecordId,
    ) -> StorageResult<Vec<(RecordKind, RecordId)>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT entity_type, entity_id FROM tombstones WHERE owning_entity_id = ?1",
        )?;
        let rows = stmt.query_map(params![owner.as_str()], |row| {
            let kind: String = row.get(0)?;
            let id: String = row.get(1)?;
            Ok((kind, id))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (kind_str, id) = row?;
            let kind = RecordKind::from_str(&kind_str)
                .map_err(|e| crate::StorageError::InvalidData(e.to_string()))?;
            result.push((kind, RecordId::new(id)));
        }
        Ok(result)
    }

    /// Lists every tombstone, oldest first.
    pub fn all(&self) -> StorageResult<Vec<Tombstone>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT owning_entity_id, entity_type, entity_id, deleted_at
             FROM tombstones ORDER BY deleted_at",
        )?;
        let rows = stmt.query_map([], |row| {
            let owner: String = row.get(0)?;
            let kind: String = row.get(1)?;
            let id: String = row.get(2)?;
            let deleted_at: String = row.get(3)?;
            Ok((owner, kind, id, deleted_at))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (owner, kind_str, id, deleted_str) = row?;
            let kind = RecordKind::from_str(&kind_str)
                .map_err(|e| crate::StorageError::InvalidData(e.to_string()))?;
            result.push(Tombstone {
                owning_entity_id: (!owner.is_empty()).then(|| RecordId::new(owner)),
                entity_type: kind,
                entity_id: RecordId::new(id),
                deleted_at: decode_time(&deleted_str)?,
            });
        }
        Ok(result)
    }

    /// Permanently deletes tombstones older than the cutoff.
    /// Returns the number removed. Irreversible.
    pub fn reap(&self, older_than: DateTime<Utc>) -> StorageResult<usize> {
        let conn = self.db.conn();
        let removed = conn.execute(
            "DELETE FROM tombstones WHERE deleted_at < ?1",
            params![encode_time(&older_than)],
        )?;
        Ok(removed)
    }

    /// Counts tombstones by entity type and age bucket.
    pub fn stats(&self) -> StorageResult<TombstoneStats> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare("SELECT entity_type, deleted_at FROM tombstones")?;
        let rows = stmt.query_map([], |row| {
            let kind: String = row.get(0)?;
            let deleted_at: String = row.get(1)?;
            Ok((kind, deleted_at))
        })?;

        let now = Utc::now();
        let mut stats = TombstoneStats::default();
        for row in rows {
            let (kind, deleted_str) = row?;
            *stats.by_type.entry(kind).or_insert(0) += 1;
            let deleted_at = decode_time(&deleted_str)?;
            let age = now - deleted_at;
            if age < Duration::days(7) {
                stats.fresh += 1;
            } else if age < Duration::days(30) {
                stats.aging += 1;
            } else {
                stats.expired += 1;
            }
        }
        Ok(stats)
    }
}

fn owner_key(owner: Option<&RecordId>) -> String {
    owner.map(|o| o.as_str().to_string()).unwrap_or_default()
}

pub(crate) fn insert_row(
    conn: &Connection,
    owner: Option<&RecordId>,
    kind: RecordKind,
    id: &RecordId,
    deleted_at: DateTime<Utc>,
) -> StorageResult<()> {
    // INSERT OR IGNORE keeps the earliest deleted_at for a re-recorded tuple.
    conn.execute(
        "INSERT OR IGNORE INTO tombstones (owning_entity_id, entity_type, entity_id, deleted_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            owner_key(owner),
            kind.as_str(),
            id.as_str(),
            encode_time(&deleted_at),
        ],
    )?;
    Ok(())
}
