//! Per-record sync baselines.
//!
//! One row per tracked record: the digest of the last reconciled content,
//! when and from which representation it was established, which machine
//! wrote it, and the conflict flags that feed the human review queue.

use crate::db::{decode_time, encode_time, Db};
use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use memoir_types::{MachineId, RecordId, RecordKind};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which representation last produced the authoritative baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncSource {
    /// The flat-file representation (an import pass).
    File,
    /// The relational store's own view (an export pass or in-app edit).
    GeneratedView,
}

impl SyncSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncSource::File => "file",
            SyncSource::GeneratedView => "generated-view",
        }
    }
}

impl fmt::Display for SyncSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncSource {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(SyncSource::File),
            "generated-view" => Ok(SyncSource::GeneratedView),
            other => Err(StorageError::InvalidData(format!(
                "unknown sync source: {other}"
            ))),
        }
    }
}

/// The sync baseline of a single record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub entity_type: RecordKind,
    pub entity_id: RecordId,
    pub last_synced_at: DateTime<Utc>,
    pub sync_source: SyncSource,
    /// Hex digest of the synchronizable fields as of `last_synced_at`.
    pub sync_hash: String,
    pub conflict_detected: bool,
    /// Only meaningful while `conflict_detected` is true.
    pub conflict_resolved: bool,
    pub machine_id: MachineId,
}

/// Handle for reading and writing sync baselines.
#[derive(Clone)]
pub struct SyncStateStore {
    db: Db,
}

impl SyncStateStore {
    pub(crate) fn new(db: Db) -> Self {
        Self { db }
    }

    /// Fetches the baseline for a record, if one has been established.
    pub fn get(&self, kind: RecordKind, id: &RecordId) -> StorageResult<Option<SyncState>> {
        let conn = self.db.conn();
        let row = conn
            .query_row(
                "SELECT entity_type, entity_id, last_synced_at, sync_source, sync_hash,
                        conflict_detected, conflict_resolved, machine_id
                 FROM sync_state WHERE entity_type = ?1 AND entity_id = ?2",
                params![kind.as_str(), id.as_str()],
                row_to_tuple,
            )
            .optional()?;
        row.map(tuple_to_state).transpose()
    }

    /// Inserts or overwrites a baseline row.
    pub fn upsert(&self, state: &SyncState) -> StorageResult<()> {
        let conn = self.db.conn();
        upsert_row(&conn, state)
    }

    /// Lists conflicted rows, filtered by resolution status.
    ///
    /// `resolved = false` is the review queue; `resolved = true` is the
    /// already-acknowledged history.
    pub fn list_conflicts(&self, resolved: bool) -> StorageResult<Vec<SyncState>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT entity_type, entity_id, last_synced_at, sync_source, sync_hash,
                    conflict_detected, conflict_resolved, machine_id
             FROM sync_state
             WHERE conflict_detected = 1 AND conflict_resolved = ?1
             ORDER BY entity_type, entity_id",
        )?;
        let rows = stmt.query_map(params![resolved as i64], row_to_tuple)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(tuple_to_state(row?)?);
        }
        Ok(result)
    }

    /// Marks a conflicted row as resolved.
    ///
    /// Fails with `NotFound` if the row does not exist; marking an
    /// already-resolved row again is a no-op, not an error.
    pub fn mark_resolved(&self, kind: RecordKind, id: &RecordId) -> StorageResult<()> {
        let conn = self.db.conn();
        let updated = conn.execute(
            "UPDATE sync_state SET conflict_resolved = 1
             WHERE entity_type = ?1 AND entity_id = ?2",
            params![kind.as_str(), id.as_str()],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!(
                "no sync state for {kind} {id}"
            )));
        }
        Ok(())
    }

    /// Removes a baseline row. Used only when the record itself is purged.
    pub fn remove(&self, kind: RecordKind, id: &RecordId) -> StorageResult<()> {
        let conn = self.db.conn();
        conn.execute(
            "DELETE FROM sync_state WHERE entity_type = ?1 AND entity_id = ?2",
            params![kind.as_str(), id.as_str()],
        )?;
        Ok(())
    }
}

type RawRow = (String, String, String, String, String, bool, bool, String);

fn row_to_tuple(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn tuple_to_state(raw: RawRow) -> StorageResult<SyncState> {
    let (kind, id, synced_at, source, hash, detected, resolved, machine) = raw;
    Ok(SyncState {
        entity_type: RecordKind::from_str(&kind)
            .map_err(|e| StorageError::InvalidData(e.to_string()))?,
        entity_id: RecordId::new(id),
        last_synced_at: decode_time(&synced_at)?,
        sync_source: source.parse()?,
        sync_hash: hash,
        conflict_detected: detected,
        conflict_resolved: resolved,
        machine_id: MachineId::new(machine),
    })
}

pub(crate) fn upsert_row(conn: &Connection, state: &SyncState) -> StorageResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO sync_state
         (entity_type, entity_id, last_synced_at, sync_source, sync_hash,
          conflict_detected, conflict_resolved, machine_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            state.entity_type.as_str(),
            state.entity_id.as_str(),
            encode_time(&state.last_synced_at),
            state.sync_source.as_str(),
            state.sync_hash,
            state.conflict_detected,
            state.conflict_resolved,
            state.machine_id.as_str(),
        ],
    )?;
    Ok(())
}

pub(crate) fn remove_row(
    conn: &Connection,
    kind: RecordKind,
    id: &RecordId,
) -> StorageResult<()> {
    conn.execute(
        "DELETE FROM sync_state WHERE entity_type = ?1 AND entity_id = ?2",
        params![kind.as_str(), id.as_str()],
    )?;
    Ok(())
}
