//! Live record storage.
//!
//! Records persist as typed JSON blobs keyed by (kind, id); associations are
//! materialized into `record_links` rows so they can be queried relationally
//! and suppressed individually by tombstones.

use crate::db::{encode_time, Db};
use crate::error::{StorageError, StorageResult};
use chrono::Utc;
use memoir_types::{Association, Record, RecordId, RecordKind};
use rusqlite::{params, Connection, OptionalExtension};
use std::str::FromStr;

/// Handle for reading and writing live records.
#[derive(Clone)]
pub struct RecordStore {
    db: Db,
}

impl RecordStore {
    pub(crate) fn new(db: Db) -> Self {
        Self { db }
    }

    /// Fetches a record by kind and id.
    pub fn get(&self, kind: RecordKind, id: &RecordId) -> StorageResult<Option<Record>> {
        let conn = self.db.conn();
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM records WHERE kind = ?1 AND id = ?2",
                params![kind.as_str(), id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Returns true if a record with this kind and id exists.
    pub fn exists(&self, kind: RecordKind, id: &RecordId) -> StorageResult<bool> {
        let conn = self.db.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE kind = ?1 AND id = ?2",
            params![kind.as_str(), id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Inserts or overwrites a record together with its link rows.
    pub fn put(&self, record: &Record) -> StorageResult<()> {
        let mut conn = self.db.conn();
        let tx = conn.transaction()?;
        upsert_record(&tx, record)?;
        replace_links(&tx, record)?;
        tx.commit()?;
        Ok(())
    }

    /// Deletes a record and its link rows. Missing records are a no-op.
    pub fn delete(&self, kind: RecordKind, id: &RecordId) -> StorageResult<()> {
        let mut conn = self.db.conn();
        let tx = conn.transaction()?;
        delete_record(&tx, kind, id)?;
        tx.commit()?;
        Ok(())
    }

    /// Lists every record of a given kind, ordered by id.
    pub fn list_kind(&self, kind: RecordKind) -> StorageResult<Vec<Record>> {
        let conn = self.db.conn();
        let mut stmt =
            conn.prepare("SELECT data FROM records WHERE kind = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![kind.as_str()], |row| {
            let data: String = row.get(0)?;
            Ok(data)
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(serde_json::from_str(&row?)?);
        }
        Ok(result)
    }

    /// Returns the associations currently materialized for an owner record.
    pub fn links_for(
        &self,
        owner_kind: RecordKind,
        owner_id: &RecordId,
    ) -> StorageResult<Vec<Association>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT target_kind, target_id FROM record_links
             WHERE owner_kind = ?1 AND owner_id = ?2
             ORDER BY target_kind, target_id",
        )?;
        let rows = stmt.query_map(params![owner_kind.as_str(), owner_id.as_str()], |row| {
            let kind: String = row.get(0)?;
            let id: String = row.get(1)?;
            Ok((kind, id))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (kind_str, id) = row?;
            let kind = RecordKind::from_str(&kind_str)
                .map_err(|e| StorageError::InvalidData(e.to_string()))?;
            result.push(Association::new(kind, id));
        }
        Ok(result)
    }
}

pub(crate) fn upsert_record(conn: &Connection, record: &Record) -> StorageResult<()> {
    let json = serde_json::to_string(record)?;
    conn.execute(
        "INSERT OR REPLACE INTO records (kind, id, data, updated_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            record.kind().as_str(),
            record.id().as_str(),
            json,
            encode_time(&Utc::now()),
        ],
    )?;
    Ok(())
}

pub(crate) fn replace_links(conn: &Connection, record: &Record) -> StorageResult<()> {
    let kind = record.kind();
    let id = record.id();
    conn.execute(
        "DELETE FROM record_links WHERE owner_kind = ?1 AND owner_id = ?2",
        params![kind.as_str(), id.as_str()],
    )?;
    for assoc in record.associations() {
        conn.execute(
            "INSERT OR IGNORE INTO record_links (owner_kind, owner_id, target_kind, target_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                kind.as_str(),
                id.as_str(),
                assoc.kind.as_str(),
                assoc.id.as_str(),
            ],
        )?;
    }
    Ok(())
}

pub(crate) fn delete_record(
    conn: &Connection,
    kind: RecordKind,
    id: &RecordId,
) -> StorageResult<()> {
    conn.execute(
        "DELETE FROM records WHERE kind = ?1 AND id = ?2",
        params![kind.as_str(), id.as_str()],
    )?;
    conn.execute(
        "DELETE FROM record_links WHERE owner_kind = ?1 AND owner_id = ?2",
        params![kind.as_str(), id.as_str()],
    )?;
    Ok(())
}
