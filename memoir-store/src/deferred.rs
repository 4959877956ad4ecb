//! Unresolved forward references.
//!
//! A thread may reference an entry date before any entry with that date
//! exists. The reference is stored verbatim with a NULL target and bound
//! later by the resolution pass; an unresolved row is an expected state,
//! not an error.

use crate::db::Db;
use crate::error::{StorageError, StorageResult};
use memoir_types::RecordId;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// One forward pointer from an owning record to a literal target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredReference {
    pub owning_entity_id: RecordId,
    /// The original textual target, preserved verbatim to allow retry.
    pub reference_literal: String,
    /// Filled in once a matching target record exists.
    pub resolved_target_id: Option<RecordId>,
}

/// Handle for creating and binding deferred references.
#[derive(Clone)]
pub struct DeferredRefStore {
    db: Db,
}

impl DeferredRefStore {
    pub(crate) fn new(db: Db) -> Self {
        Self { db }
    }

    /// Registers the current reference literals of an owner record.
    ///
    /// New literals get fresh unresolved rows; rows whose literal no longer
    /// appears in the record are dropped (including bound ones; the human
    /// removed the reference). Idempotent.
    pub fn sync_references(&self, owner: &RecordId, literals: &[String]) -> StorageResult<()> {
        let mut conn = self.db.conn();
        let tx = conn.transaction()?;
        sync_rows(&tx, owner, literals)?;
        tx.commit()?;
        Ok(())
    }

    /// Lists every reference with a NULL target.
    pub fn unresolved(&self) -> StorageResult<Vec<DeferredReference>> {
        self.query_refs(
            "SELECT owning_entity_id, reference_literal, resolved_target_id
             FROM deferred_refs WHERE resolved_target_id IS NULL
             ORDER BY owning_entity_id, reference_literal",
            &[],
        )
    }

    /// Lists every reference held by an owner record.
    pub fn for_owner(&self, owner: &RecordId) -> StorageResult<Vec<DeferredReference>> {
        self.query_refs(
            "SELECT owning_entity_id, reference_literal, resolved_target_id
             FROM deferred_refs WHERE owning_entity_id = ?1
             ORDER BY reference_literal",
            &[owner.as_str()],
        )
    }

    /// Binds an unresolved reference to its target.
    ///
    /// Binding the same target again is a no-op. Binding a different target
    /// over an existing one is a contract violation and fails; a silently
    /// changing binding would corrupt downstream consumers. Use [`rebind`]
    /// for a deliberate override.
    ///
    /// [`rebind`]: DeferredRefStore::rebind
    pub fn bind(&self, owner: &RecordId, literal: &str, target: &RecordId) -> StorageResult<()> {
        let conn = self.db.conn();
        let current: Option<Option<String>> = conn
            .query_row(
                "SELECT resolved_target_id FROM deferred_refs
                 WHERE owning_entity_id = ?1 AND reference_literal = ?2",
                params![owner.as_str(), literal],
                |row| row.get(0),
            )
            .optional()?;

        match current {
            None => Err(StorageError::NotFound(format!(
                "no deferred reference {literal:?} for {owner}"
            ))),
            Some(Some(existing)) if existing != target.as_str() => {
                Err(StorageError::InvalidData(format!(
                    "reference {literal:?} of {owner} already bound to {existing}, \
                     refusing to rebind to {target}"
                )))
            }
            Some(Some(_)) => Ok(()),
            Some(None) => {
                conn.execute(
                    "UPDATE deferred_refs SET resolved_target_id = ?3
                     WHERE owning_entity_id = ?1 AND reference_literal = ?2",
                    params![owner.as_str(), literal, target.as_str()],
                )?;
                Ok(())
            }
        }
    }

    /// Explicitly overrides a binding, resolved or not.
    pub fn rebind(&self, owner: &RecordId, literal: &str, target: &RecordId) -> StorageResult<()> {
        let conn = self.db.conn();
        let updated = conn.execute(
            "UPDATE deferred_refs SET resolved_target_id = ?3
             WHERE owning_entity_id = ?1 AND reference_literal = ?2",
            params![owner.as_str(), literal, target.as_str()],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!(
                "no deferred reference {literal:?} for {owner}"
            )));
        }
        Ok(())
    }

    fn query_refs(&self, sql: &str, args: &[&str]) -> StorageResult<Vec<DeferredReference>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter().copied()), |row| {
            let owner: String = row.get(0)?;
            let literal: String = row.get(1)?;
            let target: Option<String> = row.get(2)?;
            Ok((owner, literal, target))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (owner, literal, target) = row?;
            result.push(DeferredReference {
                owning_entity_id: RecordId::new(owner),
                reference_literal: literal,
                resolved_target_id: target.map(RecordId::new),
            });
        }
        Ok(result)
    }
}

/// Prunes stale literals and registers new ones inside the caller's
/// transaction, so reference rows land (or not) together with the record
/// they belong to.
pub(crate) fn sync_rows(
    conn: &Connection,
    owner: &RecordId,
    literals: &[String],
) -> StorageResult<()> {
    let mut existing =
        conn.prepare("SELECT reference_literal FROM deferred_refs WHERE owning_entity_id = ?1")?;
    let rows = existing.query_map(params![owner.as_str()], |row| row.get::<_, String>(0))?;
    let mut stale = Vec::new();
    for row in rows {
        let literal = row?;
        if !literals.contains(&literal) {
            stale.push(literal);
        }
    }
    for literal in stale {
        conn.execute(
            "DELETE FROM deferred_refs
             WHERE owning_entity_id = ?1 AND reference_literal = ?2",
            params![owner.as_str(), literal],
        )?;
    }
    for literal in literals {
        conn.execute(
            "INSERT OR IGNORE INTO deferred_refs
             (owning_entity_id, reference_literal, resolved_target_id)
             VALUES (?1, ?2, NULL)",
            params![owner.as_str(), literal],
        )?;
    }
    Ok(())
}
