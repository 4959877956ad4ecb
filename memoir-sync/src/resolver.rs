//! Two-pass deferred-reference resolution.
//!
//! Import order is not the logical order of references between records: a
//! thread can point at an entry "in the future" of the batch, or at one not
//! written yet at all. Pass 1 (during ingest) stores the literals verbatim;
//! pass 2 walks every unresolved row after the batch lands and binds the
//! ones whose target now exists. Unmatched references stay unresolved (an
//! expected state, logged at informational level) and the pass can be
//! re-run at any time.

use crate::error::{SyncError, SyncResult};
use memoir_store::{DeferredRefStore, RecordStore, StorageError};
use memoir_types::{RecordId, RecordKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Collaborator-supplied rule turning a reference literal into a target id.
///
/// The resolution rule belongs to the reference's kind, not to the engine:
/// the engine only guarantees the retry and no-silent-rebind semantics.
pub trait ReferenceResolver {
    /// Attempts to locate the target for a literal. `Ok(None)` means the
    /// target legitimately does not exist yet.
    fn resolve(&self, literal: &str) -> SyncResult<Option<RecordId>>;
}

/// The standard rule for thread references: an exact-date lookup against
/// entry records, where the literal is the entry's ISO date.
pub struct EntryDateResolver {
    records: RecordStore,
}

impl EntryDateResolver {
    pub fn new(records: RecordStore) -> Self {
        Self { records }
    }
}

impl ReferenceResolver for EntryDateResolver {
    fn resolve(&self, literal: &str) -> SyncResult<Option<RecordId>> {
        let candidate = RecordId::new(literal);
        if self.records.exists(RecordKind::Entry, &candidate)? {
            Ok(Some(candidate))
        } else {
            Ok(None)
        }
    }
}

/// Outcome counts of one resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionReport {
    /// References bound during this pass.
    pub resolved: usize,
    /// References still awaiting a target.
    pub unresolved: usize,
}

/// Walks unresolved references and binds the ones that now have a target.
pub struct DeferredReferenceResolver {
    refs: DeferredRefStore,
}

impl DeferredReferenceResolver {
    pub fn new(refs: DeferredRefStore) -> Self {
        Self { refs }
    }

    /// Runs pass 2 over every unresolved reference.
    ///
    /// Idempotent and safe to repeat: already-bound references are never
    /// touched, and a reference that resolves in a later pass binds without
    /// altering unrelated bindings.
    pub fn resolve_pending(&self, rule: &dyn ReferenceResolver) -> SyncResult<ResolutionReport> {
        let mut report = ResolutionReport::default();

        for pending in self.refs.unresolved()? {
            match rule.resolve(&pending.reference_literal)? {
                Some(target) => {
                    self.bind_checked(
                        &pending.owning_entity_id,
                        &pending.reference_literal,
                        &target,
                    )?;
                    debug!(
                        "bound reference {:?} of {} to {}",
                        pending.reference_literal, pending.owning_entity_id, target
                    );
                    report.resolved += 1;
                }
                None => {
                    info!(
                        "reference {:?} of {} has no target yet",
                        pending.reference_literal, pending.owning_entity_id
                    );
                    report.unresolved += 1;
                }
            }
        }

        if report.resolved > 0 || report.unresolved > 0 {
            info!(
                "resolution pass: {} bound, {} still pending",
                report.resolved, report.unresolved
            );
        }
        Ok(report)
    }

    /// Explicitly overrides a binding. The only sanctioned way to point an
    /// already-bound reference at a different target.
    pub fn rebind(&self, owner: &RecordId, literal: &str, target: &RecordId) -> SyncResult<()> {
        match self.refs.rebind(owner, literal, target) {
            Ok(()) => Ok(()),
            Err(StorageError::NotFound(msg)) => Err(SyncError::NotFound(msg)),
            Err(e) => Err(e.into()),
        }
    }

    fn bind_checked(&self, owner: &RecordId, literal: &str, target: &RecordId) -> SyncResult<()> {
        match self.refs.bind(owner, literal, target) {
            Ok(()) => Ok(()),
            // A bound row changing targets under us is a contract violation,
            // not a storage fault.
            Err(StorageError::InvalidData(msg)) => Err(SyncError::Consistency(msg)),
            Err(e) => Err(e.into()),
        }
    }
}
