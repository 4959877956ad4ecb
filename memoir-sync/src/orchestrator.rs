//! Reconciliation passes.
//!
//! One pass drives every incoming file-derived record through the same
//! state machine: hash, classify against the baseline, consult tombstones,
//! apply with last-writer-wins, re-baseline. `Unchanged` short-circuits
//! without touching the store; only the `Conflict` branch additionally
//! flags the row for review. There is no retry loop inside a pass;
//! retries happen via the next externally-triggered pass.

use crate::detector::{ConflictDetector, SyncDecision};
use crate::error::{SyncError, SyncResult};
use crate::hasher::content_hash;
use crate::resolver::{DeferredReferenceResolver, ReferenceResolver, ResolutionReport};
use chrono::{DateTime, Duration, Utc};
use memoir_store::{StorageError, Store, SyncSource, SyncState};
use memoir_types::{Association, MachineId, Record, RecordId, RecordKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Configuration for reconciliation passes.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Identifier of this writer process, stamped on every baseline.
    /// Passed in explicitly; the engine never reads ambient machine state.
    pub machine_id: MachineId,
    /// Tombstones older than this are eligible for reaping.
    pub tombstone_retention_days: i64,
    /// When set, the first per-record failure aborts the pass instead of
    /// being reported and skipped.
    pub strict: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            machine_id: MachineId::generate(),
            tombstone_retention_days: 30,
            strict: false,
        }
    }
}

/// A flagged divergence, surfaced in the pass report and the review queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub kind: RecordKind,
    pub id: RecordId,
    pub baseline_hash: String,
    pub incoming_hash: String,
    pub live_hash: String,
}

/// A per-record failure that did not abort the pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub kind: RecordKind,
    pub id: RecordId,
    pub error: String,
}

/// Outcome counts of one reconciliation pass. Conflicts and failures are
/// enumerated, never silent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PassReport {
    /// Records applied cleanly (first sync or clean update).
    pub updated: usize,
    /// Records identical to their baseline; zero writes.
    pub unchanged: usize,
    /// Records suppressed whole by an unexpired record tombstone.
    pub suppressed: usize,
    /// Associations filtered out by unexpired association tombstones.
    pub suppressed_associations: usize,
    /// Records applied with last-writer-wins after divergence.
    pub conflicts: Vec<ConflictReport>,
    pub failures: Vec<RecordFailure>,
}

/// Drives reconciliation between the flat files and the relational store.
pub struct ReconciliationOrchestrator {
    store: Store,
    config: ReconcileConfig,
}

impl ReconciliationOrchestrator {
    pub fn new(store: Store, config: ReconcileConfig) -> Self {
        Self { store, config }
    }

    /// Runs one synchronization pass over a batch of file-derived records.
    ///
    /// Per-record failures are reported in the result and skipped (strict
    /// mode aborts instead); storage failures abort the pass, retaining the
    /// progress of already-committed records.
    pub fn run_pass(&self, batch: &[Record]) -> SyncResult<PassReport> {
        let mut report = PassReport::default();

        for record in batch {
            match self.reconcile_record(record, &mut report) {
                Ok(()) => {}
                Err(e @ SyncError::Storage(_)) => return Err(e),
                Err(e) if self.config.strict => return Err(e),
                Err(e) => {
                    warn!("skipping {} {}: {e}", record.kind(), record.id());
                    report.failures.push(RecordFailure {
                        kind: record.kind(),
                        id: record.id(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "reconciliation pass: {} updated, {} unchanged, {} suppressed, {} conflicts, {} failures",
            report.updated,
            report.unchanged,
            report.suppressed,
            report.conflicts.len(),
            report.failures.len()
        );
        Ok(report)
    }

    fn reconcile_record(&self, record: &Record, report: &mut PassReport) -> SyncResult<()> {
        validate(record)?;
        let kind = record.kind();
        let id = record.id();

        // A purged record stays purged until its tombstone is reaped.
        if self.store.tombstones().is_tombstoned(None, kind, &id)? {
            debug!("suppressing {kind} {id}: record is tombstoned");
            report.suppressed += 1;
            return Ok(());
        }

        let incoming = content_hash(&record.synchronizable_fields());
        let state = self.store.sync_states().get(kind, &id)?;
        let live = self
            .store
            .records()
            .get(kind, &id)?
            .map(|r| content_hash(&r.synchronizable_fields()));

        let decision = ConflictDetector::classify(&incoming, state.as_ref(), live.as_ref());

        let conflicted = match &decision {
            SyncDecision::Unchanged => {
                debug!("{kind} {id} unchanged since baseline");
                report.unchanged += 1;
                return Ok(());
            }
            SyncDecision::FirstSync => {
                debug!("{kind} {id}: establishing baseline");
                false
            }
            SyncDecision::CleanUpdate => {
                debug!("{kind} {id}: clean update");
                false
            }
            SyncDecision::Conflict {
                baseline,
                incoming,
                live,
            } => {
                warn!(
                    "conflict on {kind} {id}: baseline {baseline}, incoming {incoming}, \
                     store {live}; file version wins"
                );
                report.conflicts.push(ConflictReport {
                    kind,
                    id: id.clone(),
                    baseline_hash: baseline.to_string(),
                    incoming_hash: incoming.to_string(),
                    live_hash: live.to_string(),
                });
                true
            }
        };

        // Filter associations the human deliberately removed. The baseline
        // is taken over the record as stored, so a still-tombstoned record
        // keeps being re-filtered each pass and recreates naturally once
        // the tombstone is reaped.
        let tombstoned: HashSet<(RecordKind, String)> = self
            .store
            .tombstones()
            .tombstoned_for_owner(&id)?
            .into_iter()
            .map(|(k, i)| (k, i.as_str().to_string()))
            .collect();

        let mut applied = record.clone();
        if !tombstoned.is_empty() {
            let before = applied.associations().len();
            applied
                .retain_associations(|a| !tombstoned.contains(&(a.kind, a.id.as_str().to_string())));
            let filtered = before - applied.associations().len();
            if filtered > 0 {
                debug!("{kind} {id}: suppressed {filtered} tombstoned association(s)");
                report.suppressed_associations += filtered;
            }
        }

        let applied_hash = content_hash(&applied.synchronizable_fields());
        let new_state = SyncState {
            entity_type: kind,
            entity_id: id.clone(),
            last_synced_at: Utc::now(),
            sync_source: SyncSource::File,
            sync_hash: applied_hash.as_str().to_string(),
            conflict_detected: conflicted,
            // A fresh conflict always re-enters the review queue.
            conflict_resolved: false,
            machine_id: self.config.machine_id.clone(),
        };

        // Pass 1 of deferred resolution rides the same transaction: the
        // record, its baseline, and its reference literals commit together.
        self.store.apply_reconciled(&applied, &new_state)?;

        if !conflicted {
            report.updated += 1;
        }
        Ok(())
    }

    /// Runs pass 2 of deferred-reference resolution with the given rule.
    pub fn resolve_references(
        &self,
        rule: &dyn ReferenceResolver,
    ) -> SyncResult<ResolutionReport> {
        DeferredReferenceResolver::new(self.store.deferred()).resolve_pending(rule)
    }

    /// Store-side human deletion of one association: rewrites the live
    /// record without it, drops the link, records the tombstone, and
    /// re-baselines with `generated-view` as the source, all atomically.
    pub fn remove_association(
        &self,
        owner_kind: RecordKind,
        owner_id: &RecordId,
        target: &Association,
    ) -> SyncResult<()> {
        let mut record = self
            .store
            .records()
            .get(owner_kind, owner_id)?
            .ok_or_else(|| SyncError::NotFound(format!("{owner_kind} {owner_id}")))?;

        record.retain_associations(|a| a != target);

        let prior = self.store.sync_states().get(owner_kind, owner_id)?;
        let new_hash = content_hash(&record.synchronizable_fields());
        let state = SyncState {
            entity_type: owner_kind,
            entity_id: owner_id.clone(),
            last_synced_at: Utc::now(),
            sync_source: SyncSource::GeneratedView,
            sync_hash: new_hash.as_str().to_string(),
            conflict_detected: prior.as_ref().is_some_and(|s| s.conflict_detected),
            conflict_resolved: prior.as_ref().is_some_and(|s| s.conflict_resolved),
            machine_id: self.config.machine_id.clone(),
        };

        self.store.apply_removal(&record, target, &state)?;
        debug!(
            "removed association {} {} from {owner_kind} {owner_id}",
            target.kind, target.id
        );
        Ok(())
    }

    /// Permanently purges a record, leaving a whole-record tombstone so a
    /// stale file cannot resurrect it before the tombstone expires.
    pub fn purge_record(&self, kind: RecordKind, id: &RecordId) -> SyncResult<()> {
        if !self.store.records().exists(kind, id)? {
            return Err(SyncError::NotFound(format!("{kind} {id}")));
        }
        self.store.purge_record(kind, id)?;
        info!("purged {kind} {id}");
        Ok(())
    }

    /// Re-baselines a record after an export pass wrote it to the flat
    /// files: from here on, the file and the store agree by construction.
    pub fn record_export_baseline(&self, record: &Record) -> SyncResult<()> {
        let prior = self
            .store
            .sync_states()
            .get(record.kind(), &record.id())?;
        let state = SyncState {
            entity_type: record.kind(),
            entity_id: record.id(),
            last_synced_at: Utc::now(),
            sync_source: SyncSource::GeneratedView,
            sync_hash: content_hash(&record.synchronizable_fields())
                .as_str()
                .to_string(),
            conflict_detected: prior.as_ref().is_some_and(|s| s.conflict_detected),
            conflict_resolved: prior.as_ref().is_some_and(|s| s.conflict_resolved),
            machine_id: self.config.machine_id.clone(),
        };
        self.store.sync_states().upsert(&state)?;
        Ok(())
    }

    /// Returns the conflict review queue (or the acknowledged history).
    pub fn list_conflicts(&self, resolved: bool) -> SyncResult<Vec<SyncState>> {
        Ok(self.store.sync_states().list_conflicts(resolved)?)
    }

    /// Acknowledges a flagged conflict.
    pub fn mark_resolved(&self, kind: RecordKind, id: &RecordId) -> SyncResult<()> {
        match self.store.sync_states().mark_resolved(kind, id) {
            Ok(()) => Ok(()),
            Err(StorageError::NotFound(msg)) => Err(SyncError::NotFound(msg)),
            Err(e) => Err(e.into()),
        }
    }

    /// Reaps tombstones older than the cutoff. Returns the count removed.
    pub fn reap_tombstones(&self, older_than: DateTime<Utc>) -> SyncResult<usize> {
        let removed = self.store.tombstones().reap(older_than)?;
        if removed > 0 {
            info!("reaped {removed} tombstone(s) older than {older_than}");
        }
        Ok(removed)
    }

    /// Reaps tombstones past the configured retention window.
    pub fn reap_expired(&self) -> SyncResult<usize> {
        let cutoff = Utc::now() - Duration::days(self.config.tombstone_retention_days);
        self.reap_tombstones(cutoff)
    }

    /// The store this orchestrator reconciles into.
    pub fn store(&self) -> &Store {
        &self.store
    }
}

fn validate(record: &Record) -> SyncResult<()> {
    if record.id().as_str().is_empty() {
        return Err(SyncError::Malformed(format!(
            "{} record with empty identifier",
            record.kind()
        )));
    }
    Ok(())
}
