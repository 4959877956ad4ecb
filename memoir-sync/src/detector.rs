//! Conflict classification.
//!
//! Given the digest of an incoming file-derived record, the stored baseline,
//! and the store's own live digest, decide how the record should be applied.
//! Detection, not merging: a conflict never blocks the pass; the incoming
//! version wins and the row is flagged for human review.

use crate::hasher::ContentHash;
use memoir_store::SyncState;

/// The outcome of comparing an incoming record against the baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncDecision {
    /// No baseline exists; establish one.
    FirstSync,
    /// Incoming digest equals the baseline: skip the write entirely.
    Unchanged,
    /// The store did not move since the baseline; apply cleanly.
    CleanUpdate,
    /// Both sides moved independently since the baseline. The incoming
    /// version wins; the divergence is flagged.
    Conflict {
        baseline: ContentHash,
        incoming: ContentHash,
        live: ContentHash,
    },
}

/// Stateless classifier implementing the four-way decision.
pub struct ConflictDetector;

impl ConflictDetector {
    /// Classifies an incoming record.
    ///
    /// `live` is the digest recomputed from the store's current data, absent
    /// when the record does not exist in the store. A missing live record
    /// with an existing baseline is treated as an unmodified store: the file
    /// recreates it cleanly (whole-record deletions go through tombstones,
    /// which are consulted before classification ever runs).
    #[must_use]
    pub fn classify(
        incoming: &ContentHash,
        state: Option<&SyncState>,
        live: Option<&ContentHash>,
    ) -> SyncDecision {
        let Some(state) = state else {
            return SyncDecision::FirstSync;
        };

        if incoming.as_str() == state.sync_hash {
            return SyncDecision::Unchanged;
        }

        match live {
            Some(live) if live.as_str() != state.sync_hash => SyncDecision::Conflict {
                baseline: ContentHash::from_stored(state.sync_hash.clone()),
                incoming: incoming.clone(),
                live: live.clone(),
            },
            _ => SyncDecision::CleanUpdate,
        }
    }
}
