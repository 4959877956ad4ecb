use chrono::Utc;
use memoir_store::{SyncSource, SyncState};
use memoir_sync::{ConflictDetector, ContentHash, SyncDecision};
use memoir_types::{MachineId, RecordId, RecordKind};
use proptest::prelude::*;

fn baseline(hash: &str) -> SyncState {
    SyncState {
        entity_type: RecordKind::Entry,
        entity_id: RecordId::new("2025-03-01"),
        last_synced_at: Utc::now(),
        sync_source: SyncSource::File,
        sync_hash: hash.to_string(),
        conflict_detected: false,
        conflict_resolved: false,
        machine_id: MachineId::new("m"),
    }
}

fn hash(s: &str) -> ContentHash {
    ContentHash::from_stored(s)
}

#[test]
fn no_stored_state_is_first_sync() {
    let decision = ConflictDetector::classify(&hash("h0"), None, None);
    assert_eq!(decision, SyncDecision::FirstSync);
}

#[test]
fn matching_baseline_is_unchanged() {
    let state = baseline("h0");
    let decision = ConflictDetector::classify(&hash("h0"), Some(&state), Some(&hash("h0")));
    assert_eq!(decision, SyncDecision::Unchanged);
}

#[test]
fn unchanged_wins_even_when_store_moved() {
    // Incoming equals baseline: the file did not move, nothing to apply.
    let state = baseline("h0");
    let decision = ConflictDetector::classify(&hash("h0"), Some(&state), Some(&hash("h1")));
    assert_eq!(decision, SyncDecision::Unchanged);
}

#[test]
fn store_at_baseline_is_clean_update() {
    let state = baseline("h0");
    let decision = ConflictDetector::classify(&hash("h2"), Some(&state), Some(&hash("h0")));
    assert_eq!(decision, SyncDecision::CleanUpdate);
}

#[test]
fn missing_live_record_applies_cleanly() {
    let state = baseline("h0");
    let decision = ConflictDetector::classify(&hash("h2"), Some(&state), None);
    assert_eq!(decision, SyncDecision::CleanUpdate);
}

#[test]
fn both_sides_moved_is_conflict() {
    let state = baseline("h0");
    let decision = ConflictDetector::classify(&hash("h2"), Some(&state), Some(&hash("h1")));
    match decision {
        SyncDecision::Conflict {
            baseline,
            incoming,
            live,
        } => {
            assert_eq!(baseline.as_str(), "h0");
            assert_eq!(incoming.as_str(), "h2");
            assert_eq!(live.as_str(), "h1");
        }
        other => panic!("expected conflict, got {other:?}"),
    }
}

proptest! {
    // For any two digests h1 != h2 != h_baseline, incoming h1 after the
    // store independently advanced to h2 always flags a conflict.
    #[test]
    fn conflict_symmetry(
        hb in "[a-f0-9]{8}",
        h1 in "[a-f0-9]{8}",
        h2 in "[a-f0-9]{8}",
    ) {
        prop_assume!(h1 != hb && h2 != hb && h1 != h2);
        let state = baseline(&hb);

        let forward = ConflictDetector::classify(&hash(&h1), Some(&state), Some(&hash(&h2)));
        let reverse = ConflictDetector::classify(&hash(&h2), Some(&state), Some(&hash(&h1)));
        let forward_conflicts = matches!(forward, SyncDecision::Conflict { .. });
        let reverse_conflicts = matches!(reverse, SyncDecision::Conflict { .. });
        prop_assert!(forward_conflicts);
        prop_assert!(reverse_conflicts);
    }
}
