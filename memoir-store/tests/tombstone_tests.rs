use chrono::{Duration, Utc};
use memoir_store::Store;
use memoir_types::{RecordId, RecordKind};
use pretty_assertions::assert_eq;

#[test]
fn record_then_is_tombstoned() {
    let store = Store::open_in_memory().unwrap();
    let owner = RecordId::new("2025-03-01");
    let target = RecordId::new("harbor");

    assert!(!store
        .tombstones()
        .is_tombstoned(Some(&owner), RecordKind::Location, &target)
        .unwrap());

    store
        .tombstones()
        .record(Some(&owner), RecordKind::Location, &target)
        .unwrap();

    assert!(store
        .tombstones()
        .is_tombstoned(Some(&owner), RecordKind::Location, &target)
        .unwrap());
}

#[test]
fn tuple_match_is_exact() {
    let store = Store::open_in_memory().unwrap();
    let owner = RecordId::new("2025-03-01");
    let target = RecordId::new("harbor");
    store
        .tombstones()
        .record(Some(&owner), RecordKind::Location, &target)
        .unwrap();

    // Different owner, kind, or target does not match
    assert!(!store
        .tombstones()
        .is_tombstoned(Some(&RecordId::new("2025-03-02")), RecordKind::Location, &target)
        .unwrap());
    assert!(!store
        .tombstones()
        .is_tombstoned(Some(&owner), RecordKind::Person, &target)
        .unwrap());
    assert!(!store
        .tombstones()
        .is_tombstoned(None, RecordKind::Location, &target)
        .unwrap());
}

#[test]
fn whole_record_tombstones_are_distinct_rows() {
    let store = Store::open_in_memory().unwrap();
    let id = RecordId::new("ada");
    store
        .tombstones()
        .record(None, RecordKind::Person, &id)
        .unwrap();
    store
        .tombstones()
        .record(None, RecordKind::Person, &id)
        .unwrap();

    let stats = store.tombstones().stats().unwrap();
    assert_eq!(stats.by_type.get("Person"), Some(&1));
}

#[test]
fn re_recording_keeps_earliest_timestamp() {
    let store = Store::open_in_memory().unwrap();
    let owner = RecordId::new("2025-03-01");
    let target = RecordId::new("harbor");
    let old = Utc::now() - Duration::days(40);

    store
        .tombstones()
        .record_at(Some(&owner), RecordKind::Location, &target, old)
        .unwrap();
    store
        .tombstones()
        .record(Some(&owner), RecordKind::Location, &target)
        .unwrap();

    // The 40-day-old timestamp survived, so a 30-day reap removes it
    let removed = store
        .tombstones()
        .reap(Utc::now() - Duration::days(30))
        .unwrap();
    assert_eq!(removed, 1);
}

#[test]
fn reap_removes_only_older_rows() {
    let store = Store::open_in_memory().unwrap();
    let owner = RecordId::new("2025-03-01");
    let stale = RecordId::new("old");
    let fresh = RecordId::new("new");

    store
        .tombstones()
        .record_at(
            Some(&owner),
            RecordKind::Location,
            &stale,
            Utc::now() - Duration::days(45),
        )
        .unwrap();
    store
        .tombstones()
        .record(Some(&owner), RecordKind::Location, &fresh)
        .unwrap();

    let removed = store
        .tombstones()
        .reap(Utc::now() - Duration::days(30))
        .unwrap();
    assert_eq!(removed, 1);

    assert!(!store
        .tombstones()
        .is_tombstoned(Some(&owner), RecordKind::Location, &stale)
        .unwrap());
    assert!(store
        .tombstones()
        .is_tombstoned(Some(&owner), RecordKind::Location, &fresh)
        .unwrap());
}

#[test]
fn reap_on_empty_table_returns_zero() {
    let store = Store::open_in_memory().unwrap();
    assert_eq!(store.tombstones().reap(Utc::now()).unwrap(), 0);
}

#[test]
fn tombstoned_for_owner_lists_targets() {
    let store = Store::open_in_memory().unwrap();
    let owner = RecordId::new("2025-03-01");
    store
        .tombstones()
        .record(Some(&owner), RecordKind::Location, &RecordId::new("harbor"))
        .unwrap();
    store
        .tombstones()
        .record(Some(&owner), RecordKind::Person, &RecordId::new("bob"))
        .unwrap();
    store
        .tombstones()
        .record(
            Some(&RecordId::new("2025-03-02")),
            RecordKind::Person,
            &RecordId::new("eve"),
        )
        .unwrap();

    let mut targets = store.tombstones().tombstoned_for_owner(&owner).unwrap();
    targets.sort();
    assert_eq!(
        targets,
        vec![
            (RecordKind::Person, RecordId::new("bob")),
            (RecordKind::Location, RecordId::new("harbor")),
        ]
    );
}

#[test]
fn all_lists_rows_oldest_first() {
    let store = Store::open_in_memory().unwrap();
    let owner = RecordId::new("2025-03-01");
    store
        .tombstones()
        .record(Some(&owner), RecordKind::Location, &RecordId::new("harbor"))
        .unwrap();
    store
        .tombstones()
        .record_at(
            None,
            RecordKind::Person,
            &RecordId::new("bob"),
            Utc::now() - Duration::days(3),
        )
        .unwrap();

    let rows = store.tombstones().all().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].entity_id, RecordId::new("bob"));
    assert_eq!(rows[0].owning_entity_id, None);
    assert_eq!(rows[1].owning_entity_id, Some(owner));
    assert_eq!(rows[1].entity_type, RecordKind::Location);
}

#[test]
fn stats_buckets_by_age_and_type() {
    let store = Store::open_in_memory().unwrap();
    let owner = RecordId::new("2025-03-01");
    let now = Utc::now();

    store
        .tombstones()
        .record_at(Some(&owner), RecordKind::Location, &RecordId::new("a"), now)
        .unwrap();
    store
        .tombstones()
        .record_at(
            Some(&owner),
            RecordKind::Location,
            &RecordId::new("b"),
            now - Duration::days(10),
        )
        .unwrap();
    store
        .tombstones()
        .record_at(
            Some(&owner),
            RecordKind::Person,
            &RecordId::new("c"),
            now - Duration::days(60),
        )
        .unwrap();

    let stats = store.tombstones().stats().unwrap();
    assert_eq!(stats.by_type.get("Location"), Some(&2));
    assert_eq!(stats.by_type.get("Person"), Some(&1));
    assert_eq!(stats.fresh, 1);
    assert_eq!(stats.aging, 1);
    assert_eq!(stats.expired, 1);
}
