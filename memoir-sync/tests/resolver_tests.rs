use chrono::NaiveDate;
use memoir_store::Store;
use memoir_sync::{
    DeferredReferenceResolver, EntryDateResolver, ReferenceResolver, SyncError, SyncResult,
};
use memoir_types::{EntryRecord, Record, RecordId};
use pretty_assertions::assert_eq;

fn entry(date: &str) -> Record {
    Record::Entry(EntryRecord {
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        title: None,
        body: "…".to_string(),
        tags: vec![],
        people: vec![],
        locations: vec![],
    })
}

fn register(store: &Store, owner: &str, literals: &[&str]) {
    store
        .deferred()
        .sync_references(
            &RecordId::new(owner),
            &literals.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        )
        .unwrap();
}

#[test]
fn unmatched_reference_stays_unresolved() {
    let store = Store::open_in_memory().unwrap();
    register(&store, "harbor-walks", &["2025-03-01"]);

    let resolver = DeferredReferenceResolver::new(store.deferred());
    let rule = EntryDateResolver::new(store.records());
    let report = resolver.resolve_pending(&rule).unwrap();

    assert_eq!(report.resolved, 0);
    assert_eq!(report.unresolved, 1);
    assert_eq!(store.deferred().unresolved().unwrap().len(), 1);
}

#[test]
fn reference_binds_once_target_exists() {
    let store = Store::open_in_memory().unwrap();
    register(&store, "harbor-walks", &["2025-03-01"]);
    store.records().put(&entry("2025-03-01")).unwrap();

    let resolver = DeferredReferenceResolver::new(store.deferred());
    let rule = EntryDateResolver::new(store.records());
    let report = resolver.resolve_pending(&rule).unwrap();

    assert_eq!(report.resolved, 1);
    assert_eq!(report.unresolved, 0);

    let refs = store
        .deferred()
        .for_owner(&RecordId::new("harbor-walks"))
        .unwrap();
    assert_eq!(
        refs[0].resolved_target_id,
        Some(RecordId::new("2025-03-01"))
    );
}

#[test]
fn resolution_is_idempotent() {
    let store = Store::open_in_memory().unwrap();
    register(&store, "harbor-walks", &["2025-03-01"]);
    store.records().put(&entry("2025-03-01")).unwrap();

    let resolver = DeferredReferenceResolver::new(store.deferred());
    let rule = EntryDateResolver::new(store.records());
    resolver.resolve_pending(&rule).unwrap();
    let second = resolver.resolve_pending(&rule).unwrap();

    assert_eq!(second.resolved, 0);
    assert_eq!(second.unresolved, 0);
    let refs = store
        .deferred()
        .for_owner(&RecordId::new("harbor-walks"))
        .unwrap();
    assert_eq!(
        refs[0].resolved_target_id,
        Some(RecordId::new("2025-03-01"))
    );
}

#[test]
fn late_target_binds_without_touching_other_bindings() {
    let store = Store::open_in_memory().unwrap();
    register(&store, "harbor-walks", &["2025-03-01", "2025-06-20"]);
    store.records().put(&entry("2025-03-01")).unwrap();

    let resolver = DeferredReferenceResolver::new(store.deferred());
    let rule = EntryDateResolver::new(store.records());
    let first = resolver.resolve_pending(&rule).unwrap();
    assert_eq!((first.resolved, first.unresolved), (1, 1));

    // A later batch adds the missing entry
    store.records().put(&entry("2025-06-20")).unwrap();
    let second = resolver.resolve_pending(&rule).unwrap();
    assert_eq!((second.resolved, second.unresolved), (1, 0));

    let refs = store
        .deferred()
        .for_owner(&RecordId::new("harbor-walks"))
        .unwrap();
    let targets: Vec<_> = refs
        .iter()
        .map(|r| r.resolved_target_id.clone().unwrap().to_string())
        .collect();
    assert_eq!(targets, vec!["2025-03-01", "2025-06-20"]);
}

#[test]
fn rule_returning_new_target_for_bound_row_is_consistency_violation() {
    // A rule whose answer changes between passes must not silently rebind.
    struct FlipFlop {
        answer: RecordId,
    }
    impl ReferenceResolver for FlipFlop {
        fn resolve(&self, _literal: &str) -> SyncResult<Option<RecordId>> {
            Ok(Some(self.answer.clone()))
        }
    }

    let store = Store::open_in_memory().unwrap();
    register(&store, "t", &["x"]);
    store
        .deferred()
        .bind(&RecordId::new("t"), "x", &RecordId::new("a"))
        .unwrap();

    // The bound row is excluded from the walk, so the changed rule is moot…
    let resolver = DeferredReferenceResolver::new(store.deferred());
    let report = resolver
        .resolve_pending(&FlipFlop {
            answer: RecordId::new("b"),
        })
        .unwrap();
    assert_eq!(report.resolved, 0);

    // …and a direct rebind attempt through bind() fails loudly.
    let err = store
        .deferred()
        .bind(&RecordId::new("t"), "x", &RecordId::new("b"))
        .unwrap_err();
    assert!(matches!(err, memoir_store::StorageError::InvalidData(_)));
}

#[test]
fn explicit_rebind_overrides() {
    let store = Store::open_in_memory().unwrap();
    register(&store, "t", &["x"]);
    store
        .deferred()
        .bind(&RecordId::new("t"), "x", &RecordId::new("a"))
        .unwrap();

    let resolver = DeferredReferenceResolver::new(store.deferred());
    resolver
        .rebind(&RecordId::new("t"), "x", &RecordId::new("b"))
        .unwrap();

    let refs = store.deferred().for_owner(&RecordId::new("t")).unwrap();
    assert_eq!(refs[0].resolved_target_id, Some(RecordId::new("b")));
}

#[test]
fn rebind_missing_reference_is_not_found() {
    let store = Store::open_in_memory().unwrap();
    let resolver = DeferredReferenceResolver::new(store.deferred());
    let err = resolver
        .rebind(&RecordId::new("t"), "x", &RecordId::new("b"))
        .unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
}
