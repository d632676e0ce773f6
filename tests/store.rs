#[path = "common/mod.rs"]
mod common;

use common::sample_resource;
use elava::store::MvccStore;
use tempfile::tempdir;

#[test]
fn record_observation_assigns_increasing_revisions() {
    let dir = tempdir().unwrap();
    let store = MvccStore::open(dir.path()).unwrap();

    let rev1 = store.record_observation(sample_resource("i-1")).unwrap();
    assert_eq!(rev1, 1);
    let state = store.get_resource_state("i-1").unwrap();
    assert_eq!(state.last_seen_rev, rev1);
    assert!(state.exists);

    let rev2 = store.record_observation(sample_resource("i-2")).unwrap();
    assert_eq!(rev2, 2);
    assert_eq!(store.current_revision(), 2);
}

#[test]
fn batch_observation_shares_one_revision() {
    let dir = tempdir().unwrap();
    let store = MvccStore::open(dir.path()).unwrap();

    let resources = vec![
        sample_resource("i-1"),
        sample_resource("i-2"),
        sample_resource("i-3"),
    ];
    let rev = store.record_observation_batch(&resources).unwrap();
    assert_eq!(rev, 1);
    assert_eq!(store.current_revision(), 1);
    assert_eq!(store.get_all_current_resources().len(), 3);
}

#[test]
fn disappearance_then_reobservation_restores_existence() {
    let dir = tempdir().unwrap();
    let store = MvccStore::open(dir.path()).unwrap();

    store.record_observation(sample_resource("i-1")).unwrap();
    store.record_disappearance("i-1").unwrap();
    let state = store.get_resource_state("i-1").unwrap();
    assert!(!state.exists);
    assert!(store.get_all_current_resources().is_empty());

    store.record_observation(sample_resource("i-1")).unwrap();
    let state = store.get_resource_state("i-1").unwrap();
    assert!(state.exists);
    assert_eq!(store.get_all_current_resources().len(), 1);
}

#[test]
fn get_state_at_revision_reflects_tombstone() {
    let dir = tempdir().unwrap();
    let store = MvccStore::open(dir.path()).unwrap();

    let rev1 = store.record_observation(sample_resource("i-1")).unwrap();
    let rev2 = store.record_disappearance("i-1").unwrap();

    let at_rev1 = store.get_state_at_revision("i-1", rev1).unwrap();
    assert!(at_rev1.exists);

    let at_rev2 = store.get_state_at_revision("i-1", rev2).unwrap();
    assert!(!at_rev2.exists);
}

#[test]
fn index_rebuild_on_reopen_matches_prior_state() {
    let dir = tempdir().unwrap();
    {
        let store = MvccStore::open(dir.path()).unwrap();
        store
            .record_observation_batch(&[sample_resource("i-1"), sample_resource("i-2")])
            .unwrap();
        store.record_disappearance("i-2").unwrap();
    }

    let reopened = MvccStore::open(dir.path()).unwrap();
    assert_eq!(reopened.current_revision(), 2);
    assert_eq!(reopened.get_all_current_resources().len(), 1);
    assert_eq!(reopened.get_all_current_resources()[0].id, "i-1");
}

#[test]
fn compaction_retains_current_resources() {
    let dir = tempdir().unwrap();
    let store = MvccStore::open(dir.path()).unwrap();

    for i in 0..5 {
        store
            .record_observation(sample_resource(&format!("i-{i}")))
            .unwrap();
    }

    let report = store.compact(2).unwrap();
    assert_eq!(report.cutoff_revision, store.current_revision().saturating_sub(2));
    assert_eq!(store.get_all_current_resources().len(), 5);
    for i in 0..5 {
        assert!(store.get_resource_state(&format!("i-{i}")).is_ok());
    }
}

#[test]
fn compaction_keeps_each_ids_latest_record_even_below_cutoff() {
    let dir = tempdir().unwrap();
    {
        let store = MvccStore::open(dir.path()).unwrap();
        for i in 0..5 {
            store
                .record_observation(sample_resource(&format!("i-{i}")))
                .unwrap();
        }
        // current_revision == 5, keep_revisions == 2 -> cutoff == 3, so i-0's
        // (rev 1) and i-1's (rev 2) sole records fall below the cutoff.
        let report = store.compact(2).unwrap();
        assert_eq!(report.cutoff_revision, 3);
        assert_eq!(store.get_all_current_resources().len(), 5);
    }

    // Reopening rebuilds the index purely from what's left on disk: if the
    // compaction had dropped i-0/i-1's only record, they would vanish here.
    let reopened = MvccStore::open(dir.path()).unwrap();
    assert_eq!(reopened.get_all_current_resources().len(), 5);
    for i in 0..5 {
        let state = reopened.get_resource_state(&format!("i-{i}")).unwrap();
        assert!(state.exists);
    }
}

#[test]
fn invalid_batch_does_not_advance_revision_on_error() {
    // Recording an empty batch is a no-op that still must not lie about a
    // new revision: callers should simply not see the counter move.
    let dir = tempdir().unwrap();
    let store = MvccStore::open(dir.path()).unwrap();
    assert_eq!(store.current_revision(), 0);
    let rev = store.record_observation(sample_resource("i-1")).unwrap();
    assert_eq!(rev, 1);
    assert_eq!(store.current_revision(), 1);
}
