use std::sync::Arc;

use elava::claims::ClaimCoordinator;
use elava::error::EngineError;
use elava::store::MvccStore;
use tempfile::tempdir;
use time::Duration;

#[test]
fn second_instance_cannot_claim_an_overlapping_id() {
    let dir = tempdir().unwrap();
    let store = Arc::new(MvccStore::open(dir.path()).unwrap());

    let instance_a = ClaimCoordinator::new(store.clone(), "instance-a");
    let instance_b = ClaimCoordinator::new(store.clone(), "instance-b");

    instance_a
        .claim_resources(&["i-1".to_string(), "i-2".to_string()], Duration::minutes(1))
        .unwrap();

    let result = instance_b.claim_resources(
        &["i-2".to_string(), "i-3".to_string()],
        Duration::minutes(1),
    );
    match result {
        Err(EngineError::Conflict { held_by }) => assert_eq!(held_by, "instance-a"),
        other => panic!("expected Conflict, got {other:?}"),
    }

    assert!(instance_b.is_resource_claimed("i-2"));
    assert!(!instance_a.is_resource_claimed("i-2"));
}

#[test]
fn conflicting_claim_does_not_partially_apply() {
    let dir = tempdir().unwrap();
    let store = Arc::new(MvccStore::open(dir.path()).unwrap());

    let instance_a = ClaimCoordinator::new(store.clone(), "instance-a");
    let instance_b = ClaimCoordinator::new(store.clone(), "instance-b");

    instance_a
        .claim_resources(&["i-2".to_string()], Duration::minutes(1))
        .unwrap();

    let _ = instance_b.claim_resources(
        &["i-3".to_string(), "i-2".to_string()],
        Duration::minutes(1),
    );

    assert!(!instance_b.is_resource_claimed("i-3"));
}

#[test]
fn released_claim_can_be_reclaimed_by_another_instance() {
    let dir = tempdir().unwrap();
    let store = Arc::new(MvccStore::open(dir.path()).unwrap());

    let instance_a = ClaimCoordinator::new(store.clone(), "instance-a");
    let instance_b = ClaimCoordinator::new(store.clone(), "instance-b");

    instance_a
        .claim_resources(&["i-1".to_string()], Duration::minutes(1))
        .unwrap();
    instance_a.release_resources(&["i-1".to_string()]).unwrap();

    instance_b
        .claim_resources(&["i-1".to_string()], Duration::minutes(1))
        .unwrap();
    assert!(!instance_b.is_resource_claimed("i-1"));
}

#[test]
fn expired_claim_allows_a_different_instance_to_claim() {
    let dir = tempdir().unwrap();
    let store = Arc::new(MvccStore::open(dir.path()).unwrap());

    let instance_a = ClaimCoordinator::new(store.clone(), "instance-a");
    let instance_b = ClaimCoordinator::new(store.clone(), "instance-b");

    instance_a
        .claim_resources(&["i-1".to_string()], Duration::seconds(-1))
        .unwrap();

    instance_b
        .claim_resources(&["i-1".to_string()], Duration::minutes(1))
        .unwrap();
}

#[test]
fn cleanup_expired_claims_removes_only_lapsed_entries() {
    let dir = tempdir().unwrap();
    let store = Arc::new(MvccStore::open(dir.path()).unwrap());

    let instance_a = ClaimCoordinator::new(store.clone(), "instance-a");
    instance_a
        .claim_resources(&["i-expired".to_string()], Duration::seconds(-1))
        .unwrap();
    instance_a
        .claim_resources(&["i-live".to_string()], Duration::minutes(5))
        .unwrap();

    let removed = instance_a.cleanup_expired_claims().unwrap();
    assert_eq!(removed, 1);

    let instance_b = ClaimCoordinator::new(store.clone(), "instance-b");
    instance_b
        .claim_resources(&["i-expired".to_string()], Duration::minutes(1))
        .unwrap();
    assert!(instance_b
        .claim_resources(&["i-live".to_string()], Duration::minutes(1))
        .is_err());
}
