#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use common::sample_resource;
use elava::analyzer::AnalyzerLog;
use elava::detector::ChangeDetector;
use elava::model::ChangeType;
use elava::store::MvccStore;
use tempfile::tempdir;

fn build(dir: &std::path::Path) -> (Arc<MvccStore>, ChangeDetector) {
    let store = Arc::new(MvccStore::open(dir).unwrap());
    let analyzer = Arc::new(AnalyzerLog::new(store.clone()));
    let detector = ChangeDetector::new(store.clone(), analyzer);
    (store, detector)
}

#[test]
fn first_scan_emits_one_created_event_per_resource() {
    let dir = tempdir().unwrap();
    let (_store, detector) = build(dir.path());

    let resources: Vec<_> = (0..100).map(|i| sample_resource(&format!("i-{i}"))).collect();
    let events = detector.detect_changes(&resources).unwrap();

    assert_eq!(events.len(), 100);
    assert!(events.iter().all(|e| e.change_type == ChangeType::Created));
}

#[test]
fn appeared_resource_is_detected_after_baseline() {
    let dir = tempdir().unwrap();
    let (store, detector) = build(dir.path());

    let mut resources: Vec<_> = (0..100).map(|i| sample_resource(&format!("i-{i}"))).collect();
    detector.detect_changes(&resources).unwrap();
    store.record_observation_batch(&resources).unwrap();

    resources.push(sample_resource("i-new-appeared"));
    let events = detector.detect_changes(&resources).unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].resource_id, "i-new-appeared");
    assert_eq!(events[0].change_type, ChangeType::Created);
}

#[test]
fn disappeared_resource_is_detected() {
    let dir = tempdir().unwrap();
    let (store, detector) = build(dir.path());

    let resources: Vec<_> = (0..100).map(|i| sample_resource(&format!("i-{i}"))).collect();
    detector.detect_changes(&resources).unwrap();
    store.record_observation_batch(&resources).unwrap();

    let remaining = &resources[0..99];
    let events = detector.detect_changes(remaining).unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].change_type, ChangeType::Disappeared);
    assert_eq!(events[0].resource_id, resources[99].id);
}

#[test]
fn detector_is_idempotent_on_unchanged_snapshot() {
    let dir = tempdir().unwrap();
    let (store, detector) = build(dir.path());

    let resources: Vec<_> = (0..10).map(|i| sample_resource(&format!("i-{i}"))).collect();
    detector.detect_changes(&resources).unwrap();
    store.record_observation_batch(&resources).unwrap();

    let events_again = detector.detect_changes(&resources).unwrap();
    assert!(events_again.is_empty());
}

#[test]
fn modified_resource_is_detected_once_recorded() {
    let dir = tempdir().unwrap();
    let (store, detector) = build(dir.path());

    let resource = sample_resource("i-1");
    detector.detect_changes(&[resource.clone()]).unwrap();
    store.record_observation(resource.clone()).unwrap();

    let mut changed = resource;
    changed.status = "stopped".to_string();
    let events = detector.detect_changes(&[changed]).unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].change_type, ChangeType::Modified);
}
