use std::sync::Arc;

use elava::analyzer::{AnalyzerLog, ChangeEvent, DriftEvent, WastePattern};
use elava::cancel::CancellationToken;
use elava::model::{ChangeType, DriftSeverity, WasteType};
use elava::store::MvccStore;
use tempfile::tempdir;
use time::{Duration, OffsetDateTime};

fn open_log(dir: &std::path::Path) -> AnalyzerLog {
    let store = Arc::new(MvccStore::open(dir).unwrap());
    AnalyzerLog::new(store)
}

fn change(resource_id: &str) -> ChangeEvent {
    ChangeEvent {
        revision: 0,
        timestamp: OffsetDateTime::now_utc(),
        resource_id: resource_id.to_string(),
        change_type: ChangeType::Created,
        before: None,
        after: None,
    }
}

#[test]
fn single_change_event_is_queryable_since() {
    let dir = tempdir().unwrap();
    let log = open_log(dir.path());

    let rev = log.record(change("i-1")).unwrap();
    assert_eq!(rev, 1);

    let since = OffsetDateTime::now_utc() - Duration::minutes(1);
    let events: Vec<ChangeEvent> = log.query_since(since, &CancellationToken::none()).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].resource_id, "i-1");
}

#[test]
fn invalid_event_in_batch_rejects_whole_batch() {
    let dir = tempdir().unwrap();
    let log = open_log(dir.path());

    let mut bad = change("i-2");
    bad.resource_id.clear();
    let result = log.record_batch(vec![change("i-1"), bad], &CancellationToken::none());
    assert!(result.is_err());

    let since = OffsetDateTime::now_utc() - Duration::minutes(1);
    let events: Vec<ChangeEvent> = log.query_since(since, &CancellationToken::none()).unwrap();
    assert!(events.is_empty(), "a rejected batch must persist nothing");
}

#[test]
fn drift_event_requires_drift_type_and_field() {
    let dir = tempdir().unwrap();
    let log = open_log(dir.path());

    let bad = DriftEvent {
        resource_id: "i-1".to_string(),
        timestamp: OffsetDateTime::now_utc(),
        drift_type: String::new(),
        field: "status".to_string(),
        old_value: "running".to_string(),
        new_value: "stopped".to_string(),
        severity: DriftSeverity::Low,
        metadata: None,
    };
    assert!(log.record(bad).is_err());
}

#[test]
fn waste_pattern_confidence_must_be_in_unit_range() {
    let dir = tempdir().unwrap();
    let log = open_log(dir.path());

    let bad = WastePattern {
        pattern_type: WasteType::Orphaned,
        resource_ids: vec!["i-1".to_string()],
        reason: "no owner tag".to_string(),
        confidence: 1.5,
        first_seen: OffsetDateTime::now_utc(),
        metadata: None,
    };
    assert!(log.record(bad).is_err());
}

#[test]
fn waste_pattern_requires_nonempty_resource_ids() {
    let dir = tempdir().unwrap();
    let log = open_log(dir.path());

    let bad = WastePattern {
        pattern_type: WasteType::Orphaned,
        resource_ids: vec![],
        reason: "no owner tag".to_string(),
        confidence: 0.8,
        first_seen: OffsetDateTime::now_utc(),
        metadata: None,
    };
    assert!(log.record(bad).is_err());
}

#[test]
fn batch_allocates_sequential_revisions() {
    let dir = tempdir().unwrap();
    let log = open_log(dir.path());

    let revs = log
        .record_batch(vec![change("i-1"), change("i-2"), change("i-3")], &CancellationToken::none())
        .unwrap();
    assert_eq!(revs, vec![1, 2, 3]);
}

#[test]
fn query_since_excludes_events_recorded_before_the_cutoff() {
    let dir = tempdir().unwrap();
    let log = open_log(dir.path());
    log.record(change("i-old")).unwrap();

    let cutoff = OffsetDateTime::now_utc();
    log.record(change("i-new")).unwrap();

    let events: Vec<ChangeEvent> = log.query_since(cutoff, &CancellationToken::none()).unwrap();
    assert!(events.iter().any(|e| e.resource_id == "i-new"));
    assert!(events.iter().all(|e| e.resource_id != "i-old"));
}
