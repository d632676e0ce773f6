#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use common::sample_resource;
use elava::analyzer::AnalyzerLog;
use elava::drift::DriftAnalyzer;
use elava::model::DriftSeverity;
use elava::query::QueryEngine;
use elava::store::MvccStore;
use tempfile::tempdir;
use time::{Duration, OffsetDateTime};

fn build(dir: &std::path::Path) -> (Arc<MvccStore>, DriftAnalyzer) {
    let store = Arc::new(MvccStore::open(dir).unwrap());
    let analyzer = Arc::new(AnalyzerLog::new(store.clone()));
    let query = Arc::new(QueryEngine::new(store.clone()));
    (store, DriftAnalyzer::new(query, analyzer))
}

#[test]
fn tag_owner_drift_is_high_severity() {
    let dir = tempdir().unwrap();
    let (store, drift) = build(dir.path());

    let mut before = sample_resource("i-drift");
    before.tags.owner = "team-a".to_string();
    store.record_observation(before).unwrap();
    let t1 = OffsetDateTime::now_utc();

    let mut after = sample_resource("i-drift");
    after.tags.owner = "team-b".to_string();
    store.record_observation(after).unwrap();
    let t2 = OffsetDateTime::now_utc();

    let events = drift.detect_drift(t1, t2).unwrap();
    let owner_event = events.iter().find(|e| e.field == "tags.owner").unwrap();
    assert_eq!(owner_event.old_value, "team-a");
    assert_eq!(owner_event.new_value, "team-b");
    assert_eq!(owner_event.severity, DriftSeverity::High);
}

#[test]
fn get_resource_drift_returns_empty_for_resource_with_no_history() {
    let dir = tempdir().unwrap();
    let (_store, drift) = build(dir.path());

    let events = drift.get_resource_drift("i-missing", Duration::hours(1)).unwrap();
    assert!(events.is_empty());
}

#[test]
fn get_resource_drift_detects_critical_status_transition() {
    let dir = tempdir().unwrap();
    let (store, drift) = build(dir.path());

    let mut running = sample_resource("i-1");
    running.status = "running".to_string();
    store.record_observation(running).unwrap();

    let mut terminated = sample_resource("i-1");
    terminated.status = "terminated".to_string();
    store.record_observation(terminated).unwrap();

    let events = drift.get_resource_drift("i-1", Duration::hours(1)).unwrap();
    let status_event = events.iter().find(|e| e.field == "status").unwrap();
    assert_eq!(status_event.severity, DriftSeverity::Critical);
}

#[test]
fn get_resource_drift_flags_cost_increase_over_threshold() {
    let dir = tempdir().unwrap();
    let (store, drift) = build(dir.path());

    let mut before = sample_resource("i-1");
    before.metadata.monthly_cost_estimate = Some(100.0);
    store.record_observation(before).unwrap();

    let mut after = sample_resource("i-1");
    after.metadata.monthly_cost_estimate = Some(150.0);
    store.record_observation(after).unwrap();

    let events = drift.get_resource_drift("i-1", Duration::hours(1)).unwrap();
    let cost_event = events
        .iter()
        .find(|e| e.field == "metadata.monthly_cost_estimate")
        .unwrap();
    assert_eq!(cost_event.severity, DriftSeverity::High);
}

#[test]
fn get_resource_drift_ignores_cost_change_under_threshold() {
    let dir = tempdir().unwrap();
    let (store, drift) = build(dir.path());

    let mut before = sample_resource("i-1");
    before.metadata.monthly_cost_estimate = Some(100.0);
    store.record_observation(before).unwrap();

    let mut after = sample_resource("i-1");
    after.metadata.monthly_cost_estimate = Some(105.0);
    store.record_observation(after).unwrap();

    let events = drift.get_resource_drift("i-1", Duration::hours(1)).unwrap();
    assert!(events.iter().all(|e| e.field != "metadata.monthly_cost_estimate"));
}
