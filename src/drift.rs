//! Drift analyzer (L6 in `spec.md` §2/§4.5).
//!
//! Compares resources observed around two points in time and emits
//! [`DriftEvent`]s for the fields the spec assigns a severity to. Windows
//! are widened by one hour on each side of `t1`/`t2` so nearby observations
//! still line up even when scans aren't perfectly periodic — see
//! `DESIGN.md` for why this widening is kept rather than narrowed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::json;
use time::{Duration, OffsetDateTime};

use crate::analyzer::{AnalyzerLog, DriftEvent};
use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::model::{DriftSeverity, Resource};
use crate::query::QueryEngine;

const ALIGNMENT_WINDOW: Duration = Duration::hours(1);
const COST_DRIFT_THRESHOLD: f64 = 0.10;

/// Detects drift between two points in a resource's observed history.
pub struct DriftAnalyzer {
    query: Arc<QueryEngine>,
    analyzer: Arc<AnalyzerLog>,
}

impl DriftAnalyzer {
    /// Builds a drift analyzer over `query`'s scans, persisting detected
    /// events through `analyzer`.
    pub fn new(query: Arc<QueryEngine>, analyzer: Arc<AnalyzerLog>) -> Self {
        Self { query, analyzer }
    }

    /// Compares resources observed near `t1` against those observed near
    /// `t2`, intersected by id, and emits drift events for every pair that
    /// crosses a tracked field.
    pub fn detect_drift(&self, t1: OffsetDateTime, t2: OffsetDateTime) -> Result<Vec<DriftEvent>> {
        let cancel = CancellationToken::none();
        let before_set = self.query.query_by_time_range(
            t1 - ALIGNMENT_WINDOW,
            t1 + ALIGNMENT_WINDOW,
            &cancel,
        )?;
        let after_set = self.query.query_by_time_range(
            t2 - ALIGNMENT_WINDOW,
            t2 + ALIGNMENT_WINDOW,
            &cancel,
        )?;

        let before_by_id: HashMap<String, Resource> =
            before_set.into_iter().map(|r| (r.id.clone(), r)).collect();

        let mut events = Vec::new();
        for after in &after_set {
            if let Some(before) = before_by_id.get(&after.id) {
                events.extend(compare(before, after));
            }
        }

        if !events.is_empty() {
            if let Err(err) = self.analyzer.record_batch(events.clone(), &cancel) {
                tracing::warn!(error = %err, "drift.persist_events_failed");
            }
        }
        Ok(events)
    }

    /// Drift events between consecutive revisions of one resource's
    /// history within `period`. Returns an empty (not error) list when the
    /// resource has no history in the window.
    pub fn get_resource_drift(&self, id: &str, period: Duration) -> Result<Vec<DriftEvent>> {
        let history = self
            .query
            .query_resource_history(id, &CancellationToken::none())?;
        let since = OffsetDateTime::now_utc() - period;
        let windowed: Vec<Resource> = history
            .into_iter()
            .filter(|entry| entry.timestamp >= since)
            .filter_map(|entry| entry.resource)
            .collect();

        let mut events = Vec::new();
        for pair in windowed.windows(2) {
            events.extend(compare(&pair[0], &pair[1]));
        }
        Ok(events)
    }
}

fn status_severity(before: &str, after: &str) -> DriftSeverity {
    match (before, after) {
        ("running", "terminated") | ("available", "failed") | ("healthy", "terminating") => {
            DriftSeverity::Critical
        }
        ("running", "stopping") | ("healthy", "unhealthy") | ("available", "degraded") => {
            DriftSeverity::High
        }
        ("running", "stopped") => DriftSeverity::Medium,
        _ => DriftSeverity::Low,
    }
}

fn event(
    resource_id: &str,
    drift_type: &str,
    field: &str,
    old_value: impl ToString,
    new_value: impl ToString,
    severity: DriftSeverity,
    metadata: Option<BTreeMap<String, serde_json::Value>>,
) -> DriftEvent {
    DriftEvent {
        resource_id: resource_id.to_string(),
        timestamp: OffsetDateTime::now_utc(),
        drift_type: drift_type.to_string(),
        field: field.to_string(),
        old_value: old_value.to_string(),
        new_value: new_value.to_string(),
        severity,
        metadata,
    }
}

fn compare(before: &Resource, after: &Resource) -> Vec<DriftEvent> {
    let mut events = Vec::new();

    if before.status != after.status {
        events.push(event(
            &after.id,
            "status",
            "status",
            &before.status,
            &after.status,
            status_severity(&before.status, &after.status),
            None,
        ));
    }

    if before.tags.owner != after.tags.owner {
        events.push(event(
            &after.id,
            "tag",
            "tags.owner",
            &before.tags.owner,
            &after.tags.owner,
            DriftSeverity::High,
            None,
        ));
    }
    if before.tags.team != after.tags.team {
        events.push(event(
            &after.id,
            "tag",
            "tags.team",
            &before.tags.team,
            &after.tags.team,
            DriftSeverity::Medium,
            None,
        ));
    }
    if before.tags.environment != after.tags.environment {
        events.push(event(
            &after.id,
            "tag",
            "tags.environment",
            &before.tags.environment,
            &after.tags.environment,
            DriftSeverity::High,
            None,
        ));
    }
    if before.tags.managed_by_engine != after.tags.managed_by_engine {
        events.push(event(
            &after.id,
            "tag",
            "tags.managed_by_engine",
            before.tags.managed_by_engine,
            after.tags.managed_by_engine,
            DriftSeverity::Critical,
            None,
        ));
    }

    if before.metadata.instance_type != after.metadata.instance_type {
        events.push(event(
            &after.id,
            "metadata",
            "metadata.instance_type",
            before.metadata.instance_type.clone().unwrap_or_default(),
            after.metadata.instance_type.clone().unwrap_or_default(),
            DriftSeverity::High,
            None,
        ));
    }
    if before.metadata.node_count != after.metadata.node_count {
        events.push(event(
            &after.id,
            "metadata",
            "metadata.node_count",
            before.metadata.node_count.map(|v| v.to_string()).unwrap_or_default(),
            after.metadata.node_count.map(|v| v.to_string()).unwrap_or_default(),
            DriftSeverity::High,
            None,
        ));
    }
    if before.metadata.backup_retention_period != after.metadata.backup_retention_period {
        events.push(event(
            &after.id,
            "metadata",
            "metadata.backup_retention_period",
            before.metadata.backup_retention_period.map(|v| v.to_string()).unwrap_or_default(),
            after.metadata.backup_retention_period.map(|v| v.to_string()).unwrap_or_default(),
            DriftSeverity::High,
            None,
        ));
    }
    if before.metadata.encrypted != after.metadata.encrypted {
        events.push(event(
            &after.id,
            "metadata",
            "metadata.is_encrypted",
            before.metadata.encrypted.map(|v| v.to_string()).unwrap_or_default(),
            after.metadata.encrypted.map(|v| v.to_string()).unwrap_or_default(),
            DriftSeverity::Critical,
            None,
        ));
    }
    if before.metadata.public_ip != after.metadata.public_ip {
        events.push(event(
            &after.id,
            "metadata",
            "metadata.public_ip",
            before.metadata.public_ip.map(|v| v.to_string()).unwrap_or_default(),
            after.metadata.public_ip.map(|v| v.to_string()).unwrap_or_default(),
            DriftSeverity::Critical,
            None,
        ));
    }
    if before.metadata.deletion_protection != after.metadata.deletion_protection {
        events.push(event(
            &after.id,
            "metadata",
            "metadata.deletion_protection",
            before.metadata.deletion_protection.map(|v| v.to_string()).unwrap_or_default(),
            after.metadata.deletion_protection.map(|v| v.to_string()).unwrap_or_default(),
            DriftSeverity::Critical,
            None,
        ));
    }

    if let (Some(prev_cost), Some(curr_cost)) = (
        before.metadata.monthly_cost_estimate,
        after.metadata.monthly_cost_estimate,
    ) {
        let pct = if prev_cost == 0.0 {
            if curr_cost > 0.0 { 1.0 } else { 0.0 }
        } else {
            (curr_cost - prev_cost) / prev_cost
        };
        if pct.abs() > COST_DRIFT_THRESHOLD {
            let mut metadata = BTreeMap::new();
            metadata.insert("reason".to_string(), json!(format!("{:+.1}% change", pct * 100.0)));
            events.push(event(
                &after.id,
                "cost",
                "metadata.monthly_cost_estimate",
                prev_cost,
                curr_cost,
                DriftSeverity::High,
                Some(metadata),
            ));
        }
    }

    events
}
