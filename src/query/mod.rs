//! Query engine (L4 in `spec.md` §2/§4.3).
//!
//! Every operation here is a read-only scan over the store's observation
//! log, reconstructing point-in-time or time-ranged views that the
//! in-memory index alone can't answer.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::cancel::CancellationToken;
use crate::change::{materially_changed, only_status_changed, only_tags_changed};
use crate::error::{EngineError, Result};
use crate::model::{ChangeType, ObservationRecord, Resource, Revision};
use crate::store::MvccStore;

/// One entry in a resource's full observation history.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    /// Revision this observation was recorded at.
    pub revision: Revision,
    /// When this observation occurred.
    pub timestamp: OffsetDateTime,
    /// The observed state, or `None` for a tombstone.
    pub resource: Option<Resource>,
    /// How this entry differs from its predecessor.
    pub change_type: ChangeType,
}

/// A reconstructed change, as seen by `QueryChangesSince` rather than the
/// live change detector.
#[derive(Debug, Clone, Serialize)]
pub struct ScannedChange {
    /// Revision the change was observed at.
    pub revision: Revision,
    /// Timestamp of the observation that introduced the change.
    pub timestamp: OffsetDateTime,
    /// The resource that changed.
    pub resource_id: String,
    /// Classification of the change.
    pub change_type: ChangeType,
    /// State before the change, if this resource was seen earlier in the
    /// scan.
    pub before: Option<Resource>,
    /// State after the change.
    pub after: Resource,
}

/// Aggregated metrics for one tag value, per `spec.md` §4.3.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TagMetrics {
    /// Number of resources carrying this tag value.
    pub count: u64,
    /// Sum of `monthly_cost_estimate` across those resources.
    pub total_cost: f64,
    /// `total_cost / count`.
    pub average_cost: f64,
    /// Per-type resource counts within this tag value.
    pub resource_types: BTreeMap<String, u64>,
}

/// Preview of what a compaction with the given `keep_revisions` would
/// discard, without actually rewriting the log. Supplements `spec.md`
/// §4.1 so callers can inspect compaction impact before running it.
#[derive(Debug, Clone, Serialize)]
pub struct CompactionPreview {
    /// Observation records scanned.
    pub scanned: u64,
    /// Observation records that would be dropped.
    pub would_delete: u64,
    /// The revision cutoff that would be used.
    pub cutoff_revision: Revision,
}

/// Read-only scans over the store's observation history.
pub struct QueryEngine {
    store: Arc<MvccStore>,
}

impl QueryEngine {
    /// Wraps `store` for historical queries.
    pub fn new(store: Arc<MvccStore>) -> Self {
        Self { store }
    }

    /// Every distinct resource whose `last_seen_at` falls strictly between
    /// `start` and `end`, returned once each at its earliest qualifying
    /// revision in scan order. Tombstones are skipped.
    pub fn query_by_time_range(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
        cancel: &CancellationToken,
    ) -> Result<Vec<Resource>> {
        cancel.check()?;
        if start >= end {
            return Err(EngineError::InvalidArgument(format!(
                "query_by_time_range: start ({start}) must be before end ({end})"
            )));
        }
        let mut seen = std::collections::HashSet::new();
        let mut results = Vec::new();
        let mut scanned = 0u64;
        self.store.with_write(|handle| {
            handle.replay_observations(|_rev, record| {
                scanned += 1;
                if scanned % 100 == 0 {
                    cancel.check()?;
                }
                if let ObservationRecord::Resource(resource) = record {
                    if resource.last_seen_at > start
                        && resource.last_seen_at < end
                        && seen.insert(resource.id.clone())
                    {
                        results.push(resource);
                    }
                }
                Ok(())
            })
        })?;
        Ok(results)
    }

    /// Scans observations with `revision > since`, comparing each resource
    /// against a map of prior state built up during this scan (not
    /// preloaded), emitting a change whenever something material differs
    /// from the last time this scan saw the resource. Emits nothing when a
    /// resource reappears unchanged.
    pub fn query_changes_since(
        &self,
        since: Revision,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScannedChange>> {
        cancel.check()?;
        let mut prior: HashMap<String, Resource> = HashMap::new();
        let mut changes = Vec::new();
        let mut scanned = 0u64;
        self.store.with_write(|handle| {
            handle.replay_observations(|rev, record| {
                scanned += 1;
                if scanned % 100 == 0 {
                    cancel.check()?;
                }
                if rev <= since {
                    if let ObservationRecord::Resource(resource) = record {
                        prior.insert(resource.id.clone(), resource);
                    }
                    return Ok(());
                }
                if let ObservationRecord::Resource(resource) = record {
                    let before = prior.get(&resource.id).cloned();
                    let change_type = match &before {
                        None => Some(ChangeType::Created),
                        Some(prev) if only_status_changed(prev, &resource) => {
                            Some(ChangeType::StatusChanged)
                        }
                        Some(prev) if only_tags_changed(prev, &resource) => {
                            Some(ChangeType::TagDrift)
                        }
                        Some(prev) if materially_changed(prev, &resource) => {
                            Some(ChangeType::Modified)
                        }
                        Some(_) => None,
                    };
                    if let Some(change_type) = change_type {
                        changes.push(ScannedChange {
                            revision: rev,
                            timestamp: resource.last_seen_at,
                            resource_id: resource.id.clone(),
                            change_type,
                            before,
                            after: resource.clone(),
                        });
                    }
                    prior.insert(resource.id.clone(), resource);
                }
                Ok(())
            })
        })?;
        Ok(changes)
    }

    /// The full revision history of one resource, each entry annotated
    /// with its change type relative to the previous entry.
    pub fn query_resource_history(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<HistoryEntry>> {
        cancel.check()?;
        let mut history = Vec::new();
        let mut prior: Option<Resource> = None;
        let mut scanned = 0u64;
        self.store.with_write(|handle| {
            handle.replay_observations(|rev, record| {
                scanned += 1;
                if scanned % 100 == 0 {
                    cancel.check()?;
                }
                if record.id() != id {
                    return Ok(());
                }
                match &record {
                    ObservationRecord::Resource(resource) => {
                        let change_type = match &prior {
                            None if history.is_empty() => ChangeType::Created,
                            None => ChangeType::Appeared,
                            Some(prev) if only_status_changed(prev, resource) => {
                                ChangeType::StatusChanged
                            }
                            Some(prev) if only_tags_changed(prev, resource) => ChangeType::TagDrift,
                            Some(prev) if materially_changed(prev, resource) => ChangeType::Modified,
                            Some(_) => ChangeType::Modified,
                        };
                        history.push(HistoryEntry {
                            revision: rev,
                            timestamp: resource.last_seen_at,
                            resource: Some(resource.clone()),
                            change_type,
                        });
                        prior = Some(resource.clone());
                    }
                    ObservationRecord::Tombstone { timestamp, .. } => {
                        history.push(HistoryEntry {
                            revision: rev,
                            timestamp: *timestamp,
                            resource: None,
                            change_type: ChangeType::Disappeared,
                        });
                        prior = None;
                    }
                }
                Ok(())
            })
        })?;
        Ok(history)
    }

    /// Sums `monthly_cost_estimate` by tag value for observations newer
    /// than `now - period`, bucketing an empty tag value under
    /// `"untagged"`.
    pub fn aggregate_by_tag(
        &self,
        tag_name: &str,
        period: Duration,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, TagMetrics>> {
        cancel.check()?;
        let cutoff = OffsetDateTime::now_utc() - period;
        let mut buckets: BTreeMap<String, TagMetrics> = BTreeMap::new();
        let mut scanned = 0u64;
        self.store.with_write(|handle| {
            handle.replay_observations(|_rev, record| {
                scanned += 1;
                if scanned % 100 == 0 {
                    cancel.check()?;
                }
                if let ObservationRecord::Resource(resource) = record {
                    if resource.last_seen_at < cutoff {
                        return Ok(());
                    }
                    let value = tag_value(&resource, tag_name);
                    let bucket = buckets.entry(value).or_default();
                    bucket.count += 1;
                    if let Some(cost) = resource.metadata.monthly_cost_estimate {
                        bucket.total_cost += cost;
                    }
                    *bucket
                        .resource_types
                        .entry(resource.resource_type.clone())
                        .or_insert(0) += 1;
                }
                Ok(())
            })
        })?;
        for metrics in buckets.values_mut() {
            if metrics.count > 0 {
                metrics.average_cost = metrics.total_cost / metrics.count as f64;
            }
        }
        Ok(buckets)
    }

    /// Scans observations and reports what a compaction with
    /// `keep_revisions` would discard, without performing the rewrite.
    pub fn compaction_preview(&self, keep_revisions: Revision) -> Result<CompactionPreview> {
        let cutoff = self.store.current_revision().saturating_sub(keep_revisions);
        let mut scanned = 0u64;
        let mut would_delete = 0u64;
        self.store.with_write(|handle| {
            handle.replay_observations(|rev, _record| {
                scanned += 1;
                if rev < cutoff {
                    would_delete += 1;
                }
                Ok(())
            })
        })?;
        Ok(CompactionPreview {
            scanned,
            would_delete,
            cutoff_revision: cutoff,
        })
    }
}

fn tag_value(resource: &Resource, tag_name: &str) -> String {
    let raw = match tag_name {
        "owner" => resource.tags.owner.as_str(),
        "team" => resource.tags.team.as_str(),
        "project" => resource.tags.project.as_str(),
        "environment" => resource.tags.environment.as_str(),
        "cost_center" => resource.tags.cost_center.as_str(),
        _ => "",
    };
    if raw.is_empty() {
        "untagged".to_string()
    } else {
        raw.to_string()
    }
}
