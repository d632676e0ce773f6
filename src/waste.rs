//! Waste analyzer (L7 in `spec.md` §2/§4.6).
//!
//! Runs five independent predicates over resources observed in the last 24
//! hours. Each predicate that matches anything produces one
//! [`WastePattern`] carrying every matching id and a fixed confidence.

use std::sync::Arc;

use serde_json::Value;
use time::{Duration, OffsetDateTime};

use crate::analyzer::{AnalyzerLog, WastePattern};
use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::model::{Metadata, Resource, WasteType};
use crate::query::QueryEngine;

const LOOKBACK: Duration = Duration::hours(24);

/// Surfaces likely-wasteful resources from the most recent observations.
pub struct WasteAnalyzer {
    query: Arc<QueryEngine>,
    analyzer: Arc<AnalyzerLog>,
}

impl WasteAnalyzer {
    /// Builds a waste analyzer over `query`'s scans, persisting detected
    /// patterns through `analyzer`.
    pub fn new(query: Arc<QueryEngine>, analyzer: Arc<AnalyzerLog>) -> Self {
        Self { query, analyzer }
    }

    /// Evaluates every waste predicate against resources observed in the
    /// last 24 hours.
    pub fn analyze_waste(&self) -> Result<Vec<WastePattern>> {
        let cancel = CancellationToken::none();
        let now = OffsetDateTime::now_utc();
        let resources = self
            .query
            .query_by_time_range(now - LOOKBACK, now + Duration::seconds(1), &cancel)?;

        let mut patterns = Vec::new();
        push_pattern(
            &mut patterns,
            WasteType::Orphaned,
            "has no discoverable owner",
            0.8,
            now,
            &resources,
            is_orphaned,
        );
        push_pattern(
            &mut patterns,
            WasteType::Idle,
            "provisioned but not doing work",
            0.7,
            now,
            &resources,
            is_idle,
        );
        push_pattern(
            &mut patterns,
            WasteType::Oversized,
            "larger than its environment warrants",
            0.6,
            now,
            &resources,
            is_oversized,
        );
        push_pattern(
            &mut patterns,
            WasteType::Unattached,
            "has nothing attached",
            0.9,
            now,
            &resources,
            is_unattached,
        );
        push_pattern(
            &mut patterns,
            WasteType::Obsolete,
            "old enough to be a cleanup candidate",
            0.75,
            now,
            &resources,
            is_obsolete,
        );

        if !patterns.is_empty() {
            if let Err(err) = self.analyzer.record_batch(patterns.clone(), &cancel) {
                tracing::warn!(error = %err, "waste.persist_patterns_failed");
            }
        }
        Ok(patterns)
    }
}

fn push_pattern(
    patterns: &mut Vec<WastePattern>,
    pattern_type: WasteType,
    reason: &str,
    confidence: f64,
    first_seen: OffsetDateTime,
    resources: &[Resource],
    predicate: fn(&Resource) -> bool,
) {
    let ids: Vec<String> = resources
        .iter()
        .filter(|r| predicate(r))
        .map(|r| r.id.clone())
        .collect();
    if !ids.is_empty() {
        patterns.push(WastePattern {
            pattern_type,
            resource_ids: ids,
            reason: reason.to_string(),
            confidence,
            first_seen,
            metadata: None,
        });
    }
}

fn extra_is_false(metadata: &Metadata, key: &str) -> bool {
    metadata
        .extra
        .get(key)
        .and_then(Value::as_bool)
        .map(|value| !value)
        .unwrap_or(false)
}

fn is_orphaned(r: &Resource) -> bool {
    r.is_orphaned
        || (r.tags.owner.is_empty() && r.tags.team.is_empty())
        || (r.resource_type == "security_group" && r.name.to_lowercase().contains("default"))
}

fn is_idle(r: &Resource) -> bool {
    match r.resource_type.as_str() {
        "ec2" | "compute" => r.status == "stopped",
        "rds" | "db" | "cache" => r.metadata.extra_bool("is_idle"),
        "warehouse" => r.metadata.extra_bool("is_paused"),
        "lambda" | "function" => r
            .metadata
            .extra_f64("days_since_modified")
            .map(|days| days > 30.0)
            .unwrap_or(false),
        "nat_gateway" => r.status != "available",
        _ => false,
    }
}

fn is_oversized(r: &Resource) -> bool {
    let env = r.tags.environment.to_lowercase();
    let non_prod = matches!(env.as_str(), "dev" | "development" | "test" | "staging");
    if !non_prod {
        return false;
    }
    match r.resource_type.as_str() {
        "ec2" | "compute" => r
            .metadata
            .instance_type
            .as_deref()
            .map(|t| {
                let t = t.to_lowercase();
                ["xlarge", "2xlarge", "4xlarge", "8xlarge", "metal"]
                    .iter()
                    .any(|token| t.contains(token))
            })
            .unwrap_or(false),
        "rds" | "db" => r.metadata.extra_bool("multi_az"),
        "warehouse" => r.metadata.node_count.map(|n| n > 4).unwrap_or(false),
        _ => false,
    }
}

fn is_unattached(r: &Resource) -> bool {
    match r.resource_type.as_str() {
        "volume" | "block_storage" | "ebs" => {
            r.status == "unattached" || extra_is_false(&r.metadata, "is_attached")
        }
        "elastic_ip" | "eip" => {
            r.status == "unassociated" || extra_is_false(&r.metadata, "is_associated")
        }
        "network_interface" | "eni" => r
            .metadata
            .extra
            .get("attachment")
            .map(Value::is_null)
            .unwrap_or(true),
        _ => false,
    }
}

fn is_obsolete(r: &Resource) -> bool {
    match r.resource_type.as_str() {
        "snapshot" | "image" | "backup" => {
            r.metadata
                .extra_f64("age_days")
                .map(|days| days > 30.0)
                .unwrap_or(false)
                || r.metadata.extra_bool("is_old")
                || r.metadata.extra_bool("is_temp")
        }
        _ => false,
    }
}
