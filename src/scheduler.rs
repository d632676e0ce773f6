//! Tiered scheduler (L8 in `spec.md` §2/§4.7).
//!
//! Classifies resources into scan tiers via an ordered list of patterns
//! per tier, then tracks which tiers are due for a rescan based on each
//! tier's configured interval.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, Weekday};

/// A scan tier. Earlier tiers in [`TieredScheduler`]'s rule list win ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Scanned most frequently.
    Critical,
    /// Production workloads not otherwise flagged critical.
    Production,
    /// The default tier for anything unmatched.
    Standard,
    /// Scanned least frequently.
    Archive,
}

/// One matching rule within a tier. A pattern with every sub-predicate
/// unset never matches anything, per `spec.md` §4.7.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierPattern {
    /// Exact resource type match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    /// Resource type membership match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_types: Option<Vec<String>>,
    /// Exact status match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Tag key/value pairs that must all be present.
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub tags: std::collections::BTreeMap<String, String>,
    /// Glob (`*token*`, `prefix*`, `*suffix`) applied to instance type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_type_pattern: Option<String>,
}

impl TierPattern {
    fn is_empty(&self) -> bool {
        self.resource_type.is_none()
            && self.resource_types.is_none()
            && self.status.is_none()
            && self.tags.is_empty()
            && self.instance_type_pattern.is_none()
    }

    fn matches(&self, resource: &crate::model::Resource) -> bool {
        if self.is_empty() {
            return false;
        }
        if let Some(t) = &self.resource_type {
            if &resource.resource_type != t {
                return false;
            }
        }
        if let Some(types) = &self.resource_types {
            if !types.contains(&resource.resource_type) {
                return false;
            }
        }
        if let Some(status) = &self.status {
            if &resource.status != status {
                return false;
            }
        }
        for (key, value) in &self.tags {
            let actual: &str = match key.as_str() {
                "owner" => &resource.tags.owner,
                "team" => &resource.tags.team,
                "environment" => &resource.tags.environment,
                "project" => &resource.tags.project,
                "cost_center" => &resource.tags.cost_center,
                _ => return false,
            };
            if actual != value {
                return false;
            }
        }
        if let Some(pattern) = &self.instance_type_pattern {
            match resource.metadata.instance_type.as_deref() {
                Some(instance_type) if glob_match(pattern, instance_type) => {}
                _ => return false,
            }
        }
        true
    }
}

fn glob_match(pattern: &str, value: &str) -> bool {
    if let Some(inner) = pattern.strip_prefix('*').and_then(|s| s.strip_suffix('*')) {
        return value.contains(inner);
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return value.starts_with(prefix);
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return value.ends_with(suffix);
    }
    value == pattern
}

/// One tier's classification rules and scan cadence.
#[derive(Debug, Clone)]
pub struct TierRules {
    /// The tier these patterns classify into.
    pub tier: Tier,
    /// Ordered patterns; the first that matches wins.
    pub patterns: Vec<TierPattern>,
    /// How often this tier should be rescanned.
    pub scan_interval: Duration,
}

/// Per-tier scan status, for [`TieredScheduler::summary`].
#[derive(Debug, Clone, Serialize)]
pub struct TierSummary {
    /// The tier this entry describes.
    pub tier: Tier,
    /// When this tier was last scanned, if ever.
    pub last_scan: Option<OffsetDateTime>,
    /// When this tier is next due, if it has been scanned before.
    pub next_scan: Option<OffsetDateTime>,
    /// Resource count from the most recent scan of this tier.
    pub resource_count: usize,
}

/// Classifies resources into tiers and tracks each tier's scan cadence.
pub struct TieredScheduler {
    rules: Vec<TierRules>,
    last_scan: HashMap<Tier, OffsetDateTime>,
    last_resource_count: HashMap<Tier, usize>,
    adaptive_hours: bool,
}

impl TieredScheduler {
    /// Builds a scheduler from an ordered rule list. When `adaptive_hours`
    /// is set, working-hours scans (09:00-18:00, Monday-Friday) are
    /// evaluated as if 30 minutes later, roughly doubling effective
    /// frequency during that window, per `spec.md` §4.7.
    pub fn new(rules: Vec<TierRules>, adaptive_hours: bool) -> Self {
        Self {
            rules,
            last_scan: HashMap::new(),
            last_resource_count: HashMap::new(),
            adaptive_hours,
        }
    }

    /// Classifies `resource` using the first tier whose patterns match,
    /// defaulting to [`Tier::Standard`].
    pub fn classify(&self, resource: &crate::model::Resource) -> Tier {
        for rule in &self.rules {
            if rule.patterns.iter().any(|p| p.matches(resource)) {
                return rule.tier;
            }
        }
        Tier::Standard
    }

    /// Every tier whose configured interval has elapsed since its last
    /// scan (or that has never been scanned).
    pub fn tiers_due_for_scan(&self) -> Vec<Tier> {
        let now = self.effective_now();
        self.rules
            .iter()
            .filter(|rule| match self.last_scan.get(&rule.tier) {
                None => true,
                Some(last) => now - *last >= rule.scan_interval,
            })
            .map(|rule| rule.tier)
            .collect()
    }

    /// Records that `tier` was just scanned and covered `resource_count`
    /// resources.
    pub fn mark_tier_scanned(&mut self, tier: Tier, resource_count: usize) {
        self.last_scan.insert(tier, OffsetDateTime::now_utc());
        self.last_resource_count.insert(tier, resource_count);
    }

    /// Per-tier scan status summary.
    pub fn summary(&self) -> Vec<TierSummary> {
        self.rules
            .iter()
            .map(|rule| {
                let last_scan = self.last_scan.get(&rule.tier).copied();
                let next_scan = last_scan.map(|last| last + rule.scan_interval);
                TierSummary {
                    tier: rule.tier,
                    last_scan,
                    next_scan,
                    resource_count: self.last_resource_count.get(&rule.tier).copied().unwrap_or(0),
                }
            })
            .collect()
    }

    fn effective_now(&self) -> OffsetDateTime {
        let now = OffsetDateTime::now_utc();
        if self.adaptive_hours && is_working_hours(now) {
            now - Duration::minutes(30)
        } else {
            now
        }
    }
}

fn is_working_hours(now: OffsetDateTime) -> bool {
    let is_weekday = !matches!(now.weekday(), Weekday::Saturday | Weekday::Sunday);
    is_weekday && (9..18).contains(&now.hour())
}
