//! Engine configuration.
//!
//! Loading config from disk is explicitly out of scope for the engine
//! itself (`spec.md` §6) — this module only defines the shape a loader
//! must produce, plus preset constructors for the common cases, mirroring
//! the teacher's `db/config.rs` preset pattern.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::Duration;

use crate::scheduler::{Tier, TierPattern, TierRules, TieredScheduler};

/// One tier's declarative scan cadence and classification patterns, as an
/// external loader would deserialize it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierIntervalConfig {
    /// Which tier this configures.
    pub tier: Tier,
    /// Scan interval, in seconds.
    pub scan_interval_secs: u64,
    /// Ordered classification patterns for this tier.
    #[serde(default)]
    pub patterns: Vec<TierPattern>,
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory the store's backing file lives in.
    pub store_dir: PathBuf,
    /// Whether to apply the working-hours scan-frequency adjustment
    /// described in `spec.md` §4.7.
    #[serde(default)]
    pub adaptive_hours: bool,
    /// Revisions of observation history to retain on compaction.
    #[serde(default = "default_keep_revisions")]
    pub compaction_keep_revisions: u64,
    /// Per-tier scan cadence and classification rules.
    #[serde(default)]
    pub tiers: Vec<TierIntervalConfig>,
}

fn default_keep_revisions() -> u64 {
    100
}

impl EngineConfig {
    /// A conservative preset: long compaction retention, hourly-and-up
    /// scan intervals, adaptive hours enabled. Mirrors the teacher's
    /// `Config::production()`.
    pub fn production(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
            adaptive_hours: true,
            compaction_keep_revisions: 1_000,
            tiers: vec![
                TierIntervalConfig {
                    tier: Tier::Critical,
                    scan_interval_secs: 5 * 60,
                    patterns: vec![],
                },
                TierIntervalConfig {
                    tier: Tier::Production,
                    scan_interval_secs: 15 * 60,
                    patterns: vec![],
                },
                TierIntervalConfig {
                    tier: Tier::Standard,
                    scan_interval_secs: 60 * 60,
                    patterns: vec![],
                },
                TierIntervalConfig {
                    tier: Tier::Archive,
                    scan_interval_secs: 24 * 60 * 60,
                    patterns: vec![],
                },
            ],
        }
    }

    /// A lighter preset for development and tests: short intervals,
    /// shallow retention, adaptive hours off.
    pub fn balanced(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
            adaptive_hours: false,
            compaction_keep_revisions: 50,
            tiers: vec![
                TierIntervalConfig {
                    tier: Tier::Critical,
                    scan_interval_secs: 30,
                    patterns: vec![],
                },
                TierIntervalConfig {
                    tier: Tier::Standard,
                    scan_interval_secs: 120,
                    patterns: vec![],
                },
            ],
        }
    }

    /// The `OTEL_EXPORTER_OTLP_ENDPOINT` environment variable, if set.
    /// Absence must never fail engine startup, per `spec.md` §6.
    pub fn otlp_endpoint() -> Option<String> {
        std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()
    }

    /// Builds a [`TieredScheduler`] from this configuration.
    pub fn build_scheduler(&self) -> TieredScheduler {
        let rules = self
            .tiers
            .iter()
            .map(|t| TierRules {
                tier: t.tier,
                patterns: t.patterns.clone(),
                scan_interval: Duration::seconds(t.scan_interval_secs as i64),
            })
            .collect();
        TieredScheduler::new(rules, self.adaptive_hours)
    }
}
