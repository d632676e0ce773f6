#[path = "common/mod.rs"]
mod common;

use std::collections::BTreeMap;

use common::sample_resource;
use elava::scheduler::{Tier, TierPattern, TierRules, TieredScheduler};
use time::Duration;

fn rules() -> Vec<TierRules> {
    vec![
        TierRules {
            tier: Tier::Critical,
            patterns: vec![TierPattern {
                tags: BTreeMap::from([("environment".to_string(), "production".to_string())]),
                ..Default::default()
            }],
            scan_interval: Duration::minutes(5),
        },
        TierRules {
            tier: Tier::Production,
            patterns: vec![TierPattern {
                resource_type: Some("rds".to_string()),
                ..Default::default()
            }],
            scan_interval: Duration::minutes(15),
        },
        TierRules {
            tier: Tier::Archive,
            patterns: vec![TierPattern {
                status: Some("archived".to_string()),
                ..Default::default()
            }],
            scan_interval: Duration::hours(24),
        },
    ]
}

#[test]
fn first_matching_tier_wins() {
    let scheduler = TieredScheduler::new(rules(), false);
    let resource = sample_resource("i-1");
    assert_eq!(scheduler.classify(&resource), Tier::Critical);
}

#[test]
fn unmatched_resource_defaults_to_standard() {
    let scheduler = TieredScheduler::new(rules(), false);
    let mut resource = sample_resource("i-1");
    resource.tags.environment = "dev".to_string();
    resource.resource_type = "lambda".to_string();
    assert_eq!(scheduler.classify(&resource), Tier::Standard);
}

#[test]
fn empty_pattern_never_matches() {
    let scheduler = TieredScheduler::new(
        vec![TierRules {
            tier: Tier::Critical,
            patterns: vec![TierPattern::default()],
            scan_interval: Duration::minutes(5),
        }],
        false,
    );
    let resource = sample_resource("i-1");
    assert_eq!(scheduler.classify(&resource), Tier::Standard);
}

#[test]
fn never_scanned_tiers_are_due() {
    let scheduler = TieredScheduler::new(rules(), false);
    let due = scheduler.tiers_due_for_scan();
    assert_eq!(due.len(), 3);
}

#[test]
fn freshly_scanned_tier_is_not_due_again() {
    let mut scheduler = TieredScheduler::new(rules(), false);
    scheduler.mark_tier_scanned(Tier::Critical, 42);

    let due = scheduler.tiers_due_for_scan();
    assert!(!due.contains(&Tier::Critical));
    assert!(due.contains(&Tier::Production));
    assert!(due.contains(&Tier::Archive));
}

#[test]
fn summary_reports_last_scan_and_resource_count() {
    let mut scheduler = TieredScheduler::new(rules(), false);
    scheduler.mark_tier_scanned(Tier::Critical, 7);

    let summary = scheduler.summary();
    let critical = summary.iter().find(|s| s.tier == Tier::Critical).unwrap();
    assert!(critical.last_scan.is_some());
    assert!(critical.next_scan.is_some());
    assert_eq!(critical.resource_count, 7);

    let production = summary.iter().find(|s| s.tier == Tier::Production).unwrap();
    assert!(production.last_scan.is_none());
    assert_eq!(production.resource_count, 0);
}

#[test]
fn instance_type_glob_pattern_matches_wildcard_forms() {
    let scheduler = TieredScheduler::new(
        vec![TierRules {
            tier: Tier::Critical,
            patterns: vec![TierPattern {
                instance_type_pattern: Some("*xlarge*".to_string()),
                ..Default::default()
            }],
            scan_interval: Duration::minutes(5),
        }],
        false,
    );
    let mut resource = sample_resource("i-1");
    resource.metadata.instance_type = Some("m5.2xlarge".to_string());
    assert_eq!(scheduler.classify(&resource), Tier::Critical);
}
