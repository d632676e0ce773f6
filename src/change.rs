//! Shared "materially changed" predicate used by the change detector
//! (`spec.md` §4.4) and the query engine's `QueryChangesSince` (§4.3).
//!
//! Kept as one function so both call sites agree on what counts as a real
//! change versus a `LastSeenAt`-only refresh.

use crate::model::Resource;

/// Structured tag fields the detector and query engine both key on.
fn tags_changed(prev: &Resource, curr: &Resource) -> bool {
    prev.tags.owner != curr.tags.owner
        || prev.tags.team != curr.tags.team
        || prev.tags.environment != curr.tags.environment
        || prev.tags.project != curr.tags.project
        || prev.tags.cost_center != curr.tags.cost_center
        || prev.tags.managed_by_engine != curr.tags.managed_by_engine
}

fn identity_fields_changed(prev: &Resource, curr: &Resource) -> bool {
    prev.name != curr.name || prev.region != curr.region || prev.account_id != curr.account_id
}

fn metadata_fields_changed(prev: &Resource, curr: &Resource) -> bool {
    prev.metadata.instance_type != curr.metadata.instance_type
        || prev.metadata.encrypted != curr.metadata.encrypted
        || prev.metadata.public_ip != curr.metadata.public_ip
}

/// Whether `curr` differs from `prev` in any field that matters, per
/// `spec.md` §4.4: status, structured tags, name, region, account id, or
/// the key metadata fields. A `last_seen_at`-only delta is not material.
pub fn materially_changed(prev: &Resource, curr: &Resource) -> bool {
    prev.status != curr.status
        || tags_changed(prev, curr)
        || identity_fields_changed(prev, curr)
        || metadata_fields_changed(prev, curr)
}

/// Whether the only material difference is the structured tag block.
pub fn only_tags_changed(prev: &Resource, curr: &Resource) -> bool {
    tags_changed(prev, curr)
        && prev.status == curr.status
        && !identity_fields_changed(prev, curr)
        && !metadata_fields_changed(prev, curr)
}

/// Whether the only material difference is the provider status string.
pub fn only_status_changed(prev: &Resource, curr: &Resource) -> bool {
    prev.status != curr.status
        && !tags_changed(prev, curr)
        && !identity_fields_changed(prev, curr)
        && !metadata_fields_changed(prev, curr)
}
