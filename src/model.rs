//! Data model for observed cloud resources.
//!
//! This module defines the canonical [`Resource`] record and the
//! supporting value types the analyzers, detector, and query engine all
//! operate on.
//!
//! # Key Types
//!
//! - [`Resource`] — a single observed cloud resource (instance, database,
//!   volume, ...).
//! - [`Tags`] — the structured tag block the policy/analyzer layer keys on.
//! - [`Metadata`] — typed provider metadata plus an auxiliary dictionary for
//!   fields only specific analyzers need.
//! - [`ResourceState`] — the store's index entry for one resource id.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Monotonically increasing revision assigned by the store to each
/// successful write transaction.
pub type Revision = u64;

/// A structured tag block. Tag values are free-form strings; analyzers treat
/// an absent or empty value as "untagged".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags {
    /// Set by the engine itself on resources it provisioned, never by the
    /// observed cloud state.
    #[serde(default)]
    pub managed_by_engine: bool,
    /// Free-text owner identifier (username, email, team handle).
    #[serde(default)]
    pub owner: String,
    /// Owning team name.
    #[serde(default)]
    pub team: String,
    /// Project this resource belongs to.
    #[serde(default)]
    pub project: String,
    /// Deployment environment (`production`, `staging`, `dev`, ...).
    #[serde(default)]
    pub environment: String,
    /// Billing cost center code.
    #[serde(default)]
    pub cost_center: String,
    /// Marks a resource as protected: decisions against it require
    /// confirmation and are never auto-escalated.
    #[serde(default)]
    pub blessed: bool,
}

/// Typed provider metadata. Fields the spec's analyzers consult by name are
/// first-class; anything else lives in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Provider-specific instance/node type (e.g. `m5.xlarge`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
    /// Node count, for clustered resources (warehouses, caches).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_count: Option<u32>,
    /// Whether the resource's data is encrypted at rest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
    /// Whether the resource has a public IP address assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<bool>,
    /// Whether the provider's deletion-protection flag is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_protection: Option<bool>,
    /// Configured backup retention period, in days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_retention_period: Option<u32>,
    /// Estimated monthly cost in the provider's billing currency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_cost_estimate: Option<f64>,
    /// Auxiliary provider-specific fields (e.g. `is_idle`, `is_paused`,
    /// `days_since_modified`, `is_attached`, `is_associated`, `attachment`,
    /// `age_days`, `is_old`, `is_temp`, `multi_az`) consulted by the waste
    /// and drift predicates in `spec.md` §4.5/§4.6.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl Metadata {
    /// Reads a boolean auxiliary field from `extra`, defaulting to `false`.
    pub fn extra_bool(&self, key: &str) -> bool {
        self.extra.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Reads a string auxiliary field from `extra`.
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    /// Reads a numeric auxiliary field from `extra`.
    pub fn extra_f64(&self, key: &str) -> Option<f64> {
        self.extra.get(key).and_then(Value::as_f64)
    }
}

/// A single observed cloud resource, per `spec.md` §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Identity, unique within `provider`.
    pub id: String,
    /// Resource kind (`ec2`, `rds`, `snapshot`, ...).
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Cloud provider (`aws`, `gcp`, `azure`, ...).
    pub provider: String,
    /// Cloud region.
    pub region: String,
    /// Cloud account or project id.
    pub account_id: String,
    /// Human-readable name.
    pub name: String,
    /// Provider-defined status string.
    pub status: String,
    /// Structured tag block.
    #[serde(default)]
    pub tags: Tags,
    /// Typed metadata block.
    #[serde(default)]
    pub metadata: Metadata,
    /// When the resource was first observed by this engine.
    pub created_at: OffsetDateTime,
    /// When the resource was last seen in a scan.
    pub last_seen_at: OffsetDateTime,
    /// Derived flag: true when an observer has independently determined the
    /// resource has no discoverable owner within the cloud provider's own
    /// metadata (distinct from the tag-based orphan heuristic in
    /// `spec.md` §4.6).
    #[serde(default)]
    pub is_orphaned: bool,
}

/// Filter used by the external [`crate::collaborators::Observer`] to scope a
/// scan, per `spec.md` §6.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filter {
    /// Restrict to a single provider, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Restrict to a single region, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Restrict to a single resource type, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    /// Restrict to an explicit set of ids, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
}

/// The store's index entry for one resource id (`spec.md` §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource id this entry tracks.
    pub id: String,
    /// Owner tag value as of the most recent observation.
    pub owner: String,
    /// Resource type as of the most recent observation.
    pub resource_type: String,
    /// Revision at which this id was first observed.
    pub first_seen_rev: Revision,
    /// Revision of the most recent observation (tombstone or not).
    pub last_seen_rev: Revision,
    /// Revision at which a tombstone was recorded, if the resource is
    /// currently absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disappeared_rev: Option<Revision>,
    /// Whether the resource currently exists (no tombstone is the latest
    /// record for this id).
    pub exists: bool,
}

/// One value recorded at a `(revision, id)` key in the observations log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObservationRecord {
    /// A full resource snapshot.
    Resource(Resource),
    /// A marker indicating the resource was absent from a scan.
    Tombstone {
        /// The id that disappeared.
        id: String,
        /// When the tombstone was recorded.
        timestamp: OffsetDateTime,
    },
}

impl ObservationRecord {
    /// The resource id this record pertains to, regardless of variant.
    pub fn id(&self) -> &str {
        match self {
            ObservationRecord::Resource(r) => &r.id,
            ObservationRecord::Tombstone { id, .. } => id,
        }
    }

    /// Whether this record represents a tombstone.
    pub fn is_tombstone(&self) -> bool {
        matches!(self, ObservationRecord::Tombstone { .. })
    }
}

/// Classification of a detected change, per `spec.md` §3/§4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// First observation of a resource ever (baseline scan).
    Baseline,
    /// A brand-new resource appeared outside a baseline scan.
    Created,
    /// An existing resource changed in a material field.
    Modified,
    /// A previously observed resource no longer appears in the scan.
    Disappeared,
    /// A resource that disappeared and later reappeared.
    Appeared,
    /// Only structured tag fields changed.
    TagDrift,
    /// Only the provider status string changed.
    StatusChanged,
    /// The resource has no engine-managed tag set.
    Unmanaged,
}

/// Drift severity, per `spec.md` §3/§4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftSeverity {
    /// Informational; no action implied.
    Low,
    /// Worth surfacing in a digest.
    Medium,
    /// Worth a direct notification.
    High,
    /// Worth paging.
    Critical,
}

/// Waste pattern classification, per `spec.md` §3/§4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WasteType {
    /// No discoverable owner.
    Orphaned,
    /// Provisioned but not doing work.
    Idle,
    /// Larger than its environment warrants.
    Oversized,
    /// Duplicate of another resource.
    Duplicate,
    /// Storage/network object with nothing attached.
    Unattached,
    /// Old enough to be a cleanup candidate.
    Obsolete,
}

/// Advisory action a [`crate::collaborators::PolicyDecisionMaker`] may
/// return, per `spec.md` §6. The engine never executes any of these itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Send a notification.
    Notify,
    /// Raise an alert.
    Alert,
    /// Record for audit only (used for baseline scans).
    Audit,
    /// Explicitly decided to take no action.
    Ignore,
    /// No decision was reached.
    Noop,
}
