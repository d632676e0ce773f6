//! Collaborator traits the orchestrator depends on but never implements
//! itself, per `spec.md` §6. Kept as capability traits (one method each,
//! `async_trait` object-safe) so the core engine carries no cloud-SDK
//! dependency: concrete cloud adapters, policy engines, and WAL backends
//! are supplied by the embedding application.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analyzer::ChangeEvent;
use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::model::{Action, Filter, Resource};

/// An advisory decision about one resource, returned by a
/// [`PolicyDecisionMaker`]. The engine never acts on these itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// What the policy layer recommends.
    pub action: Action,
    /// The resource this decision concerns.
    pub resource_id: String,
    /// Human-readable justification.
    pub reason: String,
    /// Free-form supporting detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, Value>>,
    /// Whether the resource carries the `blessed` tag, i.e. is protected
    /// from auto-escalation.
    pub is_blessed: bool,
}

/// Enumerates cloud resources. Implementations must be idempotent and
/// side-effect-free; the engine never mutates cloud state through this or
/// any other interface.
#[async_trait]
pub trait Observer: Send + Sync {
    /// Returns every resource matching `filter`.
    async fn observe(&self, cancel: &CancellationToken, filter: &Filter) -> Result<Vec<Resource>>;
}

/// Turns detected changes into advisory decisions. Implementations must
/// never mutate cloud state.
#[async_trait]
pub trait PolicyDecisionMaker: Send + Sync {
    /// Decides what, if anything, to recommend for each of `changes`.
    async fn decide(&self, cancel: &CancellationToken, changes: &[ChangeEvent]) -> Result<Vec<Decision>>;
}

/// The kind of entry being appended to a [`Wal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalEntryKind {
    /// Marks the start of a reconciliation cycle.
    CycleStart,
    /// Records the resources returned by an observation.
    Observation,
    /// Records one advisory decision.
    Decision,
    /// Marks the end of a reconciliation cycle.
    CycleComplete,
}

/// A durable, append-only audit trail. The MVCC store remains the
/// authoritative source of truth; the WAL is advisory history only, per
/// `spec.md` §9 — a failed append is logged as a warning and never aborts
/// a cycle.
#[async_trait]
pub trait Wal: Send + Sync {
    /// Appends one record. `payload` is caller-defined (typically JSON).
    async fn append(&self, kind: WalEntryKind, id: &str, payload: &[u8]) -> Result<()>;
}
