//! Change detector (L5 in `spec.md` §2/§4.4).
//!
//! Compares a freshly observed resource list against the store's prior
//! current state and emits one [`ChangeEvent`] per created, modified, or
//! disappeared resource. Detection always runs against the store's state
//! *before* the new observation is recorded — the orchestrator is
//! responsible for that ordering.

use std::collections::HashMap;
use std::sync::Arc;

use time::OffsetDateTime;
use tracing::warn;

use crate::analyzer::{AnalyzerLog, ChangeEvent};
use crate::cancel::CancellationToken;
use crate::change::materially_changed;
use crate::error::Result;
use crate::model::{ChangeType, Resource};
use crate::store::MvccStore;

/// Detects created/modified/disappeared resources between scans.
pub struct ChangeDetector {
    store: Arc<MvccStore>,
    analyzer: Arc<AnalyzerLog>,
}

impl ChangeDetector {
    /// Builds a detector over `store`'s current state, persisting detected
    /// events through `analyzer`.
    pub fn new(store: Arc<MvccStore>, analyzer: Arc<AnalyzerLog>) -> Self {
        Self { store, analyzer }
    }

    /// Detects changes in `observed` relative to the store's current state,
    /// persists them as one atomic batch, and returns them regardless of
    /// whether persistence succeeded (detection itself never fails on a
    /// persistence error — a warning is logged instead, per `spec.md` §7).
    pub fn detect_changes(&self, observed: &[Resource]) -> Result<Vec<ChangeEvent>> {
        let revision = self.store.current_revision();
        let timestamp = OffsetDateTime::now_utc();

        let current_states = self.store.get_all_current_resources();
        let mut prior: HashMap<String, Resource> = HashMap::with_capacity(current_states.len());
        for state in &current_states {
            if let Ok(resource) = self.store.get_latest_resource(&state.id) {
                prior.insert(state.id.clone(), resource);
            }
        }

        let mut events = Vec::new();

        if prior.is_empty() && revision == 0 {
            for resource in observed {
                events.push(ChangeEvent {
                    revision,
                    timestamp,
                    resource_id: resource.id.clone(),
                    change_type: ChangeType::Created,
                    before: None,
                    after: Some(resource.clone()),
                });
            }
        } else {
            let mut seen = std::collections::HashSet::new();
            for resource in observed {
                seen.insert(resource.id.clone());
                match prior.get(&resource.id) {
                    None => events.push(ChangeEvent {
                        revision,
                        timestamp,
                        resource_id: resource.id.clone(),
                        change_type: ChangeType::Created,
                        before: None,
                        after: Some(resource.clone()),
                    }),
                    Some(prev) if materially_changed(prev, resource) => events.push(ChangeEvent {
                        revision,
                        timestamp,
                        resource_id: resource.id.clone(),
                        change_type: ChangeType::Modified,
                        before: Some(prev.clone()),
                        after: Some(resource.clone()),
                    }),
                    Some(_) => {}
                }
            }
            for (id, prev) in &prior {
                if !seen.contains(id) {
                    events.push(ChangeEvent {
                        revision,
                        timestamp,
                        resource_id: id.clone(),
                        change_type: ChangeType::Disappeared,
                        before: Some(prev.clone()),
                        after: None,
                    });
                }
            }
        }

        if !events.is_empty() {
            if let Err(err) = self
                .analyzer
                .record_batch(events.clone(), &CancellationToken::none())
            {
                warn!(error = %err, count = events.len(), "detector.persist_events_failed");
            }
        }

        Ok(events)
    }
}
