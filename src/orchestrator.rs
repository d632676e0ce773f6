//! Reconciliation orchestrator (L10 in `spec.md` §2/§4.9).
//!
//! Ties every other layer together into one cycle: observe, detect,
//! decide, persist. Never mutates cloud state — the orchestrator's own
//! output is an advisory decision list, and even WAL append failures are
//! logged and swallowed rather than aborting the cycle (`spec.md` §7's
//! "Advisory" error kind).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::analyzer::AnalyzerLog;
use crate::cancel::CancellationToken;
use crate::collaborators::{Decision, Observer, PolicyDecisionMaker, Wal, WalEntryKind};
use crate::config::EngineConfig;
use crate::detector::ChangeDetector;
use crate::error::Result;
use crate::model::{Action, Filter, Resource};
use crate::store::MvccStore;

/// Summary of one completed reconciliation cycle, appended to the WAL as
/// its final record.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// When the cycle began.
    pub started_at: OffsetDateTime,
    /// Resources returned by the observer.
    pub resources_found: usize,
    /// Changes the detector emitted.
    pub changes_detected: usize,
    /// Decisions the policy layer returned.
    pub decisions_made: usize,
    /// Wall-clock duration of the cycle, in seconds.
    pub duration_secs: f64,
}

/// Drives one end-to-end observe/detect/decide/persist cycle.
pub struct ReconciliationOrchestrator {
    store: Arc<MvccStore>,
    detector: Arc<ChangeDetector>,
    #[allow(dead_code)]
    analyzer: Arc<AnalyzerLog>,
    observer: Arc<dyn Observer>,
    policy: Arc<dyn PolicyDecisionMaker>,
    wal: Arc<dyn Wal>,
    otlp_endpoint: Option<String>,
}

impl ReconciliationOrchestrator {
    /// Wires together the store and every collaborator a cycle needs. Reads
    /// `OTEL_EXPORTER_OTLP_ENDPOINT` once, via [`EngineConfig::otlp_endpoint`];
    /// its absence never fails construction.
    pub fn new(
        store: Arc<MvccStore>,
        detector: Arc<ChangeDetector>,
        analyzer: Arc<AnalyzerLog>,
        observer: Arc<dyn Observer>,
        policy: Arc<dyn PolicyDecisionMaker>,
        wal: Arc<dyn Wal>,
    ) -> Self {
        Self {
            store,
            detector,
            analyzer,
            observer,
            policy,
            wal,
            otlp_endpoint: EngineConfig::otlp_endpoint(),
        }
    }

    /// Runs one full cycle against `filter`, returning the decisions the
    /// policy layer produced. Observation, detection, and decision errors
    /// fail the cycle fast; WAL append failures are logged as warnings and
    /// never abort it.
    #[tracing::instrument(
        name = "orchestrator.cycle",
        skip(self, filter),
        fields(otlp_endpoint = self.otlp_endpoint.as_deref().unwrap_or("none"))
    )]
    pub async fn run_cycle(&self, filter: &Filter) -> Result<Vec<Decision>> {
        let cancel = CancellationToken::none();
        let started_at = OffsetDateTime::now_utc();
        let cycle_id = started_at.unix_timestamp_nanos().to_string();

        self.append_advisory(WalEntryKind::CycleStart, &cycle_id, &[]).await;

        let observed = self.observer.observe(&cancel, filter).await?;

        let observation_payload = serde_json::to_vec(&observed).unwrap_or_default();
        self.append_advisory(WalEntryKind::Observation, &cycle_id, &observation_payload)
            .await;

        let changes = self.detector.detect_changes(&observed)?;

        let decisions = self.policy.decide(&cancel, &changes).await?;

        for decision in &decisions {
            let payload = serde_json::to_vec(decision).unwrap_or_default();
            self.append_advisory(WalEntryKind::Decision, &decision.resource_id, &payload)
                .await;
        }

        let revision = self.store.record_observation_batch(&observed)?;

        if !decisions.is_empty() && decisions.iter().all(|d| d.action == Action::Audit) {
            let summary = baseline_summary(&observed);
            info!(summary = %summary, "orchestrator.baseline_detected");
        }

        let report = CycleReport {
            started_at,
            resources_found: observed.len(),
            changes_detected: changes.len(),
            decisions_made: decisions.len(),
            duration_secs: (OffsetDateTime::now_utc() - started_at).as_seconds_f64(),
        };
        let report_payload = serde_json::to_vec(&report).unwrap_or_default();
        self.append_advisory(WalEntryKind::CycleComplete, &cycle_id, &report_payload)
            .await;

        info!(
            revision,
            resources = report.resources_found,
            changes = report.changes_detected,
            decisions = report.decisions_made,
            duration_secs = report.duration_secs,
            "orchestrator.cycle_completed"
        );

        Ok(decisions)
    }

    /// Legacy reconcile-to-desired-state hook. Intentionally disabled: this
    /// engine only observes and records state, it never reconciles toward
    /// any desired configuration. Retained as a documented no-op for
    /// callers still wired to the old contract; it must stay a no-op.
    pub fn reconcile_to_desired_state(&self, _desired: &[Resource]) -> Result<()> {
        Ok(())
    }

    async fn append_advisory(&self, kind: WalEntryKind, id: &str, payload: &[u8]) {
        if let Err(err) = self.wal.append(kind, id, payload).await {
            warn!(error = %err, ?kind, "orchestrator.wal_append_failed");
        }
    }
}

fn baseline_summary(resources: &[Resource]) -> String {
    let total = resources.len();
    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    let mut untagged = 0usize;
    let mut oldest: Option<&Resource> = None;
    let mut newest: Option<&Resource> = None;

    for resource in resources {
        *by_type.entry(resource.resource_type.clone()).or_insert(0) += 1;
        if resource.tags.owner.is_empty() && resource.tags.team.is_empty() {
            untagged += 1;
        }
        if oldest.map(|o| resource.created_at < o.created_at).unwrap_or(true) {
            oldest = Some(resource);
        }
        if newest.map(|n| resource.created_at > n.created_at).unwrap_or(true) {
            newest = Some(resource);
        }
    }

    format!(
        "baseline scan: {total} resources, {untagged} untagged, by_type={by_type:?}, oldest={:?}, newest={:?}",
        oldest.map(|r| r.id.as_str()),
        newest.map(|r| r.id.as_str()),
    )
}
