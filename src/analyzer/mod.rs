//! Analyzer event log (L3 in `spec.md` §2/§4.2).
//!
//! Three independent streams — changes, drift, waste — sharing one
//! mechanism: events are keyed by `(timestampNanos, revision)` and share
//! the store's single revision counter so the total write order across
//! every bucket in the store stays consistent, per `spec.md` §5.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::warn;

use crate::cancel::CancellationToken;
use crate::error::{EngineError, Result};
use crate::model::{ChangeType, DriftSeverity, Resource, WasteType};
use crate::store::{Bucket, MvccStore, PendingFrame};

/// A detected change to one resource, per `spec.md` §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Revision at which this change was detected.
    pub revision: u64,
    /// When the event was recorded.
    pub timestamp: OffsetDateTime,
    /// The resource that changed.
    pub resource_id: String,
    /// What kind of change this is.
    pub change_type: ChangeType,
    /// State before the change, if available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Resource>,
    /// State after the change, if available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Resource>,
}

/// A detected drift between two observations of the same resource, per
/// `spec.md` §3/§4.5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftEvent {
    /// The resource that drifted.
    pub resource_id: String,
    /// When the event was recorded.
    pub timestamp: OffsetDateTime,
    /// Category of drift (`status`, `tag`, `metadata`, `cost`).
    pub drift_type: String,
    /// Dotted path of the field that changed (e.g. `tags.owner`).
    pub field: String,
    /// Previous value, stringified.
    pub old_value: String,
    /// New value, stringified.
    pub new_value: String,
    /// How severe this drift is judged to be.
    pub severity: DriftSeverity,
    /// Free-form supporting detail (e.g. percent cost change).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, Value>>,
}

/// A detected waste pattern across a set of resources, per `spec.md`
/// §3/§4.6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WastePattern {
    /// Which pattern matched.
    pub pattern_type: WasteType,
    /// The resources this pattern applies to.
    pub resource_ids: Vec<String>,
    /// Human-readable explanation.
    pub reason: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// When this pattern was first observed.
    pub first_seen: OffsetDateTime,
    /// Free-form supporting detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, Value>>,
}

/// Shared behavior required of every analyzer event kind.
pub trait AnalyzerEvent: Serialize + DeserializeOwned + Clone {
    /// The bucket this event kind is stored under.
    const BUCKET: Bucket;
    /// When the event occurred, for `QuerySince` filtering.
    fn timestamp(&self) -> OffsetDateTime;
    /// Sets the timestamp, used by batch writes to share one base time.
    fn set_timestamp(&mut self, timestamp: OffsetDateTime);
    /// Rejects malformed events before anything is written.
    fn validate(&self) -> Result<()>;
}

impl AnalyzerEvent for ChangeEvent {
    const BUCKET: Bucket = Bucket::Changes;

    fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: OffsetDateTime) {
        self.timestamp = timestamp;
    }

    fn validate(&self) -> Result<()> {
        if self.resource_id.is_empty() {
            return Err(EngineError::Validation("change event resource_id is empty".into()));
        }
        Ok(())
    }
}

impl AnalyzerEvent for DriftEvent {
    const BUCKET: Bucket = Bucket::Drift;

    fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: OffsetDateTime) {
        self.timestamp = timestamp;
    }

    fn validate(&self) -> Result<()> {
        if self.resource_id.is_empty() {
            return Err(EngineError::Validation("drift event resource_id is empty".into()));
        }
        if self.drift_type.is_empty() {
            return Err(EngineError::Validation("drift event drift_type is empty".into()));
        }
        if self.field.is_empty() {
            return Err(EngineError::Validation("drift event field is empty".into()));
        }
        Ok(())
    }
}

impl AnalyzerEvent for WastePattern {
    const BUCKET: Bucket = Bucket::Waste;

    fn timestamp(&self) -> OffsetDateTime {
        self.first_seen
    }

    fn set_timestamp(&mut self, timestamp: OffsetDateTime) {
        self.first_seen = timestamp;
    }

    fn validate(&self) -> Result<()> {
        if self.resource_ids.is_empty() {
            return Err(EngineError::Validation("waste pattern has no resource_ids".into()));
        }
        if self.reason.is_empty() {
            return Err(EngineError::Validation("waste pattern reason is empty".into()));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(EngineError::Validation(format!(
                "waste pattern confidence {} out of range [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// The analyzer event log: validated, batch-atomic writes plus
/// time-ordered reads over the changes/drift/waste buckets.
pub struct AnalyzerLog {
    store: Arc<MvccStore>,
}

impl AnalyzerLog {
    /// Wraps `store`'s changes/drift/waste buckets.
    pub fn new(store: Arc<MvccStore>) -> Self {
        Self { store }
    }

    /// Records a single event, allocating one revision.
    pub fn record<E: AnalyzerEvent>(&self, event: E) -> Result<u64> {
        self.record_batch(vec![event], &CancellationToken::none())
            .map(|revs| *revs.last().expect("record_batch returns >=1 revision"))
    }

    /// Records a batch of events sharing one base timestamp. Every event is
    /// validated before anything is written; the first invalid item fails
    /// the whole batch (reporting its index), and the revision counter is
    /// not advanced. Returns the revision assigned to each event, in
    /// order.
    pub fn record_batch<E: AnalyzerEvent>(
        &self,
        mut events: Vec<E>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u64>> {
        cancel.check()?;
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let base_timestamp = OffsetDateTime::now_utc();
        for (idx, event) in events.iter_mut().enumerate() {
            event.set_timestamp(base_timestamp);
            event.validate().map_err(|e| match e {
                EngineError::Validation(msg) => {
                    EngineError::Validation(format!("batch item {idx}: {msg}"))
                }
                other => other,
            })?;
        }

        let encoded: Vec<Vec<u8>> = events
            .iter()
            .map(|e| {
                serde_json::to_vec(e).map_err(|err| EngineError::serialization("analyzer.record_batch", err))
            })
            .collect::<Result<_>>()?;

        self.store.with_write(|handle| {
            let first_revision = handle.next_revision();
            let new_current = first_revision + events.len() as u64 - 1;
            let keys: Vec<Vec<u8>> = (0..encoded.len())
                .map(|idx| event_key(base_timestamp, first_revision + idx as u64))
                .collect();
            let frames: Vec<PendingFrame<'_>> = keys
                .iter()
                .zip(encoded.iter())
                .map(|(key, value)| PendingFrame {
                    bucket: E::BUCKET,
                    key: key.as_slice(),
                    value: value.as_slice(),
                    is_delete: false,
                })
                .collect();
            handle.append_batch_advancing_revision(&frames, new_current)?;
            Ok((first_revision..first_revision + events.len() as u64).collect())
        })
    }

    /// Returns every event of kind `E` with `timestamp >= since`, in
    /// insertion order, defensively copied out of the log.
    pub fn query_since<E: AnalyzerEvent>(
        &self,
        since: OffsetDateTime,
        cancel: &CancellationToken,
    ) -> Result<Vec<E>> {
        cancel.check()?;
        let mut results = Vec::new();
        let mut scanned = 0u64;
        self.store.with_write(|handle| {
            handle.replay_bucket(E::BUCKET, |frame| {
                scanned += 1;
                if scanned % 100 == 0 {
                    cancel.check()?;
                }
                match serde_json::from_slice::<E>(frame) {
                    Ok(event) => {
                        if event.timestamp() >= since {
                            results.push(event);
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "analyzer.query_since.skip_malformed_record");
                    }
                }
                Ok(())
            })
        })?;
        Ok(results)
    }
}

fn event_key(timestamp: OffsetDateTime, revision: u64) -> Vec<u8> {
    let nanos = timestamp.unix_timestamp_nanos() as i64 as u64;
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(&nanos.to_be_bytes());
    key.extend_from_slice(&revision.to_be_bytes());
    key
}
