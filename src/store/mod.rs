//! The MVCC observation store (L2 in `spec.md` §2).
//!
//! A durable, revision-numbered record of every resource observation plus an
//! in-memory index for O(log n) current-state lookups. Grounded on the
//! teacher's `db/core/graphdb.rs` (single struct owning the on-disk handle
//! and the in-memory index under one lock) and `admin/vacuum.rs`
//! (compaction reporting texture).

mod index;
pub mod log;

use std::path::{Path, PathBuf};
use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::cancel::CancellationToken;
use crate::error::{EngineError, Result};
use crate::model::{ObservationRecord, Resource, ResourceState, Revision};

pub use index::ResourceIndex;
pub use log::{Bucket, Frame, FrameLog, PendingFrame};

const META_CURRENT_REVISION: &[u8] = b"current_revision";

/// Conventional filename for the store's single backing file, per
/// `spec.md` §6.
pub const DEFAULT_FILE_NAME: &str = "elava.db";

/// Everything the store's single reader/writer lock guards, per `spec.md`
/// §5: the log handle, the in-memory index, the claims map, and the
/// revision counter all move together inside one transaction.
struct StoreState {
    log: FrameLog,
    index: ResourceIndex,
    latest_resources: std::collections::HashMap<String, Resource>,
    claims: std::collections::HashMap<String, crate::claims::Claim>,
    current_revision: Revision,
    oldest_revision: Revision,
}

/// Point-in-time statistics about the store, per `spec.md` §4.1.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    /// Number of currently-existing resources.
    pub count: usize,
    /// The store's current revision.
    pub revision: Revision,
    /// Estimated on-disk size in bytes.
    pub db_size_bytes: u64,
    /// Oldest revision still present after the last compaction, if any.
    pub oldest_revision: Revision,
}

/// Report produced by [`MvccStore::compact`]/[`MvccStore::compact_with_context`].
#[derive(Debug, Clone, Serialize)]
pub struct CompactionReport {
    /// Frames scanned during the rewrite.
    pub scanned: u64,
    /// Observation frames dropped.
    pub deleted: u64,
    /// Wall-clock duration of the compaction.
    pub duration_ms: f64,
    /// Revision below which observation history was discarded.
    pub cutoff_revision: Revision,
}

/// The embedded, revision-numbered, on-disk observation store.
pub struct MvccStore {
    state: RwLock<StoreState>,
}

impl MvccStore {
    /// Opens (creating if absent) the store rooted at `dir`, using
    /// `dir.join(DEFAULT_FILE_NAME)` as the backing file. Rebuilds the
    /// in-memory index and claims map by replaying every frame in revision
    /// order, per `spec.md` §4.1's startup contract.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let path = Self::resolve_path(dir.as_ref());
        let mut log = FrameLog::open(&path)?;

        let mut index = ResourceIndex::new();
        let mut latest_resources = std::collections::HashMap::new();
        let mut claims = std::collections::HashMap::new();
        let mut current_revision: Revision = 0;

        log.replay(|frame| {
            match frame.bucket {
                Bucket::Observations => {
                    let rev = parse_revision_from_key(&frame.key)?;
                    let record: ObservationRecord = serde_json::from_slice(&frame.value)
                        .map_err(|e| EngineError::serialization("store.replay.observation", e))?;
                    apply_observation(&mut index, &mut latest_resources, rev, &record);
                }
                Bucket::Meta => {
                    if frame.key == META_CURRENT_REVISION {
                        let text = std::str::from_utf8(&frame.value).map_err(|_| {
                            EngineError::Corruption("non-utf8 meta revision marker".into())
                        })?;
                        current_revision = text.parse().map_err(|_| {
                            EngineError::Corruption("malformed meta revision marker".into())
                        })?;
                    }
                }
                Bucket::Claims => {
                    let id = String::from_utf8_lossy(&frame.key).into_owned();
                    if frame.is_delete {
                        claims.remove(&id);
                    } else {
                        let claim: crate::claims::Claim = serde_json::from_slice(&frame.value)
                            .map_err(|e| EngineError::serialization("store.replay.claim", e))?;
                        claims.insert(id, claim);
                    }
                }
                Bucket::Changes | Bucket::Drift | Bucket::Waste | Bucket::Enforcements => {}
            }
            Ok(())
        })?;

        info!(
            db_path = %path.display(),
            resources = index.current().len(),
            revision = current_revision,
            "store.open.rebuilt_index"
        );

        Ok(Self {
            state: RwLock::new(StoreState {
                log,
                index,
                latest_resources,
                claims,
                current_revision,
                oldest_revision: 0,
            }),
        })
    }

    fn resolve_path(dir: &Path) -> PathBuf {
        if dir.extension().is_some() {
            dir.to_path_buf()
        } else {
            dir.join(DEFAULT_FILE_NAME)
        }
    }

    /// Records a single observation, allocating exactly one new revision.
    pub fn record_observation(&self, resource: Resource) -> Result<Revision> {
        self.record_observation_batch(&[resource])
    }

    /// Records a batch of observations sharing exactly one new revision.
    /// Either every resource is persisted and indexed, or (on error) none
    /// are and the revision counter is not advanced.
    pub fn record_observation_batch(&self, resources: &[Resource]) -> Result<Revision> {
        let mut state = self.state.write();
        let rev = state.current_revision + 1;

        let mut frames = Vec::with_capacity(resources.len() + 1);
        let mut encoded = Vec::with_capacity(resources.len());
        for resource in resources {
            let record = ObservationRecord::Resource(resource.clone());
            let value = serde_json::to_vec(&record)
                .map_err(|e| EngineError::serialization("store.record_observation", e))?;
            encoded.push((observation_key(rev, &resource.id), value));
        }
        for (key, value) in &encoded {
            frames.push(PendingFrame {
                bucket: Bucket::Observations,
                key,
                value,
                is_delete: false,
            });
        }
        let revision_bytes = rev.to_string().into_bytes();
        frames.push(PendingFrame {
            bucket: Bucket::Meta,
            key: META_CURRENT_REVISION,
            value: &revision_bytes,
            is_delete: false,
        });

        state.log.append_batch(&frames)?;
        state.current_revision = rev;
        for resource in resources {
            apply_observation(
                &mut state.index,
                &mut state.latest_resources,
                rev,
                &ObservationRecord::Resource(resource.clone()),
            );
        }
        Ok(rev)
    }

    /// Records a tombstone for `id`, allocating one new revision.
    pub fn record_disappearance(&self, id: &str) -> Result<Revision> {
        let mut state = self.state.write();
        let rev = state.current_revision + 1;
        let timestamp = OffsetDateTime::now_utc();
        let record = ObservationRecord::Tombstone {
            id: id.to_string(),
            timestamp,
        };
        let value = serde_json::to_vec(&record)
            .map_err(|e| EngineError::serialization("store.record_disappearance", e))?;
        let key = observation_key(rev, id);
        let revision_bytes = rev.to_string().into_bytes();

        state.log.append_batch(&[
            PendingFrame {
                bucket: Bucket::Observations,
                key: &key,
                value: &value,
                is_delete: false,
            },
            PendingFrame {
                bucket: Bucket::Meta,
                key: META_CURRENT_REVISION,
                value: &revision_bytes,
                is_delete: false,
            },
        ])?;
        state.current_revision = rev;
        apply_observation(&mut state.index, &mut state.latest_resources, rev, &record);
        Ok(rev)
    }

    /// Index-only lookup of the current state of `id`.
    pub fn get_resource_state(&self, id: &str) -> Result<ResourceState> {
        self.state
            .read()
            .index
            .get(id)
            .cloned()
            .ok_or(EngineError::NotFound("resource state"))
    }

    /// Scans observations for the latest record of `id` at or before `rev`.
    pub fn get_state_at_revision(&self, id: &str, rev: Revision) -> Result<ResourceState> {
        let mut state = self.state.write();
        let mut best: Option<(Revision, bool, String, String, Revision)> = None; // (rev, exists, owner, rtype, first_seen placeholder)
        let mut first_seen: Option<Revision> = None;
        state.log.replay(|frame| {
            if frame.bucket != Bucket::Observations {
                return Ok(());
            }
            let frev = parse_revision_from_key(&frame.key)?;
            let record: ObservationRecord = serde_json::from_slice(&frame.value)
                .map_err(|e| EngineError::serialization("store.get_state_at_revision", e))?;
            if record.id() != id {
                return Ok(());
            }
            if first_seen.is_none() || frev < first_seen.unwrap() {
                first_seen = Some(frev);
            }
            if frev <= rev && best.as_ref().map(|b| frev > b.0).unwrap_or(true) {
                let (exists, owner, rtype) = match &record {
                    ObservationRecord::Resource(r) => (true, r.tags.owner.clone(), r.resource_type.clone()),
                    ObservationRecord::Tombstone { .. } => (false, String::new(), String::new()),
                };
                best = Some((frev, exists, owner, rtype, frev));
            }
            Ok(())
        })?;

        match best {
            Some((last_rev, exists, owner, resource_type, _)) => Ok(ResourceState {
                id: id.to_string(),
                owner,
                resource_type,
                first_seen_rev: first_seen.unwrap_or(last_rev),
                last_seen_rev: last_rev,
                disappeared_rev: if exists { None } else { Some(last_rev) },
                exists,
            }),
            None => Err(EngineError::NotFound("resource state at revision")),
        }
    }

    /// The most recent non-tombstone [`Resource`] for `id`.
    pub fn get_latest_resource(&self, id: &str) -> Result<Resource> {
        let state = self.state.read();
        let exists = state.index.get(id).map(|s| s.exists).unwrap_or(false);
        if !exists {
            return Err(EngineError::NotFound("resource"));
        }
        state
            .latest_resources
            .get(id)
            .cloned()
            .ok_or(EngineError::NotFound("resource"))
    }

    /// Index scan filtered by `owner` and `exists`.
    pub fn get_resources_by_owner(&self, owner: &str) -> Vec<ResourceState> {
        self.state.read().index.current_by_owner(owner)
    }

    /// Index scan of every currently-existing resource.
    pub fn get_all_current_resources(&self) -> Vec<ResourceState> {
        self.state.read().index.current()
    }

    /// Every entry tracked by the index, existing or tombstoned.
    pub fn all_resource_states(&self) -> Vec<ResourceState> {
        self.state.read().index.all()
    }

    /// The store's current revision.
    pub fn current_revision(&self) -> Revision {
        self.state.read().current_revision
    }

    /// Whether the store has never recorded an observation.
    pub fn is_empty(&self) -> bool {
        self.state.read().current_revision == 0
    }

    /// Point-in-time store statistics.
    pub fn stats(&self) -> Result<StoreStats> {
        let state = self.state.read();
        Ok(StoreStats {
            count: state.index.current().len(),
            revision: state.current_revision,
            db_size_bytes: state.log.size_bytes()?,
            oldest_revision: state.oldest_revision,
        })
    }

    /// Deletes observation records whose revision is strictly less than
    /// `current_revision - keep_revisions`, except that the newest record
    /// for any id the index still tracks is always retained regardless of
    /// its revision — compaction must never make a still-indexed resource
    /// disappear on the next `open`. Every other bucket is left untouched.
    /// Equivalent to `compact_with_context` with a token that is never
    /// cancelled.
    pub fn compact(&self, keep_revisions: Revision) -> Result<CompactionReport> {
        self.compact_with_context(&CancellationToken::none(), keep_revisions)
    }

    /// Cancellable variant of [`MvccStore::compact`]. Checks `token` every
    /// 100 frames scanned and every 50 frames dropped, per `spec.md` §5.
    pub fn compact_with_context(
        &self,
        token: &CancellationToken,
        keep_revisions: Revision,
    ) -> Result<CompactionReport> {
        token.check()?;
        let start = Instant::now();
        let mut state = self.state.write();
        let cutoff = state.current_revision.saturating_sub(keep_revisions);

        // Compaction must never drop the only on-disk record for an id the
        // index still tracks, even if that record's revision falls below
        // `cutoff` — otherwise a later `MvccStore::open` rebuild would lose
        // the resource entirely. The index already carries each id's
        // `last_seen_rev`, so retain that frame unconditionally.
        let last_seen_by_id: std::collections::HashMap<String, Revision> = state
            .index
            .all()
            .into_iter()
            .map(|s| (s.id, s.last_seen_rev))
            .collect();

        let mut scanned = 0u64;
        let mut deleted = 0u64;
        let cancel_err = std::cell::Cell::new(false);
        let result = state.log.rewrite_keeping(|frame| {
            scanned += 1;
            if scanned % 100 == 0 {
                if let Err(e) = token.check() {
                    cancel_err.set(true);
                    return Err(e);
                }
            }
            let keep = match frame.bucket {
                Bucket::Observations => {
                    let (frev, id) = parse_observation_key(&frame.key)?;
                    frev >= cutoff || last_seen_by_id.get(&id).map(|&last| frev == last).unwrap_or(true)
                }
                _ => true,
            };
            if !keep {
                deleted += 1;
                if deleted % 50 == 0 {
                    token.check()?;
                }
            }
            Ok(keep)
        });

        match result {
            Ok(_) => {
                state.oldest_revision = cutoff;
                let report = CompactionReport {
                    scanned,
                    deleted,
                    duration_ms: start.elapsed().as_secs_f64() * 1_000.0,
                    cutoff_revision: cutoff,
                };
                info!(
                    scanned = report.scanned,
                    deleted = report.deleted,
                    cutoff_revision = report.cutoff_revision,
                    duration_ms = report.duration_ms,
                    "store.compact.completed"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "store.compact.cancelled");
                Err(e)
            }
        }
    }

    /// Raw access used by [`crate::claims::ClaimCoordinator`] and
    /// [`crate::analyzer`] to append to a specific bucket under the store's
    /// single lock. Not part of the public observation-store contract.
    pub(crate) fn with_write<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut StoreWriteHandle<'_>) -> Result<T>,
    {
        let mut state = self.state.write();
        let mut handle = StoreWriteHandle { state: &mut state };
        f(&mut handle)
    }

    pub(crate) fn with_read<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&StoreReadHandle<'_>) -> T,
    {
        let state = self.state.read();
        let handle = StoreReadHandle { state: &state };
        f(&handle)
    }
}

/// A scoped handle into the store's locked state for write-side
/// collaborators (claims, analyzer event log).
pub(crate) struct StoreWriteHandle<'a> {
    state: &'a mut StoreState,
}

impl<'a> StoreWriteHandle<'a> {
    /// The revision that would be assigned to the next single write. Does
    /// not reserve or commit anything; callers use this to build keys for
    /// frames they will append via [`StoreWriteHandle::append_batch_advancing_revision`].
    pub(crate) fn next_revision(&self) -> Revision {
        self.state.current_revision + 1
    }

    /// Appends `frames` together with the meta revision marker in one
    /// `append_batch` call, then advances `current_revision` to
    /// `new_current` only on success. This is the same one-transaction
    /// shape [`super::MvccStore::record_observation_batch`] uses: the
    /// revision counter and the records it covers land in a single atomic
    /// write, so a storage error never leaves the counter advanced with
    /// nothing written for it.
    pub(crate) fn append_batch_advancing_revision(
        &mut self,
        frames: &[PendingFrame<'_>],
        new_current: Revision,
    ) -> Result<()> {
        let revision_bytes = new_current.to_string().into_bytes();
        let mut all_frames = Vec::with_capacity(frames.len() + 1);
        all_frames.extend_from_slice(frames);
        all_frames.push(PendingFrame {
            bucket: Bucket::Meta,
            key: META_CURRENT_REVISION,
            value: &revision_bytes,
            is_delete: false,
        });
        self.state.log.append_batch(&all_frames)?;
        self.state.current_revision = new_current;
        Ok(())
    }

    /// Replays every non-deleted frame in `bucket`, invoking `visit` with
    /// each frame's raw value bytes. Used by the analyzer event log's
    /// `QuerySince`.
    pub(crate) fn replay_bucket<F>(&mut self, bucket: Bucket, mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        self.state.log.replay(|frame| {
            if frame.bucket == bucket && !frame.is_delete {
                visit(&frame.value)?;
            }
            Ok(())
        })
    }

    /// Replays the observations bucket, decoding each frame's revision (from
    /// its key) and [`ObservationRecord`] (from its value). Used by the
    /// query engine and change detector for historical scans.
    pub(crate) fn replay_observations<F>(&mut self, mut visit: F) -> Result<()>
    where
        F: FnMut(Revision, ObservationRecord) -> Result<()>,
    {
        self.state.log.replay(|frame| {
            if frame.bucket != Bucket::Observations {
                return Ok(());
            }
            let rev = parse_revision_from_key(&frame.key)?;
            let record: ObservationRecord = serde_json::from_slice(&frame.value)
                .map_err(|e| EngineError::serialization("store.replay_observations", e))?;
            visit(rev, record)
        })
    }

    pub(crate) fn claims(&self) -> &std::collections::HashMap<String, crate::claims::Claim> {
        &self.state.claims
    }

    pub(crate) fn put_claim(&mut self, id: &str, claim: crate::claims::Claim) -> Result<()> {
        let value = serde_json::to_vec(&claim)
            .map_err(|e| EngineError::serialization("store.put_claim", e))?;
        self.state
            .log
            .append_one(Bucket::Claims, id.as_bytes(), &value)?;
        self.state.claims.insert(id.to_string(), claim);
        Ok(())
    }

    pub(crate) fn delete_claim(&mut self, id: &str) -> Result<()> {
        self.state
            .log
            .append_batch(&[PendingFrame {
                bucket: Bucket::Claims,
                key: id.as_bytes(),
                value: &[],
                is_delete: true,
            }])?;
        self.state.claims.remove(id);
        Ok(())
    }
}

/// A scoped handle into the store's locked state for read-side
/// collaborators.
pub(crate) struct StoreReadHandle<'a> {
    state: &'a StoreState,
}

impl<'a> StoreReadHandle<'a> {
    pub(crate) fn claims(&self) -> &std::collections::HashMap<String, crate::claims::Claim> {
        &self.state.claims
    }
}

fn observation_key(rev: Revision, id: &str) -> Vec<u8> {
    format!("{rev:016}:{id}").into_bytes()
}

fn parse_revision_from_key(key: &[u8]) -> Result<Revision> {
    parse_observation_key(key).map(|(rev, _)| rev)
}

fn parse_observation_key(key: &[u8]) -> Result<(Revision, String)> {
    let text = std::str::from_utf8(key)
        .map_err(|_| EngineError::Corruption("non-utf8 observation key".into()))?;
    let (rev_part, id_part) = text
        .split_once(':')
        .ok_or_else(|| EngineError::Corruption("malformed observation key".into()))?;
    let rev = rev_part
        .parse()
        .map_err(|_| EngineError::Corruption("malformed observation key revision".into()))?;
    Ok((rev, id_part.to_string()))
}

fn apply_observation(
    index: &mut ResourceIndex,
    latest_resources: &mut std::collections::HashMap<String, Resource>,
    rev: Revision,
    record: &ObservationRecord,
) {
    let id = record.id().to_string();
    let first_seen_rev = index.get(&id).map(|s| s.first_seen_rev).unwrap_or(rev);
    match record {
        ObservationRecord::Resource(resource) => {
            index.upsert(ResourceState {
                id: id.clone(),
                owner: resource.tags.owner.clone(),
                resource_type: resource.resource_type.clone(),
                first_seen_rev,
                last_seen_rev: rev,
                disappeared_rev: None,
                exists: true,
            });
            latest_resources.insert(id, resource.clone());
        }
        ObservationRecord::Tombstone { .. } => {
            let owner = index.get(&id).map(|s| s.owner.clone()).unwrap_or_default();
            let resource_type = index.get(&id).map(|s| s.resource_type.clone()).unwrap_or_default();
            index.upsert(ResourceState {
                id,
                owner,
                resource_type,
                first_seen_rev,
                last_seen_rev: rev,
                disappeared_rev: Some(rev),
                exists: false,
            });
        }
    }
}
