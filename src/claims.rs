//! Advisory claim coordinator (L9 in `spec.md` §2/§4.8).
//!
//! Provides TTL-bounded mutual exclusion over resource ids across multiple
//! engine instances sharing one store directory. This is advisory, not
//! consensus: a claim only prevents other well-behaved instances from also
//! claiming the same ids, it never blocks the store's own observation or
//! analyzer writes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::store::MvccStore;

/// A held claim over one resource id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    /// The resource this claim covers.
    pub resource_id: String,
    /// The instance that holds the claim.
    pub instance_id: String,
    /// When the claim was taken.
    pub claimed_at: OffsetDateTime,
    /// When the claim lapses.
    pub expires_at: OffsetDateTime,
}

/// Coordinates advisory claims over resource ids, backed by the store's
/// dedicated claims bucket.
pub struct ClaimCoordinator {
    store: Arc<MvccStore>,
    instance_id: String,
}

impl ClaimCoordinator {
    /// Creates a coordinator identifying itself as `instance_id` in every
    /// claim it takes.
    pub fn new(store: Arc<MvccStore>, instance_id: impl Into<String>) -> Self {
        Self {
            store,
            instance_id: instance_id.into(),
        }
    }

    /// Attempts to claim every id in `ids` for `ttl`. In one transaction:
    /// reads each id's existing claim, fails the whole call with
    /// [`EngineError::Conflict`] naming the holder if any id is already
    /// held by a different, unexpired instance, otherwise writes every new
    /// claim. All claims succeed together or none do.
    pub fn claim_resources(&self, ids: &[String], ttl: Duration) -> Result<()> {
        let now = OffsetDateTime::now_utc();
        let expires_at = now + ttl;

        self.store.with_write(|handle| {
            for id in ids {
                if let Some(existing) = handle.claims().get(id) {
                    if existing.expires_at > now && existing.instance_id != self.instance_id {
                        return Err(EngineError::Conflict {
                            held_by: existing.instance_id.clone(),
                        });
                    }
                }
            }
            for id in ids {
                handle.put_claim(
                    id,
                    Claim {
                        resource_id: id.clone(),
                        instance_id: self.instance_id.clone(),
                        claimed_at: now,
                        expires_at,
                    },
                )?;
            }
            Ok(())
        })?;

        info!(count = ids.len(), instance_id = %self.instance_id, "claims.claimed");
        Ok(())
    }

    /// Releases every id in `ids`. Missing claims are not an error.
    pub fn release_resources(&self, ids: &[String]) -> Result<()> {
        self.store.with_write(|handle| {
            for id in ids {
                handle.delete_claim(id)?;
            }
            Ok(())
        })?;
        info!(count = ids.len(), instance_id = %self.instance_id, "claims.released");
        Ok(())
    }

    /// Whether `id` is held by some other, unexpired instance.
    pub fn is_resource_claimed(&self, id: &str) -> bool {
        self.store.with_read(|handle| {
            handle
                .claims()
                .get(id)
                .map(|c| c.expires_at > OffsetDateTime::now_utc() && c.instance_id != self.instance_id)
                .unwrap_or(false)
        })
    }

    /// Sweeps out claims whose `expires_at` has passed, returning the
    /// number removed.
    pub fn cleanup_expired_claims(&self) -> Result<usize> {
        let now = OffsetDateTime::now_utc();
        let removed = self.store.with_write(|handle| {
            let expired: Vec<String> = handle
                .claims()
                .iter()
                .filter(|(_, c)| c.expires_at < now)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &expired {
                handle.delete_claim(id)?;
            }
            Ok(expired.len())
        })?;
        if removed > 0 {
            warn!(removed, "claims.cleanup_expired");
        }
        Ok(removed)
    }
}
