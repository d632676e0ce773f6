//! Cooperative cancellation, standing in for the `context` parameter threaded
//! through every collaborator call in `spec.md` §6.
//!
//! Every store and analyzer operation that can run long (compaction, batch
//! writes, query scans) takes a [`CancellationToken`] and checks it at the
//! points `spec.md` §5 specifies: before acquiring the write lock, every 100
//! records scanned, every 50 records deleted, and at the start and during
//! cursor iteration of a query.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{EngineError, Result};

/// A cheap, cloneable handle used to request cancellation of an in-flight
/// operation and to let that operation observe the request.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is permanently not cancelled, for call sites that don't
    /// need cancellation (tests, one-shot CLI invocations).
    pub fn none() -> Self {
        Self::new()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `Err(EngineError::Cancelled)` if cancellation has been
    /// requested, `Ok(())` otherwise. Call sites sprinkle this at the check
    /// points `spec.md` §5 names.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}
