//! Error taxonomy for the observation engine.
//!
//! Mirrors the propagation policy in `spec.md` §7: validation and
//! cancellation errors are returned synchronously without touching the
//! revision counter, storage errors are wrapped with the failing operation's
//! name, not-found is a distinct kind callers can match on, and claim
//! conflicts carry the id of the instance already holding the claim.

use std::io;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// The full error taxonomy produced by the store, analyzer, and orchestrator.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An event or decision payload failed validation before being written.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A cancellation token was observed as cancelled during an operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The underlying log, (de)serialization, or filesystem operation failed.
    #[error("storage error during {operation}: {source}")]
    Storage {
        /// Name of the operation that failed, for caller-side diagnostics.
        operation: &'static str,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The on-disk log failed its framing or checksum invariants.
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// A read-side lookup found nothing for the given key.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A claim is already held by another instance.
    #[error("already-claimed by {held_by}")]
    Conflict {
        /// The instance id currently holding the claim.
        held_by: String,
    },

    /// Caller-supplied argument was structurally invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl EngineError {
    /// Wraps an I/O error with the name of the operation that produced it.
    pub fn storage(operation: &'static str, source: io::Error) -> Self {
        EngineError::Storage {
            operation,
            source: Box::new(source),
        }
    }

    /// Wraps a serialization error with the name of the operation.
    pub fn serialization(operation: &'static str, source: serde_json::Error) -> Self {
        EngineError::Storage {
            operation,
            source: Box::new(source),
        }
    }
}

impl From<io::Error> for EngineError {
    fn from(source: io::Error) -> Self {
        EngineError::Storage {
            operation: "io",
            source: Box::new(source),
        }
    }
}
