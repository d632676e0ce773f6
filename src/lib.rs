//! Day-2 cloud infrastructure observability engine.
//!
//! Periodically enumerates cloud resources, records every observation in
//! an append-only multi-version store, detects change/drift/waste against
//! prior state, and hands detected changes to an external policy layer for
//! an advisory decision. The engine never mutates cloud state itself.
//!
//! # Layers
//!
//! - [`model`] — the resource/tag/metadata data model.
//! - [`store`] — the MVCC observation store ([`store::MvccStore`]).
//! - [`claims`] — advisory cross-instance claim coordination.
//! - [`analyzer`] — the change/drift/waste event log.
//! - [`query`] — historical and aggregate queries over the store.
//! - [`detector`] — the change detector.
//! - [`drift`] — the drift analyzer.
//! - [`waste`] — the waste analyzer.
//! - [`scheduler`] — the tiered scan scheduler.
//! - [`collaborators`] — traits implemented by the embedding application
//!   (cloud observer, policy decision maker, write-ahead log).
//! - [`orchestrator`] — ties every layer together into one reconciliation
//!   cycle.

#![forbid(unsafe_code)]

pub mod analyzer;
pub mod cancel;
pub mod change;
pub mod claims;
pub mod collaborators;
pub mod config;
pub mod detector;
pub mod drift;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod query;
pub mod scheduler;
pub mod store;
pub mod waste;

pub use cancel::CancellationToken;
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use model::{Action, ChangeType, DriftSeverity, Filter, Resource, ResourceState, Revision, Tags, WasteType};
pub use orchestrator::ReconciliationOrchestrator;
pub use store::MvccStore;
