//! # topology-history
//!
//! Diff-and-reconcile engine for network topology snapshots.
//!
//! Each update cycle fetches the current topology of a network, diffs it
//! against what is stored, and folds the difference into a graph history:
//!
//! > Links that disappear are marked **down**, never deleted.
//!
//! ## Architecture
//!
//! ```text
//! Fetcher → GraphSnapshot → DiffEngine → ReconciliationStore → RetentionManager
//!                               ↑                 ↓
//!                    stored baseline      GraphStore (Postgres or Memory)
//! ```
//!
//! ## History Modes
//!
//! - `max_generations == 0`: one generation per topology; rows are updated
//!   in place and the baseline is the stored graph
//! - `max_generations > 0`: every cycle writes a fresh generation of rows
//!   diffed against an empty baseline; the oldest are pruned beyond the limit
//!
//! ## Determinism Guarantees
//!
//! - Snapshot nodes are keyed by primary address, links by (source, target)
//! - Diff sections are sorted by key; applying walks added, changed, removed
//! - Snapshot fingerprints are independent of declaration order

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod canonical;
pub mod config;
pub mod diff;
pub mod identity;
pub mod reconcile;
pub mod retention;
pub mod netjson;
pub mod fetch;
pub mod updater;
pub mod store;

#[cfg(feature = "service")]
pub mod service;

// Re-exports
pub use types::{
    AddressList, Generation, GenerationId, GraphSnapshot, Link, LinkId, LinkKey, LinkKeyMode,
    LinkStatus, Node, NodeId, Properties, SnapshotBuilder, SnapshotLink, SnapshotNode, Topology,
    TopologyId, ValidationError,
};
pub use canonical::{to_canonical_bytes, canonical_hash, canonical_hash_hex};
pub use config::{HistoryConfig, UpdaterConfig};
pub use diff::{Diff, DiffEngine, DiffSection, DiffSummary, LinkDelta, NodeDelta, SectionKind};
pub use identity::{IdentityResolver, ResolvedNode};
pub use reconcile::{AppliedResult, ReconcileError, ReconciliationStore, RecordError, RecordFailure};
pub use retention::{PruneReport, RetentionError, RetentionManager};
pub use netjson::{NetJsonError, NetworkCollection, NetworkGraph};
pub use fetch::{FetchError, Fetcher, NetJsonFetcher, StaticFetcher};
pub use updater::{TopologyUpdater, UpdateError, UpdateOutcome};
pub use store::{DeletedRows, GraphStore, InMemoryGraphStore};
#[cfg(feature = "postgres")]
pub use store::PostgresGraphStore;

// Service re-exports (when service feature is enabled)
#[cfg(feature = "service")]
pub use service::{create_router, ServiceState};

/// Schema version for persisted and fingerprinted types.
/// Increment on breaking changes to any schema type.
pub const TOPOLOGY_HISTORY_SCHEMA_VERSION: &str = "1.0.0";
