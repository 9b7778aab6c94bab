//! Topology update cycle.
//!
//! ```text
//! lock(topology) → fetch (bounded) → baseline → DiffEngine → apply → prune
//! ```
//!
//! A failed or timed-out fetch ends the cycle before anything is written.
//! At most one cycle runs per topology; different topologies run in parallel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::UpdaterConfig;
use crate::diff::{DiffEngine, DiffSummary};
use crate::fetch::{FetchError, Fetcher};
use crate::reconcile::{AppliedResult, ReconcileError, ReconciliationStore};
use crate::retention::{PruneReport, RetentionManager};
use crate::store::GraphStore;
use crate::types::{GenerationId, TopologyId};

/// Error type for an update cycle.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// No topology with this ID.
    #[error("Topology not found: {0}")]
    TopologyNotFound(TopologyId),

    /// Fetch failed; nothing was written.
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Store error outside the apply step.
    #[error("Store error: {0}")]
    Store(String),

    /// Apply aborted.
    #[error("Reconcile failed: {0}")]
    Reconcile(#[from] ReconcileError),
}

impl UpdateError {
    /// Create a store error from any error type.
    pub fn from_store<E: std::error::Error>(e: E) -> Self {
        Self::Store(e.to_string())
    }
}

/// Result of a successful cycle.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// Updated topology.
    pub topology: TopologyId,
    /// Generation written to.
    pub generation: GenerationId,
    /// Fingerprint of the fetched snapshot.
    pub snapshot_hash: Option<String>,
    /// Diff counts.
    pub diff: DiffSummary,
    /// Apply counts and skipped records.
    pub applied: AppliedResult,
    /// Retention result, when versioning is on and pruning succeeded.
    pub pruned: Option<PruneReport>,
    /// Whether topology metadata changed.
    pub metadata_changed: bool,
    /// Wall time of the cycle.
    pub latency_ms: u64,
}

/// Compact per-cycle counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct UpdateCounts {
    /// Node rows written.
    pub nodes_written: usize,
    /// Link rows written.
    pub links_written: usize,
    /// Records skipped.
    pub failures: usize,
}

impl UpdateOutcome {
    /// Counters for logging and API responses.
    pub fn counts(&self) -> UpdateCounts {
        UpdateCounts {
            nodes_written: self.applied.nodes_created + self.applied.nodes_updated,
            links_written: self.applied.links_created + self.applied.links_updated,
            failures: self.applied.failures.len(),
        }
    }
}

/// Runs update cycles against a store with a fetcher.
pub struct TopologyUpdater<S: GraphStore, F: Fetcher> {
    store: Arc<S>,
    fetcher: Arc<F>,
    config: UpdaterConfig,
    reconciler: ReconciliationStore<S>,
    retention: RetentionManager<S>,
    locks: parking_lot::Mutex<HashMap<TopologyId, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: GraphStore, F: Fetcher> TopologyUpdater<S, F> {
    /// Create an updater.
    pub fn new(store: Arc<S>, fetcher: Arc<F>, config: UpdaterConfig) -> Self {
        Self {
            reconciler: ReconciliationStore::new(Arc::clone(&store), config.history),
            retention: RetentionManager::new(Arc::clone(&store)),
            store,
            fetcher,
            config,
            locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn lock_for(&self, topology: &TopologyId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.locks.lock().entry(*topology).or_default())
    }

    /// Run one update cycle for a topology.
    pub async fn update(&self, id: &TopologyId) -> Result<UpdateOutcome, UpdateError> {
        let start = Instant::now();
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let result = self.run_cycle(id, start).await;
        if matches!(result, Err(UpdateError::TopologyNotFound(_))) {
            self.locks.lock().remove(id);
        }
        let latency_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(outcome) => record_update_metrics(id, "success", Some(outcome), latency_ms),
            Err(e) => {
                warn!(topology_id = %id, error = %e, "Topology update failed");
                let status = match e {
                    UpdateError::Fetch(_) => "fetch_failed",
                    UpdateError::TopologyNotFound(_) => "not_found",
                    _ => "error",
                };
                record_update_metrics(id, status, None, latency_ms);
            }
        }
        result
    }

    async fn run_cycle(&self, id: &TopologyId, start: Instant) -> Result<UpdateOutcome, UpdateError> {
        let mut topology = self
            .store
            .get_topology(id)
            .await
            .map_err(UpdateError::from_store)?
            .ok_or(UpdateError::TopologyNotFound(*id))?;

        let timeout = self.config.fetch_timeout;
        let latest = tokio::time::timeout(timeout, self.fetcher.fetch(&topology.url, &topology.parser))
            .await
            .map_err(|_| FetchError::Timeout(timeout))??
            .with_link_key(self.config.history.link_key);

        let snapshot_hash = match latest.fingerprint() {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!(topology_id = %id, error = %e, "Snapshot fingerprint failed");
                None
            }
        };

        let current = self.reconciler.baseline(&topology, &latest).await?;
        let diff = DiffEngine::compute(&current, &latest);
        let generation = self.reconciler.open_generation(id, snapshot_hash.clone()).await?;

        let versioned = self.config.history.is_versioned();
        let applied = match self.reconciler.apply_to(id, &generation, &diff).await {
            Ok(applied) => applied,
            Err(e) => {
                if versioned {
                    self.discard_generation(id, generation.id).await;
                }
                return Err(e.into());
            }
        };

        let pruned = if versioned {
            match self.retention.prune(id, self.config.history.max_generations).await {
                Ok(report) => Some(report),
                Err(e) => {
                    error!(topology_id = %id, error = %e, "Retention failed, applied diff kept");
                    None
                }
            }
        } else {
            None
        };

        let metadata_changed = topology.refresh_metadata(&latest);
        if metadata_changed {
            if let Err(e) = self.store.save_topology(&topology).await {
                error!(topology_id = %id, error = %e, "Metadata save failed, applied diff kept");
            }
        }

        Ok(UpdateOutcome {
            topology: *id,
            generation: generation.id,
            snapshot_hash,
            diff: diff.summary(),
            applied,
            pruned,
            metadata_changed,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Drop a partially written generation so reads keep showing the last
    /// complete one.
    async fn discard_generation(&self, topology: &TopologyId, generation: GenerationId) {
        match self.store.delete_generation(generation).await {
            Ok(rows) => warn!(
                topology_id = %topology,
                generation_id = %generation,
                nodes = rows.nodes,
                links = rows.links,
                "Discarded partial generation"
            ),
            Err(e) => error!(
                topology_id = %topology,
                generation_id = %generation,
                error = %e,
                "Failed to discard partial generation"
            ),
        }
    }

    /// Update every stored topology, one after another.
    pub async fn update_all(&self) -> Result<Vec<(TopologyId, Result<UpdateOutcome, UpdateError>)>, UpdateError> {
        let topologies = self
            .store
            .list_topologies()
            .await
            .map_err(UpdateError::from_store)?;
        let mut results = Vec::with_capacity(topologies.len());
        for topology in topologies {
            let result = self.update(&topology.id).await;
            results.push((topology.id, result));
        }
        info!(
            topologies = results.len(),
            failed = results.iter().filter(|(_, r)| r.is_err()).count(),
            "Update round finished"
        );
        Ok(results)
    }
}

/// Record update cycle metrics.
pub fn record_update_metrics(topology: &TopologyId, status: &str, outcome: Option<&UpdateOutcome>, latency_ms: u64) {
    let counts = outcome.map(UpdateOutcome::counts);
    info!(
        target: "topology_history::metrics",
        metric_type = "update",
        topology_id = %topology,
        status = status,
        nodes_written = counts.map_or(0, |c| c.nodes_written),
        links_written = counts.map_or(0, |c| c.links_written),
        failures = counts.map_or(0, |c| c.failures),
        latency_ms = latency_ms,
        "update_metric"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistoryConfig;
    use crate::fetch::StaticFetcher;
    use crate::store::memory::InMemoryError;
    use crate::store::{DeletedRows, InMemoryGraphStore};
    use crate::types::{Generation, GraphSnapshot, Link, Node, NodeId, SnapshotLink, Topology};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::time::Duration;

    /// In-memory store whose topology writes always fail.
    struct FrozenTopologies(InMemoryGraphStore);

    #[async_trait]
    impl GraphStore for FrozenTopologies {
        type Error = InMemoryError;

        async fn get_topology(&self, id: &TopologyId) -> Result<Option<Topology>, Self::Error> {
            self.0.get_topology(id).await
        }
        async fn list_topologies(&self) -> Result<Vec<Topology>, Self::Error> {
            self.0.list_topologies().await
        }
        async fn save_topology(&self, topology: &Topology) -> Result<(), Self::Error> {
            Err(InMemoryError::TopologyNotFound(topology.id))
        }
        async fn create_generation(
            &self,
            topology: &TopologyId,
            timestamp: DateTime<Utc>,
            snapshot_hash: Option<String>,
        ) -> Result<Generation, Self::Error> {
            self.0.create_generation(topology, timestamp, snapshot_hash).await
        }
        async fn list_generations(&self, topology: &TopologyId) -> Result<Vec<Generation>, Self::Error> {
            self.0.list_generations(topology).await
        }
        async fn delete_generation(&self, id: GenerationId) -> Result<DeletedRows, Self::Error> {
            self.0.delete_generation(id).await
        }
        async fn get_node(&self, id: &NodeId) -> Result<Option<Node>, Self::Error> {
            self.0.get_node(id).await
        }
        async fn find_node_by_address(
            &self,
            topology: &TopologyId,
            address: &str,
            generation: GenerationId,
        ) -> Result<Option<Node>, Self::Error> {
            self.0.find_node_by_address(topology, address, generation).await
        }
        async fn count_nodes_with_address(&self, topology: &TopologyId, address: &str) -> Result<usize, Self::Error> {
            self.0.count_nodes_with_address(topology, address).await
        }
        async fn nodes(&self, topology: &TopologyId, generation: GenerationId) -> Result<Vec<Node>, Self::Error> {
            self.0.nodes(topology, generation).await
        }
        async fn save_node(&self, node: &Node) -> Result<(), Self::Error> {
            self.0.save_node(node).await
        }
        async fn find_link(&self, topology: &TopologyId, source: &str, target: &str) -> Result<Option<Link>, Self::Error> {
            self.0.find_link(topology, source, target).await
        }
        async fn links(&self, topology: &TopologyId, generation: GenerationId) -> Result<Vec<Link>, Self::Error> {
            self.0.links(topology, generation).await
        }
        async fn save_link(&self, link: &Link) -> Result<(), Self::Error> {
            self.0.save_link(link).await
        }
    }

    fn setup() -> (Arc<InMemoryGraphStore>, Arc<StaticFetcher>, Topology) {
        let store = Arc::new(InMemoryGraphStore::new());
        let topology = Topology::new("mesh", "netjson", "mem://mesh");
        store.add_topology(topology.clone());
        (store, Arc::new(StaticFetcher::new()), topology)
    }

    fn graph(cost: f64) -> GraphSnapshot {
        GraphSnapshot::builder("OLSR", "0.8", "ETX")
            .link(SnapshotLink::new("a", "b", cost))
            .build()
    }

    #[tokio::test]
    async fn test_update_refreshes_metadata() {
        let config = UpdaterConfig::default();
        let (store, fetcher, topology) = setup();
        fetcher.set("mem://mesh", graph(1.0));
        let updater = TopologyUpdater::new(Arc::clone(&store), fetcher, config);

        let outcome = updater.update(&topology.id).await.unwrap();
        assert!(outcome.metadata_changed);
        assert_eq!(outcome.diff.added_links, 1);
        assert!(outcome.snapshot_hash.is_some());

        let saved = store.get_topology(&topology.id).await.unwrap().unwrap();
        assert_eq!(saved.protocol, "OLSR");
        assert_eq!(saved.metric, "ETX");
    }

    #[tokio::test]
    async fn test_fetch_failure_writes_nothing() {
        let config = UpdaterConfig::default();
        let (store, fetcher, topology) = setup();
        fetcher.fail("mem://mesh", FetchError::Network("unreachable".to_string()));
        let updater = TopologyUpdater::new(Arc::clone(&store), fetcher, config);

        let err = updater.update(&topology.id).await.unwrap_err();
        assert!(matches!(err, UpdateError::Fetch(FetchError::Network(_))));
        assert_eq!(store.num_generations(), 0);
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let config = UpdaterConfig::default().with_fetch_timeout(Duration::from_millis(20));
        let store = Arc::new(InMemoryGraphStore::new());
        let topology = Topology::new("slow", "netjson", "mem://slow");
        store.add_topology(topology.clone());
        let fetcher = Arc::new(StaticFetcher::new().with_delay(Duration::from_millis(500)));
        fetcher.set("mem://slow", graph(1.0));
        let updater = TopologyUpdater::new(Arc::clone(&store), fetcher, config);

        let err = updater.update(&topology.id).await.unwrap_err();
        assert!(matches!(err, UpdateError::Fetch(FetchError::Timeout(_))));
        assert_eq!(store.num_generations(), 0);
    }

    #[tokio::test]
    async fn test_unknown_topology() {
        let config = UpdaterConfig::default();
        let (store, fetcher, _) = setup();
        let updater = TopologyUpdater::new(store, fetcher, config);
        let err = updater.update(&TopologyId::random()).await.unwrap_err();
        assert!(matches!(err, UpdateError::TopologyNotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_topology_releases_lock() {
        let (store, fetcher, topology) = setup();
        fetcher.set("mem://mesh", graph(1.0));
        let updater = TopologyUpdater::new(store, fetcher, UpdaterConfig::default());

        for _ in 0..3 {
            assert!(updater.update(&TopologyId::random()).await.is_err());
        }
        assert!(updater.locks.lock().is_empty());

        updater.update(&topology.id).await.unwrap();
        assert_eq!(updater.locks.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_metadata_save_failure_keeps_outcome() {
        let inner = InMemoryGraphStore::new();
        let topology = Topology::new("mesh", "netjson", "mem://mesh");
        inner.add_topology(topology.clone());
        let store = Arc::new(FrozenTopologies(inner));
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.set("mem://mesh", graph(1.0));
        let updater = TopologyUpdater::new(Arc::clone(&store), fetcher, UpdaterConfig::default());

        let outcome = updater.update(&topology.id).await.unwrap();
        assert!(outcome.metadata_changed);
        assert_eq!(outcome.applied.links_created, 1);
        assert_eq!(store.0.num_links(), 1);

        let saved = store.get_topology(&topology.id).await.unwrap().unwrap();
        assert_eq!(saved.protocol, topology.protocol);
    }

    #[tokio::test]
    async fn test_versioned_prunes() {
        let config = UpdaterConfig::new(HistoryConfig::versioned(2));
        let (store, fetcher, topology) = setup();
        fetcher.set("mem://mesh", graph(1.0));
        let updater = TopologyUpdater::new(Arc::clone(&store), fetcher, config);

        for _ in 0..4 {
            updater.update(&topology.id).await.unwrap();
        }
        assert_eq!(store.num_generations(), 2);
        assert_eq!(store.num_links(), 2);
    }

    #[tokio::test]
    async fn test_update_all() {
        let config = UpdaterConfig::default();
        let (store, fetcher, topology) = setup();
        let other = Topology::new("other", "netjson", "mem://missing");
        store.add_topology(other.clone());
        fetcher.set("mem://mesh", graph(1.0));
        let updater = TopologyUpdater::new(Arc::clone(&store), fetcher, config);

        let results = updater.update_all().await.unwrap();
        assert_eq!(results.len(), 2);
        for (id, result) in results {
            assert_eq!(result.is_ok(), id == topology.id);
        }
    }
}
