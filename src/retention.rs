//! Generation retention.
//!
//! Keeps the newest `max_generations` generations of a topology and deletes
//! the rest, oldest first, together with the nodes and links they own.
//! `0` means unlimited. The newest generation always survives.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::store::GraphStore;
use crate::types::{GenerationId, TopologyId};

/// Error type for pruning.
#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    /// Store error.
    #[error("Store error: {0}")]
    Store(String),
}

impl RetentionError {
    /// Create a store error from any error type.
    pub fn from_store<E: std::error::Error>(e: E) -> Self {
        Self::Store(e.to_string())
    }
}

/// What a prune removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Deleted generations, oldest first.
    pub removed_generations: Vec<GenerationId>,
    /// Node rows deleted with them.
    pub removed_nodes: usize,
    /// Link rows deleted with them.
    pub removed_links: usize,
}

impl PruneReport {
    /// True when nothing was deleted.
    pub fn is_empty(&self) -> bool {
        self.removed_generations.is_empty()
    }
}

/// Prunes generations beyond a retention depth.
pub struct RetentionManager<S: GraphStore> {
    store: Arc<S>,
}

impl<S: GraphStore> RetentionManager<S> {
    /// Create a manager over a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Delete the oldest generations until at most `max_generations` remain.
    pub async fn prune(&self, topology: &TopologyId, max_generations: usize) -> Result<PruneReport, RetentionError> {
        let mut report = PruneReport::default();
        if max_generations == 0 {
            return Ok(report);
        }

        let generations = self
            .store
            .list_generations(topology)
            .await
            .map_err(RetentionError::from_store)?;
        if generations.len() <= max_generations {
            return Ok(report);
        }

        let excess = generations.len() - max_generations.max(1);
        for generation in generations.iter().take(excess) {
            let deleted = self
                .store
                .delete_generation(generation.id)
                .await
                .map_err(RetentionError::from_store)?;
            debug!(
                topology_id = %topology,
                generation_id = %generation.id,
                nodes = deleted.nodes,
                links = deleted.links,
                "Generation pruned"
            );
            report.removed_generations.push(generation.id);
            report.removed_nodes += deleted.nodes;
            report.removed_links += deleted.links;
        }

        info!(
            topology_id = %topology,
            removed_generations = report.removed_generations.len(),
            removed_nodes = report.removed_nodes,
            removed_links = report.removed_links,
            kept = max_generations,
            "History pruned"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryGraphStore;
    use crate::types::{AddressList, Link, Node, Topology};
    use chrono::{Duration, Utc};

    async fn seeded(generations: usize) -> (Arc<InMemoryGraphStore>, TopologyId, Vec<GenerationId>) {
        let store = Arc::new(InMemoryGraphStore::new());
        let topology = Topology::new("mesh", "netjson", "file:///dev/null");
        let tid = topology.id;
        store.add_topology(topology);

        let start = Utc::now();
        let mut ids = Vec::new();
        for i in 0..generations {
            let g = store
                .create_generation(&tid, start + Duration::seconds(i as i64), None)
                .await
                .unwrap();
            let a = Node::new(tid, g.id, AddressList::parse("a"));
            let b = Node::new(tid, g.id, AddressList::parse("b"));
            store.save_node(&a).await.unwrap();
            store.save_node(&b).await.unwrap();
            store.save_link(&Link::new(tid, g.id, a.id, b.id, 1.0)).await.unwrap();
            ids.push(g.id);
        }
        (store, tid, ids)
    }

    #[tokio::test]
    async fn test_prune_oldest() {
        let (store, tid, ids) = seeded(5).await;
        let manager = RetentionManager::new(Arc::clone(&store));

        let report = manager.prune(&tid, 2).await.unwrap();
        assert_eq!(report.removed_generations, ids[..3].to_vec());
        assert_eq!(report.removed_nodes, 6);
        assert_eq!(report.removed_links, 3);

        let kept: Vec<_> = store
            .list_generations(&tid)
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.id)
            .collect();
        assert_eq!(kept, ids[3..].to_vec());
        assert_eq!(store.num_nodes(), 4);
        assert_eq!(store.num_links(), 2);
    }

    #[tokio::test]
    async fn test_zero_is_unlimited() {
        let (store, tid, _) = seeded(3).await;
        let report = RetentionManager::new(Arc::clone(&store)).prune(&tid, 0).await.unwrap();
        assert!(report.is_empty());
        assert_eq!(store.num_generations(), 3);
    }

    #[tokio::test]
    async fn test_within_limit_is_noop() {
        let (store, tid, _) = seeded(2).await;
        let report = RetentionManager::new(Arc::clone(&store)).prune(&tid, 2).await.unwrap();
        assert!(report.is_empty());
        assert_eq!(store.num_generations(), 2);
    }

    #[tokio::test]
    async fn test_newest_survives() {
        let (store, tid, ids) = seeded(4).await;
        RetentionManager::new(Arc::clone(&store)).prune(&tid, 1).await.unwrap();
        let latest = store.latest_generation(&tid).await.unwrap().unwrap();
        assert_eq!(latest.id, ids[3]);
        assert_eq!(store.num_generations(), 1);
    }
}
