//! In-memory graph store for testing and single-process deployments.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::types::{Generation, GenerationId, Link, LinkId, Node, NodeId, Topology, TopologyId};
use super::{DeletedRows, GraphStore};

/// Error type for in-memory store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemoryError {
    /// Topology not found.
    #[error("Topology not found: {0}")]
    TopologyNotFound(TopologyId),
    /// Generation not found.
    #[error("Generation not found: {0}")]
    GenerationNotFound(GenerationId),
    /// Node not found.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
}

#[derive(Debug, Default)]
struct Inner {
    topologies: BTreeMap<TopologyId, Topology>,
    generations: BTreeMap<GenerationId, Generation>,
    last_generation: i64,
    nodes: BTreeMap<NodeId, Node>,
    /// (topology, address) -> nodes carrying that address.
    addresses: BTreeMap<(TopologyId, String), BTreeSet<NodeId>>,
    links: BTreeMap<LinkId, Link>,
}

impl Inner {
    fn index_node(&mut self, node: &Node) {
        for address in node.addresses.iter() {
            self.addresses
                .entry((node.topology, address.to_string()))
                .or_default()
                .insert(node.id);
        }
    }

    fn unindex_node(&mut self, node: &Node) {
        for address in node.addresses.iter() {
            let key = (node.topology, address.to_string());
            if let Some(ids) = self.addresses.get_mut(&key) {
                ids.remove(&node.id);
                if ids.is_empty() {
                    self.addresses.remove(&key);
                }
            }
        }
    }

    fn nodes_with_address(&self, topology: TopologyId, address: &str) -> Option<&BTreeSet<NodeId>> {
        self.addresses.get(&(topology, address.to_string()))
    }

    fn primary_of(&self, id: &NodeId) -> &str {
        self.nodes.get(id).map(Node::primary_address).unwrap_or_default()
    }
}

/// In-memory graph store.
///
/// Uses BTreeMap/BTreeSet for deterministic iteration order and a
/// `parking_lot::RwLock` for interior mutability; no guard is held across
/// an await point.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    inner: RwLock<Inner>,
}

impl InMemoryGraphStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a topology to the store.
    pub fn add_topology(&self, topology: Topology) {
        self.inner.write().topologies.insert(topology.id, topology);
    }

    /// Get number of node rows across all topologies and generations.
    pub fn num_nodes(&self) -> usize {
        self.inner.read().nodes.len()
    }

    /// Get number of link rows across all topologies and generations.
    pub fn num_links(&self) -> usize {
        self.inner.read().links.len()
    }

    /// Get number of generations across all topologies.
    pub fn num_generations(&self) -> usize {
        self.inner.read().generations.len()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    type Error = InMemoryError;

    async fn get_topology(&self, id: &TopologyId) -> Result<Option<Topology>, Self::Error> {
        Ok(self.inner.read().topologies.get(id).cloned())
    }

    async fn list_topologies(&self) -> Result<Vec<Topology>, Self::Error> {
        let mut topologies: Vec<Topology> = self.inner.read().topologies.values().cloned().collect();
        topologies.sort_by(|a, b| a.label.cmp(&b.label).then_with(|| a.id.cmp(&b.id)));
        Ok(topologies)
    }

    async fn save_topology(&self, topology: &Topology) -> Result<(), Self::Error> {
        self.inner.write().topologies.insert(topology.id, topology.clone());
        Ok(())
    }

    async fn create_generation(
        &self,
        topology: &TopologyId,
        timestamp: DateTime<Utc>,
        snapshot_hash: Option<String>,
    ) -> Result<Generation, Self::Error> {
        let mut inner = self.inner.write();
        if !inner.topologies.contains_key(topology) {
            return Err(InMemoryError::TopologyNotFound(*topology));
        }
        inner.last_generation += 1;
        let generation = Generation {
            id: GenerationId::new(inner.last_generation),
            topology: *topology,
            timestamp,
            snapshot_hash,
        };
        inner.generations.insert(generation.id, generation.clone());
        Ok(generation)
    }

    async fn list_generations(&self, topology: &TopologyId) -> Result<Vec<Generation>, Self::Error> {
        let mut generations: Vec<Generation> = self
            .inner
            .read()
            .generations
            .values()
            .filter(|g| g.topology == *topology)
            .cloned()
            .collect();
        generations.sort_by_key(Generation::order_key);
        Ok(generations)
    }

    async fn delete_generation(&self, id: GenerationId) -> Result<DeletedRows, Self::Error> {
        let mut inner = self.inner.write();
        if inner.generations.remove(&id).is_none() {
            return Err(InMemoryError::GenerationNotFound(id));
        }

        let doomed: Vec<Node> = inner
            .nodes
            .values()
            .filter(|n| n.generation == id)
            .cloned()
            .collect();
        for node in &doomed {
            inner.unindex_node(node);
            inner.nodes.remove(&node.id);
        }
        let doomed_ids: BTreeSet<NodeId> = doomed.iter().map(|n| n.id).collect();

        // Cascade: links owned by the generation or hanging off a removed node.
        let before = inner.links.len();
        inner.links.retain(|_, l| {
            l.generation != id && !doomed_ids.contains(&l.source) && !doomed_ids.contains(&l.target)
        });

        Ok(DeletedRows {
            nodes: doomed.len(),
            links: before - inner.links.len(),
        })
    }

    async fn get_node(&self, id: &NodeId) -> Result<Option<Node>, Self::Error> {
        Ok(self.inner.read().nodes.get(id).cloned())
    }

    async fn find_node_by_address(
        &self,
        topology: &TopologyId,
        address: &str,
        generation: GenerationId,
    ) -> Result<Option<Node>, Self::Error> {
        let inner = self.inner.read();
        let Some(ids) = inner.nodes_with_address(*topology, address) else {
            return Ok(None);
        };
        let candidates: Vec<&Node> = ids
            .iter()
            .filter_map(|id| inner.nodes.get(id))
            .filter(|n| n.generation == generation)
            .collect();
        let found = candidates
            .iter()
            .find(|n| n.primary_address() == address)
            .or_else(|| candidates.first())
            .map(|n| (*n).clone());
        Ok(found)
    }

    async fn count_nodes_with_address(
        &self,
        topology: &TopologyId,
        address: &str,
    ) -> Result<usize, Self::Error> {
        Ok(self
            .inner
            .read()
            .nodes_with_address(*topology, address)
            .map(BTreeSet::len)
            .unwrap_or(0))
    }

    async fn nodes(&self, topology: &TopologyId, generation: GenerationId) -> Result<Vec<Node>, Self::Error> {
        let mut nodes: Vec<Node> = self
            .inner
            .read()
            .nodes
            .values()
            .filter(|n| n.topology == *topology && n.generation == generation)
            .cloned()
            .collect();
        nodes.sort_by(|a, b| {
            a.primary_address()
                .cmp(b.primary_address())
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(nodes)
    }

    async fn save_node(&self, node: &Node) -> Result<(), Self::Error> {
        let mut inner = self.inner.write();
        if !inner.topologies.contains_key(&node.topology) {
            return Err(InMemoryError::TopologyNotFound(node.topology));
        }
        if !inner.generations.contains_key(&node.generation) {
            return Err(InMemoryError::GenerationNotFound(node.generation));
        }
        if let Some(previous) = inner.nodes.get(&node.id).cloned() {
            inner.unindex_node(&previous);
        }
        inner.index_node(node);
        inner.nodes.insert(node.id, node.clone());
        Ok(())
    }

    async fn find_link(
        &self,
        topology: &TopologyId,
        source: &str,
        target: &str,
    ) -> Result<Option<Link>, Self::Error> {
        let inner = self.inner.read();
        let (Some(sources), Some(targets)) = (
            inner.nodes_with_address(*topology, source),
            inner.nodes_with_address(*topology, target),
        ) else {
            return Ok(None);
        };
        Ok(inner
            .links
            .values()
            .filter(|l| l.topology == *topology)
            .filter(|l| sources.contains(&l.source) && targets.contains(&l.target))
            .max_by(|a, b| {
                a.generation
                    .cmp(&b.generation)
                    .then_with(|| a.modified.cmp(&b.modified))
            })
            .cloned())
    }

    async fn links(&self, topology: &TopologyId, generation: GenerationId) -> Result<Vec<Link>, Self::Error> {
        let inner = self.inner.read();
        let mut links: Vec<Link> = inner
            .links
            .values()
            .filter(|l| l.topology == *topology && l.generation == generation)
            .cloned()
            .collect();
        links.sort_by(|a, b| {
            inner
                .primary_of(&a.source)
                .cmp(inner.primary_of(&b.source))
                .then_with(|| inner.primary_of(&a.target).cmp(inner.primary_of(&b.target)))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(links)
    }

    async fn save_link(&self, link: &Link) -> Result<(), Self::Error> {
        let mut inner = self.inner.write();
        for endpoint in [link.source, link.target] {
            if !inner.nodes.contains_key(&endpoint) {
                return Err(InMemoryError::NodeNotFound(endpoint));
            }
        }
        if !inner.generations.contains_key(&link.generation) {
            return Err(InMemoryError::GenerationNotFound(link.generation));
        }
        inner.links.insert(link.id, link.clone());
        Ok(())
    }
}
