//! Graph storage backends.
//!
//! Layout: Topology(1) → Generation(N) → {Node, Link}. Node addresses are
//! indexed one row per address, so "any address matches the node" lookups
//! never scan joined address strings.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{Generation, GenerationId, Link, Node, NodeId, Topology, TopologyId};

/// Rows removed by a cascading generation delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DeletedRows {
    /// Node rows removed.
    pub nodes: usize,
    /// Link rows removed.
    pub links: usize,
}

/// Trait for graph storage backends.
///
/// Implementations must guarantee deterministic ordering of results.
/// All methods are async to support async database access.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch a topology by ID.
    async fn get_topology(&self, id: &TopologyId) -> Result<Option<Topology>, Self::Error>;

    /// All topologies, ordered by label then ID.
    async fn list_topologies(&self) -> Result<Vec<Topology>, Self::Error>;

    /// Insert or update a topology.
    async fn save_topology(&self, topology: &Topology) -> Result<(), Self::Error>;

    /// Open a new generation for a topology.
    async fn create_generation(
        &self,
        topology: &TopologyId,
        timestamp: DateTime<Utc>,
        snapshot_hash: Option<String>,
    ) -> Result<Generation, Self::Error>;

    /// Generations of a topology, oldest first (timestamp, then ID).
    async fn list_generations(&self, topology: &TopologyId) -> Result<Vec<Generation>, Self::Error>;

    /// Most recent generation of a topology.
    async fn latest_generation(&self, topology: &TopologyId) -> Result<Option<Generation>, Self::Error> {
        Ok(self.list_generations(topology).await?.pop())
    }

    /// Delete a generation together with the nodes and links it owns.
    async fn delete_generation(&self, id: GenerationId) -> Result<DeletedRows, Self::Error>;

    /// Fetch a node by ID.
    async fn get_node(&self, id: &NodeId) -> Result<Option<Node>, Self::Error>;

    /// Node of a generation having `address` among its addresses.
    ///
    /// A node whose primary address matches is preferred over alias matches.
    async fn find_node_by_address(
        &self,
        topology: &TopologyId,
        address: &str,
        generation: GenerationId,
    ) -> Result<Option<Node>, Self::Error>;

    /// Number of nodes, across all generations, having `address` among their addresses.
    async fn count_nodes_with_address(
        &self,
        topology: &TopologyId,
        address: &str,
    ) -> Result<usize, Self::Error>;

    /// Nodes of a generation, ordered by primary address then ID.
    async fn nodes(&self, topology: &TopologyId, generation: GenerationId) -> Result<Vec<Node>, Self::Error>;

    /// Insert or update a node and its address index.
    async fn save_node(&self, node: &Node) -> Result<(), Self::Error>;

    /// Link whose endpoints carry `source` and `target` addresses, in any generation.
    ///
    /// When several generations hold one, the most recent wins.
    async fn find_link(
        &self,
        topology: &TopologyId,
        source: &str,
        target: &str,
    ) -> Result<Option<Link>, Self::Error>;

    /// Links of a generation, ordered by (source address, target address).
    async fn links(&self, topology: &TopologyId, generation: GenerationId) -> Result<Vec<Link>, Self::Error>;

    /// Insert or update a link. Both endpoint nodes must already exist.
    async fn save_link(&self, link: &Link) -> Result<(), Self::Error>;

    /// Check if the backend is reachable.
    async fn is_healthy(&self) -> bool {
        true
    }
}

pub use memory::InMemoryGraphStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresGraphStore;
