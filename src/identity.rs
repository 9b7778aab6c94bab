//! Identity resolution from external addresses to stored nodes.
//!
//! Snapshots name nodes by address; the store names them by `NodeId`. The
//! resolver bridges the two for one topology: any address of a node
//! (primary or alias) finds it, and an unknown address yields an unsaved
//! stub the caller completes and persists.

use crate::store::GraphStore;
use crate::types::{AddressList, GenerationId, LinkKeyMode, Link, Node, TopologyId};

/// A node found in the store, or a fresh stub.
#[derive(Debug, Clone)]
pub struct ResolvedNode {
    /// The node row.
    pub node: Node,
    /// True if the row is a stub that has not been saved.
    pub is_new: bool,
}

/// Address-to-node resolver scoped to one topology.
pub struct IdentityResolver<'a, S: GraphStore> {
    store: &'a S,
    topology: TopologyId,
}

impl<'a, S: GraphStore> IdentityResolver<'a, S> {
    /// Create a resolver for a topology.
    pub fn new(store: &'a S, topology: TopologyId) -> Self {
        Self { store, topology }
    }

    /// Topology this resolver is scoped to.
    pub fn topology(&self) -> TopologyId {
        self.topology
    }

    /// Find the node carrying `address` in `generation`, or build a stub.
    ///
    /// The stub carries `address` as its only address and belongs to
    /// `generation`; it is not saved.
    pub async fn resolve_node(&self, address: &str, generation: GenerationId) -> Result<ResolvedNode, S::Error> {
        let existing = self
            .store
            .find_node_by_address(&self.topology, address, generation)
            .await?;
        Ok(match existing {
            Some(node) => ResolvedNode { node, is_new: false },
            None => ResolvedNode {
                node: Node::new(self.topology, generation, AddressList::parse(address)),
                is_new: true,
            },
        })
    }

    /// Nodes, across all generations, carrying `address`.
    pub async fn count_nodes_with_address(&self, address: &str) -> Result<usize, S::Error> {
        self.store.count_nodes_with_address(&self.topology, address).await
    }

    /// Existing link between two addresses, in any generation.
    ///
    /// Undirected mode also accepts a link stored in the reverse direction.
    pub async fn find_link(&self, source: &str, target: &str, mode: LinkKeyMode) -> Result<Option<Link>, S::Error> {
        if let Some(link) = self.store.find_link(&self.topology, source, target).await? {
            return Ok(Some(link));
        }
        match mode {
            LinkKeyMode::Directed => Ok(None),
            LinkKeyMode::Undirected => self.store.find_link(&self.topology, target, source).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryGraphStore;
    use crate::types::Topology;
    use chrono::Utc;

    #[tokio::test]
    async fn test_resolve_existing_and_stub() {
        let store = InMemoryGraphStore::new();
        let topology = Topology::new("t", "netjson", "file:///dev/null");
        let tid = topology.id;
        store.add_topology(topology);
        let generation = store.create_generation(&tid, Utc::now(), None).await.unwrap();
        let node = Node::new(tid, generation.id, AddressList::parse("192.168.0.1;10.0.0.1"));
        store.save_node(&node).await.unwrap();

        let resolver = IdentityResolver::new(&store, tid);

        let found = resolver.resolve_node("10.0.0.1", generation.id).await.unwrap();
        assert!(!found.is_new);
        assert_eq!(found.node.id, node.id);

        let stub = resolver.resolve_node("172.16.0.9", generation.id).await.unwrap();
        assert!(stub.is_new);
        assert_eq!(stub.node.addresses.to_field(), "172.16.0.9;");
        assert_eq!(stub.node.generation, generation.id);
        assert_eq!(resolver.count_nodes_with_address("172.16.0.9").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_resolution_is_generation_scoped() {
        let store = InMemoryGraphStore::new();
        let topology = Topology::new("t", "netjson", "file:///dev/null");
        let tid = topology.id;
        store.add_topology(topology);
        let g1 = store.create_generation(&tid, Utc::now(), None).await.unwrap();
        let g2 = store.create_generation(&tid, Utc::now(), None).await.unwrap();
        store
            .save_node(&Node::new(tid, g1.id, AddressList::parse("10.0.0.1")))
            .await
            .unwrap();

        let resolver = IdentityResolver::new(&store, tid);
        assert!(resolver.resolve_node("10.0.0.1", g2.id).await.unwrap().is_new);
        assert_eq!(resolver.count_nodes_with_address("10.0.0.1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_link_undirected() {
        let store = InMemoryGraphStore::new();
        let topology = Topology::new("t", "netjson", "file:///dev/null");
        let tid = topology.id;
        store.add_topology(topology);
        let g = store.create_generation(&tid, Utc::now(), None).await.unwrap();
        let a = Node::new(tid, g.id, AddressList::parse("a"));
        let b = Node::new(tid, g.id, AddressList::parse("b"));
        store.save_node(&a).await.unwrap();
        store.save_node(&b).await.unwrap();
        store.save_link(&Link::new(tid, g.id, a.id, b.id, 1.0)).await.unwrap();

        let resolver = IdentityResolver::new(&store, tid);
        assert!(resolver.find_link("b", "a", LinkKeyMode::Directed).await.unwrap().is_none());
        assert!(resolver.find_link("b", "a", LinkKeyMode::Undirected).await.unwrap().is_some());
    }
}
