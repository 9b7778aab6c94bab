//! Immutable graph snapshots.
//!
//! A `GraphSnapshot` is the normalized form of one fetch: nodes keyed by
//! primary address, links keyed by `(source, target)` address pair. It is
//! the only input the diff engine understands, whether it came from a
//! fetcher or was rebuilt from stored rows.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

use super::address::{is_single_address, AddressList};
use super::link::{LinkKey, LinkKeyMode};
use super::properties::{deserialize_properties, Properties};
use crate::canonical::canonical_hash_hex;
use crate::TOPOLOGY_HISTORY_SCHEMA_VERSION;

/// A node as reported by one fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    /// Primary address.
    pub id: String,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Alias addresses.
    #[serde(default)]
    pub local_addresses: Vec<String>,
    /// Free-form properties.
    #[serde(default, deserialize_with = "deserialize_properties")]
    pub properties: Properties,
}

impl SnapshotNode {
    /// Create a node with only a primary address.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            local_addresses: Vec::new(),
            properties: Properties::new(),
        }
    }

    /// Set the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the alias addresses.
    pub fn with_local_addresses(mut self, addresses: Vec<String>) -> Self {
        self.local_addresses = addresses;
        self
    }

    /// Add one property.
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// A link as reported by one fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotLink {
    /// Source primary address.
    pub source: String,
    /// Target primary address.
    pub target: String,
    /// Link weight.
    pub cost: f64,
    /// Human-readable cost.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_text: Option<String>,
    /// Free-form properties.
    #[serde(default, deserialize_with = "deserialize_properties")]
    pub properties: Properties,
}

impl SnapshotLink {
    /// Create a link with the given cost.
    pub fn new(source: impl Into<String>, target: impl Into<String>, cost: f64) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            cost,
            cost_text: None,
            properties: Properties::new(),
        }
    }

    /// Set the human-readable cost.
    pub fn with_cost_text(mut self, text: impl Into<String>) -> Self {
        self.cost_text = Some(text.into());
        self
    }

    /// Add one property.
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Matching key under the given mode.
    pub fn key(&self, mode: LinkKeyMode) -> LinkKey {
        LinkKey::new(&self.source, &self.target, mode)
    }
}

/// Normalized topology at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSnapshot {
    protocol: String,
    version: String,
    revision: Option<String>,
    metric: String,
    link_key: LinkKeyMode,
    nodes: BTreeMap<String, SnapshotNode>,
    links: BTreeMap<LinkKey, SnapshotLink>,
}

impl GraphSnapshot {
    /// Start building a snapshot.
    pub fn builder(
        protocol: impl Into<String>,
        version: impl Into<String>,
        metric: impl Into<String>,
    ) -> SnapshotBuilder {
        SnapshotBuilder {
            protocol: protocol.into(),
            version: version.into(),
            revision: None,
            metric: metric.into(),
            link_key: LinkKeyMode::default(),
            nodes: Vec::new(),
            links: Vec::new(),
        }
    }

    /// A snapshot with no metadata and no elements.
    pub fn empty() -> Self {
        Self::builder("", "", "").build()
    }

    /// Same metadata and key mode as `other`, but no nodes or links.
    ///
    /// Used as the diff baseline in versioned mode.
    pub fn empty_like(other: &GraphSnapshot) -> Self {
        Self {
            protocol: other.protocol.clone(),
            version: other.version.clone(),
            revision: other.revision.clone(),
            metric: other.metric.clone(),
            link_key: other.link_key,
            nodes: BTreeMap::new(),
            links: BTreeMap::new(),
        }
    }

    /// Routing protocol.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Protocol version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Protocol revision, if reported.
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    /// Cost metric.
    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// How link keys were built.
    pub fn link_key_mode(&self) -> LinkKeyMode {
        self.link_key
    }

    /// Nodes ordered by primary address.
    pub fn nodes(&self) -> impl Iterator<Item = &SnapshotNode> {
        self.nodes.values()
    }

    /// Links ordered by key.
    pub fn links(&self) -> impl Iterator<Item = (&LinkKey, &SnapshotLink)> {
        self.links.iter()
    }

    /// Look up a node by primary address.
    pub fn node(&self, address: &str) -> Option<&SnapshotNode> {
        self.nodes.get(address)
    }

    /// Look up a link by key.
    pub fn link(&self, key: &LinkKey) -> Option<&SnapshotLink> {
        self.links.get(key)
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of links.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// True when there are no nodes and no links.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }

    /// Re-key links under `mode`.
    ///
    /// When two links collapse onto one key the one whose old key sorts
    /// last wins.
    pub fn with_link_key(mut self, mode: LinkKeyMode) -> Self {
        if mode == self.link_key {
            return self;
        }
        let links = std::mem::take(&mut self.links);
        self.links = links.into_values().map(|link| (link.key(mode), link)).collect();
        self.link_key = mode;
        self
    }

    /// Content fingerprint (xxh64 hex) over metadata, nodes and links.
    ///
    /// Independent of insertion order.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        let input = FingerprintInput {
            schema_version: TOPOLOGY_HISTORY_SCHEMA_VERSION,
            protocol: &self.protocol,
            version: &self.version,
            revision: self.revision.as_deref(),
            metric: &self.metric,
            nodes: self.nodes.values().collect(),
            links: self.links.values().collect(),
        };
        canonical_hash_hex(&input)
    }
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    schema_version: &'a str,
    protocol: &'a str,
    version: &'a str,
    revision: Option<&'a str>,
    metric: &'a str,
    nodes: Vec<&'a SnapshotNode>,
    links: Vec<&'a SnapshotLink>,
}

/// Builder for [`GraphSnapshot`].
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    protocol: String,
    version: String,
    revision: Option<String>,
    metric: String,
    link_key: LinkKeyMode,
    nodes: Vec<SnapshotNode>,
    links: Vec<SnapshotLink>,
}

impl SnapshotBuilder {
    /// Set the protocol revision.
    pub fn revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// Set the link key mode.
    pub fn link_key(mut self, mode: LinkKeyMode) -> Self {
        self.link_key = mode;
        self
    }

    /// Add a node.
    pub fn node(mut self, node: SnapshotNode) -> Self {
        self.add_node(node);
        self
    }

    /// Add a link.
    pub fn link(mut self, link: SnapshotLink) -> Self {
        self.add_link(link);
        self
    }

    /// Add a node in place.
    pub fn add_node(&mut self, node: SnapshotNode) {
        self.nodes.push(node);
    }

    /// Add a link in place.
    pub fn add_link(&mut self, link: SnapshotLink) {
        self.links.push(link);
    }

    /// Finish the snapshot.
    ///
    /// - the first node declared for an address wins
    /// - the last link declared for a key wins
    /// - link endpoints with no declared node get an implicit bare node
    /// - local addresses are split, deduplicated and stripped of the primary
    /// - node IDs or endpoints that are not a single address, and links with a
    ///   non-finite cost, are dropped with a warning
    pub fn build(self) -> GraphSnapshot {
        let mut nodes: BTreeMap<String, SnapshotNode> = BTreeMap::new();
        for mut node in self.nodes {
            node.id = node.id.trim().to_string();
            if node.id.is_empty() {
                continue;
            }
            if !is_single_address(&node.id) {
                warn!(address = %node.id, "Malformed node address, node dropped");
                continue;
            }
            node.local_addresses = AddressList::from_parts(&node.id, &node.local_addresses)
                .local_addresses()
                .to_vec();
            nodes.entry(node.id.clone()).or_insert(node);
        }

        let mut links: BTreeMap<LinkKey, SnapshotLink> = BTreeMap::new();
        for mut link in self.links {
            link.source = link.source.trim().to_string();
            link.target = link.target.trim().to_string();
            if link.source.is_empty() || link.target.is_empty() {
                continue;
            }
            if !is_single_address(&link.source) || !is_single_address(&link.target) {
                warn!(source = %link.source, target = %link.target, "Malformed link endpoint, link dropped");
                continue;
            }
            if !link.cost.is_finite() {
                warn!(source = %link.source, target = %link.target, cost = link.cost, "Non-finite link cost, link dropped");
                continue;
            }
            for endpoint in [&link.source, &link.target] {
                if !nodes.contains_key(endpoint) {
                    nodes.insert(endpoint.clone(), SnapshotNode::new(endpoint.clone()));
                }
            }
            links.insert(link.key(self.link_key), link);
        }

        GraphSnapshot {
            protocol: self.protocol,
            version: self.version,
            revision: self.revision,
            metric: self.metric,
            link_key: self.link_key,
            nodes,
            links,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> SnapshotBuilder {
        GraphSnapshot::builder("OLSR", "0.8", "ETX")
            .node(SnapshotNode::new("a"))
            .node(SnapshotNode::new("b"))
            .link(SnapshotLink::new("a", "b", 1.0))
    }

    #[test]
    fn test_implicit_nodes() {
        let snapshot = sample().link(SnapshotLink::new("b", "c", 2.0)).build();
        assert_eq!(snapshot.node_count(), 3);
        assert!(snapshot.node("c").is_some());
        assert_eq!(snapshot.link_count(), 2);
    }

    #[test]
    fn test_first_node_wins_last_link_wins() {
        let snapshot = sample()
            .node(SnapshotNode::new("a").with_label("dup"))
            .link(SnapshotLink::new("a", "b", 5.0))
            .build();
        assert_eq!(snapshot.node("a").unwrap().label, None);
        let key = LinkKey::new("a", "b", LinkKeyMode::Directed);
        assert_eq!(snapshot.link(&key).unwrap().cost, 5.0);
    }

    #[test]
    fn test_undirected_collapses_reverse_links() {
        let snapshot = sample()
            .link_key(LinkKeyMode::Undirected)
            .link(SnapshotLink::new("b", "a", 3.0))
            .build();
        assert_eq!(snapshot.link_count(), 1);
    }

    #[test]
    fn test_fingerprint_order_independent() {
        let s1 = sample().link(SnapshotLink::new("b", "c", 2.0)).build();
        let s2 = GraphSnapshot::builder("OLSR", "0.8", "ETX")
            .link(SnapshotLink::new("b", "c", 2.0))
            .node(SnapshotNode::new("b"))
            .link(SnapshotLink::new("a", "b", 1.0))
            .node(SnapshotNode::new("a"))
            .build();
        assert_eq!(s1.fingerprint().unwrap(), s2.fingerprint().unwrap());
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let s1 = sample().build();
        let s2 = sample()
            .node(SnapshotNode::new("z").with_property("k", json!(1)))
            .build();
        assert_ne!(s1.fingerprint().unwrap(), s2.fingerprint().unwrap());
    }

    #[test]
    fn test_rekey_to_undirected() {
        let snapshot = GraphSnapshot::builder("OLSR", "0.8", "ETX")
            .link(SnapshotLink::new("b", "a", 1.0))
            .link(SnapshotLink::new("c", "d", 1.0))
            .build()
            .with_link_key(LinkKeyMode::Undirected);
        assert_eq!(snapshot.link_key_mode(), LinkKeyMode::Undirected);
        let key = LinkKey::new("a", "b", LinkKeyMode::Undirected);
        assert_eq!(snapshot.link(&key).map(|l| l.source.as_str()), Some("b"));
        assert_eq!(snapshot.link_count(), 2);
    }

    #[test]
    fn test_malformed_addresses_dropped() {
        let snapshot = GraphSnapshot::builder("OLSR", "0.8", "ETX")
            .node(SnapshotNode::new("10.0.0.1;10.0.0.2"))
            .node(SnapshotNode::new("a b"))
            .link(SnapshotLink::new("a,b", "c", 1.0))
            .link(SnapshotLink::new("c", "d", 1.0))
            .build();
        assert_eq!(snapshot.node_count(), 2);
        assert!(snapshot.node("c").is_some());
        assert_eq!(snapshot.link_count(), 1);
    }

    #[test]
    fn test_non_finite_cost_dropped() {
        let snapshot = sample()
            .link(SnapshotLink::new("b", "c", f64::NAN))
            .link(SnapshotLink::new("c", "d", f64::INFINITY))
            .build();
        assert_eq!(snapshot.link_count(), 1);
        assert!(snapshot.node("c").is_none());
    }

    #[test]
    fn test_local_addresses_normalized() {
        let snapshot = GraphSnapshot::builder("OLSR", "0.8", "ETX")
            .node(SnapshotNode::new("a").with_local_addresses(vec!["x; y".to_string(), "a".to_string()]))
            .build();
        assert_eq!(snapshot.node("a").unwrap().local_addresses, ["x", "y"]);
    }

    #[test]
    fn test_empty_like_keeps_metadata() {
        let s = sample().revision("r1").build();
        let empty = GraphSnapshot::empty_like(&s);
        assert!(empty.is_empty());
        assert_eq!(empty.protocol(), "OLSR");
        assert_eq!(empty.revision(), Some("r1"));
    }
}
