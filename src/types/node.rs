//! Persisted topology nodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::address::AddressList;
use super::generation::GenerationId;
use super::properties::Properties;
use super::snapshot::SnapshotNode;
use super::topology::TopologyId;
use super::validation::ValidationError;

/// Store identity of a node row.
///
/// Never used to match nodes across snapshots; that is the primary address's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Create a new NodeId from a UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Generate a new random NodeId.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node row tied to one topology and one history generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Store identity.
    pub id: NodeId,
    /// Owning topology.
    pub topology: TopologyId,
    /// Generation that produced or last confirmed this row.
    pub generation: GenerationId,
    /// Normalized addresses; the first is the primary address.
    pub addresses: AddressList,
    /// Optional display name.
    pub label: Option<String>,
    /// Free-form properties.
    pub properties: Properties,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Last modification time.
    pub modified: DateTime<Utc>,
}

impl Node {
    /// Create a node with no label and empty properties.
    pub fn new(topology: TopologyId, generation: GenerationId, addresses: AddressList) -> Self {
        let now = Utc::now();
        Self {
            id: NodeId::random(),
            topology,
            generation,
            addresses,
            label: None,
            properties: Properties::new(),
            created: now,
            modified: now,
        }
    }

    /// Build a node row from a snapshot node.
    pub fn from_snapshot(topology: TopologyId, generation: GenerationId, node: &SnapshotNode) -> Self {
        Self::new(
            topology,
            generation,
            AddressList::from_parts(&node.id, &node.local_addresses),
        )
        .with_label(node.label.clone())
        .with_properties(node.properties.clone())
    }

    /// Set the label. Blank labels count as unset.
    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label.filter(|l| !l.trim().is_empty());
        self
    }

    /// Set the properties.
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Primary address, or an empty string for an address-less (invalid) row.
    pub fn primary_address(&self) -> &str {
        self.addresses.primary().unwrap_or_default()
    }

    /// Addresses beyond the primary one.
    pub fn local_addresses(&self) -> &[String] {
        self.addresses.local_addresses()
    }

    /// Display name: the label when set, the primary address otherwise.
    pub fn name(&self) -> &str {
        match &self.label {
            Some(label) => label,
            None => self.primary_address(),
        }
    }

    /// Copy label, addresses and properties from a snapshot node.
    ///
    /// Returns true if anything changed.
    pub fn merge_snapshot(&mut self, node: &SnapshotNode) -> bool {
        let addresses = AddressList::from_parts(&node.id, &node.local_addresses);
        let label = node.label.clone().filter(|l| !l.trim().is_empty());
        let changed = self.addresses != addresses
            || self.label != label
            || self.properties != node.properties;
        if changed {
            self.addresses = addresses;
            self.label = label;
            self.properties = node.properties.clone();
            self.modified = Utc::now();
        }
        changed
    }

    /// Validate before persisting.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.addresses.validate()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(addresses: &str) -> Node {
        Node::new(TopologyId::random(), GenerationId::new(1), AddressList::parse(addresses))
    }

    #[test]
    fn test_name_falls_back_to_primary() {
        let mut n = node("192.168.0.1,10.0.0.1");
        assert_eq!(n.name(), "192.168.0.1");
        n.label = Some("test node".to_string());
        assert_eq!(n.name(), "test node");
    }

    #[test]
    fn test_blank_label_is_unset() {
        let n = node("192.168.0.1").with_label(Some("  ".to_string()));
        assert_eq!(n.label, None);
        assert_eq!(n.to_string(), "192.168.0.1");
    }

    #[test]
    fn test_local_addresses() {
        let n = node("192.168.0.1;10.0.0.1;10.0.0.2;");
        assert_eq!(n.local_addresses(), ["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn test_from_snapshot() {
        let snap = SnapshotNode::new("10.0.0.1")
            .with_label("gw")
            .with_local_addresses(vec!["172.16.0.1".to_string()])
            .with_property("gateway", json!(true));
        let n = Node::from_snapshot(TopologyId::random(), GenerationId::new(3), &snap);

        assert_eq!(n.addresses.to_field(), "10.0.0.1; 172.16.0.1;");
        assert_eq!(n.name(), "gw");
        assert_eq!(n.properties.get("gateway"), Some(&json!(true)));
        assert_eq!(n.generation, GenerationId::new(3));
    }

    #[test]
    fn test_merge_snapshot() {
        let mut n = node("10.0.0.1");
        let snap = SnapshotNode::new("10.0.0.1").with_property("x", json!(1));
        assert!(n.merge_snapshot(&snap));
        assert!(!n.merge_snapshot(&snap));
    }

    #[test]
    fn test_validate_empty() {
        assert_eq!(node("").validate(), Err(ValidationError::EmptyAddresses));
        assert!(node("10.0.0.1").validate().is_ok());
    }
}
