//! Persisted topology links and link matching keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::generation::GenerationId;
use super::node::{Node, NodeId};
use super::properties::Properties;
use super::snapshot::SnapshotLink;
use super::topology::TopologyId;
use super::validation::ValidationError;

/// Store identity of a link row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkId(Uuid);

impl LinkId {
    /// Create a new LinkId from a UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Generate a new random LinkId.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operational status of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    /// Present in the latest fetch.
    Up,
    /// Absent from the latest fetch; kept for history.
    Down,
}

impl LinkStatus {
    /// Parse status from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            _ => None,
        }
    }

    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self::Up
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether link identity depends on direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKeyMode {
    /// `(a, b)` and `(b, a)` are different links.
    Directed,
    /// `(a, b)` and `(b, a)` are the same link.
    Undirected,
}

impl LinkKeyMode {
    /// Parse mode from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "directed" | "ordered" => Some(Self::Directed),
            "undirected" | "unordered" => Some(Self::Undirected),
            _ => None,
        }
    }
}

impl Default for LinkKeyMode {
    fn default() -> Self {
        Self::Directed
    }
}

/// Matching key of a link across snapshots: its endpoint addresses.
///
/// Implements `Ord` for deterministic ordering: (source, target).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkKey {
    /// Source primary address.
    pub source: String,
    /// Target primary address.
    pub target: String,
}

impl LinkKey {
    /// Build a key; undirected keys put the smaller address first.
    pub fn new(source: &str, target: &str, mode: LinkKeyMode) -> Self {
        let (source, target) = match mode {
            LinkKeyMode::Undirected if target < source => (target, source),
            _ => (source, target),
        };
        Self {
            source: source.to_string(),
            target: target.to_string(),
        }
    }
}

impl fmt::Display for LinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

/// A link row between two nodes of the same topology and generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Store identity.
    pub id: LinkId,
    /// Owning topology.
    pub topology: TopologyId,
    /// Generation that produced or last confirmed this row.
    pub generation: GenerationId,
    /// Source node.
    pub source: NodeId,
    /// Target node.
    pub target: NodeId,
    /// Link weight.
    pub cost: f64,
    /// Human-readable cost.
    pub cost_text: Option<String>,
    /// Up when present in the latest fetch.
    pub status: LinkStatus,
    /// Free-form properties.
    pub properties: Properties,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Last modification time.
    pub modified: DateTime<Utc>,
}

impl Link {
    /// Create an up link with empty properties.
    pub fn new(
        topology: TopologyId,
        generation: GenerationId,
        source: NodeId,
        target: NodeId,
        cost: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: LinkId::random(),
            topology,
            generation,
            source,
            target,
            cost,
            cost_text: None,
            status: LinkStatus::Up,
            properties: Properties::new(),
            created: now,
            modified: now,
        }
    }

    /// Build a link row from a snapshot link between resolved nodes.
    pub fn from_snapshot(
        topology: TopologyId,
        generation: GenerationId,
        source: NodeId,
        target: NodeId,
        link: &SnapshotLink,
    ) -> Self {
        let mut row = Self::new(topology, generation, source, target, link.cost);
        row.cost_text = link.cost_text.clone();
        row.properties = link.properties.clone();
        row
    }

    /// True when cost, cost text and properties equal the snapshot link's.
    pub fn matches_snapshot(&self, link: &SnapshotLink) -> bool {
        self.cost == link.cost
            && self.cost_text == link.cost_text
            && self.properties == link.properties
    }

    /// Copy cost, cost text and properties from a snapshot link.
    pub fn merge_snapshot(&mut self, link: &SnapshotLink) {
        self.cost = link.cost;
        self.cost_text = link.cost_text.clone();
        self.properties = link.properties.clone();
    }

    /// Validate row-level invariants (raw identity self-loop, finite cost).
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.source == self.target {
            return Err(ValidationError::SelfLink(self.source.to_string()));
        }
        if !self.cost.is_finite() {
            return Err(ValidationError::InvalidCost(self.cost));
        }
        Ok(())
    }

    /// Validate against the resolved endpoint nodes.
    ///
    /// Two distinct rows sharing a primary address are still a self-link.
    pub fn validate_endpoints(&self, source: &Node, target: &Node) -> Result<(), ValidationError> {
        self.validate()?;
        if source.primary_address() == target.primary_address() {
            return Err(ValidationError::SelfLink(source.primary_address().to_string()));
        }
        for node in [source, target] {
            if node.topology != self.topology {
                return Err(ValidationError::TopologyMismatch(node.primary_address().to_string()));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({}, {})", self.source, self.target, self.cost, self.status)
    }
}
