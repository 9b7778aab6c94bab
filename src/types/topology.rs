//! Topology records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::snapshot::GraphSnapshot;

/// Unique identifier for a topology.
///
/// Wraps a UUID and implements `Ord` for deterministic ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TopologyId(Uuid);

impl TopologyId {
    /// Create a new TopologyId from a UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Create a new TopologyId from a UUID string.
    pub fn from_str(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Generate a new random TopologyId.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TopologyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TopologyId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A monitored network topology.
///
/// `protocol`, `version`, `revision` and `metric` are descriptive and are
/// refreshed from each successfully applied snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    /// Unique topology identifier.
    pub id: TopologyId,
    /// Display label.
    pub label: String,
    /// Format identifier handed to the fetcher (e.g. `netjson`).
    pub parser: String,
    /// Location the fetcher reads the topology from.
    pub url: String,
    /// Routing protocol name.
    pub protocol: String,
    /// Routing protocol version.
    pub version: String,
    /// Routing protocol revision.
    pub revision: String,
    /// Metric used for link costs.
    pub metric: String,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Last modification time.
    pub modified: DateTime<Utc>,
}

impl Topology {
    /// Create a topology with empty descriptive metadata.
    pub fn new(label: impl Into<String>, parser: impl Into<String>, url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TopologyId::random(),
            label: label.into(),
            parser: parser.into(),
            url: url.into(),
            protocol: String::new(),
            version: String::new(),
            revision: String::new(),
            metric: String::new(),
            created: now,
            modified: now,
        }
    }

    /// Use a fixed identifier.
    pub fn with_id(mut self, id: TopologyId) -> Self {
        self.id = id;
        self
    }

    /// Copy descriptive metadata from a fetched snapshot.
    ///
    /// Returns true if any field changed.
    pub fn refresh_metadata(&mut self, snapshot: &GraphSnapshot) -> bool {
        let revision = snapshot.revision().unwrap_or_default();
        let changed = self.protocol != snapshot.protocol()
            || self.version != snapshot.version()
            || self.metric != snapshot.metric()
            || self.revision != revision;
        if changed {
            self.protocol = snapshot.protocol().to_string();
            self.version = snapshot.version().to_string();
            self.metric = snapshot.metric().to_string();
            self.revision = revision.to_string();
            self.modified = Utc::now();
        }
        changed
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.label, self.parser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_metadata() {
        let mut topology = Topology::new("mesh", "netjson", "file:///tmp/mesh.json");
        let snapshot = GraphSnapshot::builder("OLSR", "0.8", "ETX").revision("abc").build();

        assert!(topology.refresh_metadata(&snapshot));
        assert_eq!(topology.protocol, "OLSR");
        assert_eq!(topology.revision, "abc");
        assert!(!topology.refresh_metadata(&snapshot));
    }

    #[test]
    fn test_id_roundtrip_from_str() {
        let id = TopologyId::random();
        assert_eq!(TopologyId::from_str(&id.to_string()).unwrap(), id);
        assert!(TopologyId::from_str("not-a-uuid").is_err());
    }
}
