//! NetJSON `NetworkGraph` documents.
//!
//! Two directions:
//! - parsing: a fetched `NetworkGraph` document becomes a [`GraphSnapshot`]
//! - serialization: a stored generation becomes a `NetworkGraph` for the
//!   read API, with link status and timestamps folded into `properties`

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;

use crate::store::GraphStore;
use crate::types::properties::deserialize_properties;
use crate::types::{
    GenerationId, GraphSnapshot, LinkKeyMode, NodeId, Properties, SnapshotLink, SnapshotNode,
    Topology,
};

/// `type` of a graph document.
pub const NETWORK_GRAPH: &str = "NetworkGraph";

/// `type` of a collection document.
pub const NETWORK_COLLECTION: &str = "NetworkCollection";

/// Error type for NetJSON parsing.
#[derive(Debug, thiserror::Error)]
pub enum NetJsonError {
    /// Malformed JSON or missing required fields.
    #[error("Invalid NetJSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The document is not a `NetworkGraph`.
    #[error("Expected type NetworkGraph, got {0:?}")]
    WrongType(String),
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A NetJSON node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetJsonNode {
    /// Primary address.
    pub id: String,
    /// Display label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Secondary addresses.
    #[serde(default, deserialize_with = "null_as_default")]
    pub local_addresses: Vec<String>,
    /// Free-form properties.
    #[serde(default, deserialize_with = "deserialize_properties")]
    pub properties: Properties,
}

/// A NetJSON link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetJsonLink {
    /// Source address.
    pub source: String,
    /// Target address.
    pub target: String,
    /// Link metric value.
    pub cost: f64,
    /// Human-readable cost.
    #[serde(default)]
    pub cost_text: Option<String>,
    /// Free-form properties.
    #[serde(default, deserialize_with = "deserialize_properties")]
    pub properties: Properties,
}

/// A NetJSON `NetworkGraph` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkGraph {
    /// Always `NetworkGraph`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Routing protocol.
    #[serde(default, deserialize_with = "null_as_default")]
    pub protocol: String,
    /// Protocol implementation version.
    #[serde(default, deserialize_with = "null_as_default")]
    pub version: String,
    /// Protocol revision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Cost metric.
    #[serde(default, deserialize_with = "null_as_default")]
    pub metric: String,
    /// Topology label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Topology ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Parser the topology is fetched with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parser: Option<String>,
    /// Topology creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    /// Topology modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    /// Nodes.
    #[serde(default, deserialize_with = "null_as_default")]
    pub nodes: Vec<NetJsonNode>,
    /// Links.
    #[serde(default, deserialize_with = "null_as_default")]
    pub links: Vec<NetJsonLink>,
}

impl NetworkGraph {
    /// Parse a document.
    pub fn from_json_str(input: &str) -> Result<Self, NetJsonError> {
        let graph: NetworkGraph = serde_json::from_str(input)?;
        if graph.kind != NETWORK_GRAPH {
            return Err(NetJsonError::WrongType(graph.kind));
        }
        Ok(graph)
    }

    /// Convert into a snapshot keyed by `link_key`.
    ///
    /// Undeclared link endpoints become bare nodes. Duplicate node ids keep
    /// the first entry; duplicate link keys keep the last.
    pub fn into_snapshot(self, link_key: LinkKeyMode) -> GraphSnapshot {
        let mut builder = GraphSnapshot::builder(self.protocol, self.version, self.metric).link_key(link_key);
        if let Some(revision) = self.revision.filter(|r| !r.is_empty()) {
            builder = builder.revision(revision);
        }
        for node in self.nodes {
            builder.add_node(SnapshotNode {
                id: node.id,
                label: node.label,
                local_addresses: node.local_addresses,
                properties: node.properties,
            });
        }
        for link in self.links {
            builder.add_link(SnapshotLink {
                source: link.source,
                target: link.target,
                cost: link.cost,
                cost_text: link.cost_text,
                properties: link.properties,
            });
        }
        builder.build()
    }
}

/// Parse a document straight into a snapshot.
pub fn parse_snapshot(input: &str, link_key: LinkKeyMode) -> Result<GraphSnapshot, NetJsonError> {
    Ok(NetworkGraph::from_json_str(input)?.into_snapshot(link_key))
}

/// A NetJSON `NetworkCollection` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkCollection {
    /// Always `NetworkCollection`.
    #[serde(rename = "type")]
    pub kind: String,
    /// One graph per topology.
    pub collection: Vec<NetworkGraph>,
}

/// Serialize a topology's stored graph.
///
/// `generation` defaults to the latest one. A topology with no generation
/// yet serializes with empty `nodes` and `links`.
pub async fn serialize<S: GraphStore>(
    store: &S,
    topology: &Topology,
    generation: Option<GenerationId>,
) -> Result<NetworkGraph, S::Error> {
    let mut graph = NetworkGraph {
        kind: NETWORK_GRAPH.to_string(),
        protocol: topology.protocol.clone(),
        version: topology.version.clone(),
        revision: Some(topology.revision.clone()).filter(|r| !r.is_empty()),
        metric: topology.metric.clone(),
        label: Some(topology.label.clone()),
        id: Some(topology.id.to_string()),
        parser: Some(topology.parser.clone()),
        created: Some(topology.created),
        modified: Some(topology.modified),
        nodes: Vec::new(),
        links: Vec::new(),
    };

    let generation = match generation {
        Some(id) => id,
        None => match store.latest_generation(&topology.id).await? {
            Some(latest) => latest.id,
            None => return Ok(graph),
        },
    };

    let nodes = store.nodes(&topology.id, generation).await?;
    let mut primaries: BTreeMap<NodeId, String> = BTreeMap::new();
    for node in nodes {
        primaries.insert(node.id, node.primary_address().to_string());
        graph.nodes.push(NetJsonNode {
            id: node.primary_address().to_string(),
            label: Some(node.name().to_string()),
            local_addresses: node.local_addresses().to_vec(),
            properties: node.properties,
        });
    }

    for link in store.links(&topology.id, generation).await? {
        let source = endpoint_address(store, &primaries, &link.source).await?;
        let target = endpoint_address(store, &primaries, &link.target).await?;

        let mut properties = link.properties;
        properties.insert("status".to_string(), json!(link.status.as_str()));
        properties.insert("created".to_string(), json!(link.created));
        properties.insert("modified".to_string(), json!(link.modified));
        graph.links.push(NetJsonLink {
            source,
            target,
            cost: link.cost,
            cost_text: link.cost_text,
            properties,
        });
    }

    Ok(graph)
}

async fn endpoint_address<S: GraphStore>(
    store: &S,
    primaries: &BTreeMap<NodeId, String>,
    id: &NodeId,
) -> Result<String, S::Error> {
    if let Some(address) = primaries.get(id) {
        return Ok(address.clone());
    }
    Ok(match store.get_node(id).await? {
        Some(node) => node.primary_address().to_string(),
        None => id.to_string(),
    })
}

/// Serialize several topologies, each at its latest generation.
pub async fn serialize_collection<S: GraphStore>(
    store: &S,
    topologies: &[Topology],
) -> Result<NetworkCollection, S::Error> {
    let mut collection = Vec::with_capacity(topologies.len());
    for topology in topologies {
        collection.push(serialize(store, topology, None).await?);
    }
    Ok(NetworkCollection {
        kind: NETWORK_COLLECTION.to_string(),
        collection,
    })
}
