//! Integration tests for update cycles.
//!
//! These tests drive [`TopologyUpdater`] end to end:
//! 1. Fetch and reconcile through the in-memory store
//! 2. Failure handling (fetch errors, timeouts)
//! 3. Serialized concurrent updates
//! 4. NetJSON input and output

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use topology_history::netjson::{self, NETWORK_GRAPH};
use topology_history::{
    FetchError, GraphSnapshot, GraphStore, HistoryConfig, InMemoryGraphStore, LinkKeyMode,
    NetJsonFetcher, SnapshotLink, SnapshotNode, StaticFetcher, Topology, TopologyUpdater,
    UpdateError, UpdaterConfig,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn chain(n: usize, cost: f64) -> GraphSnapshot {
    let mut builder = GraphSnapshot::builder("BATMAN", "2021.1", "TQ");
    for i in 1..=n {
        builder.add_node(SnapshotNode::new(format!("10.1.0.{i}")));
        if i > 1 {
            builder.add_link(SnapshotLink::new(
                format!("10.1.0.{}", i - 1),
                format!("10.1.0.{i}"),
                cost,
            ));
        }
    }
    builder.build()
}

fn static_updater(
    config: UpdaterConfig,
    fetcher: StaticFetcher,
) -> (
    Arc<InMemoryGraphStore>,
    Arc<StaticFetcher>,
    Topology,
    TopologyUpdater<InMemoryGraphStore, StaticFetcher>,
) {
    let store = Arc::new(InMemoryGraphStore::new());
    let fetcher = Arc::new(fetcher);
    let topology = Topology::new("backbone", "netjson", "mem://backbone");
    store.add_topology(topology.clone());
    let updater = TopologyUpdater::new(Arc::clone(&store), Arc::clone(&fetcher), config);
    (store, fetcher, topology, updater)
}

// ─────────────────────────────────────────────────────────────────────────────
// Update Cycles
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cost_change_updates_links_in_place() {
    let (store, fetcher, topology, updater) =
        static_updater(UpdaterConfig::default(), StaticFetcher::new());
    fetcher.set("mem://backbone", chain(4, 1.0));
    updater.update(&topology.id).await.unwrap();

    fetcher.set("mem://backbone", chain(4, 2.5));
    let outcome = updater.update(&topology.id).await.unwrap();
    assert_eq!(outcome.diff.changed_links, 3);
    assert_eq!(outcome.applied.links_updated, 3);
    assert_eq!(outcome.counts().links_written, 3);
    assert_eq!(store.num_links(), 3);

    let link = store
        .find_link(&topology.id, "10.1.0.1", "10.1.0.2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(link.cost, 2.5);
}

#[tokio::test]
async fn test_growing_topology_adds_rows() {
    let (store, fetcher, topology, updater) =
        static_updater(UpdaterConfig::default(), StaticFetcher::new());
    fetcher.set("mem://backbone", chain(3, 1.0));
    updater.update(&topology.id).await.unwrap();

    fetcher.set("mem://backbone", chain(5, 1.0));
    let outcome = updater.update(&topology.id).await.unwrap();
    assert_eq!(outcome.diff.added_nodes, 2);
    assert_eq!(outcome.diff.added_links, 2);
    assert_eq!(store.num_nodes(), 5);
    assert_eq!(store.num_links(), 4);
    assert!(outcome.applied.is_clean());
}

#[tokio::test]
async fn test_fetch_failure_leaves_history_untouched() {
    let (store, fetcher, topology, updater) =
        static_updater(UpdaterConfig::new(HistoryConfig::versioned(5)), StaticFetcher::new());
    fetcher.set("mem://backbone", chain(3, 1.0));
    let first = updater.update(&topology.id).await.unwrap();

    fetcher.fail("mem://backbone", FetchError::Network("connection refused".to_string()));
    let err = updater.update(&topology.id).await.unwrap_err();
    assert!(matches!(err, UpdateError::Fetch(FetchError::Network(_))));

    let generations = store.list_generations(&topology.id).await.unwrap();
    assert_eq!(generations.len(), 1);
    assert_eq!(generations[0].id, first.generation);
    assert_eq!(store.num_links(), 2);
}

#[tokio::test]
async fn test_timeout_creates_no_generation() {
    let config = UpdaterConfig::default().with_fetch_timeout(Duration::from_millis(10));
    let (store, fetcher, topology, updater) =
        static_updater(config, StaticFetcher::new().with_delay(Duration::from_millis(300)));
    fetcher.set("mem://backbone", chain(3, 1.0));

    let err = updater.update(&topology.id).await.unwrap_err();
    assert!(matches!(err, UpdateError::Fetch(FetchError::Timeout(_))));
    assert_eq!(store.num_generations(), 0);
    assert_eq!(store.num_nodes(), 0);
}

#[tokio::test]
async fn test_concurrent_updates_are_serialized() {
    let (store, fetcher, topology, updater) = static_updater(
        UpdaterConfig::default(),
        StaticFetcher::new().with_delay(Duration::from_millis(50)),
    );
    fetcher.set("mem://backbone", chain(3, 1.0));

    let (a, b) = tokio::join!(updater.update(&topology.id), updater.update(&topology.id));
    let (a, b) = (a.unwrap(), b.unwrap());

    // The second cycle diffs against what the first one wrote.
    let added: Vec<usize> = [a.diff.added_links, b.diff.added_links].to_vec();
    assert!(added.contains(&2));
    assert!(added.contains(&0));
    assert_eq!(store.num_nodes(), 3);
    assert_eq!(store.num_links(), 2);
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn test_topologies_are_independent() {
    let (store, fetcher, topology, updater) =
        static_updater(UpdaterConfig::new(HistoryConfig::versioned(1)), StaticFetcher::new());
    let other = Topology::new("edge", "netjson", "mem://edge");
    store.add_topology(other.clone());
    fetcher.set("mem://backbone", chain(3, 1.0));
    fetcher.set("mem://edge", chain(2, 1.0));

    for _ in 0..3 {
        let results = updater.update_all().await.unwrap();
        assert!(results.iter().all(|(_, r)| r.is_ok()));
    }

    assert_eq!(store.list_generations(&topology.id).await.unwrap().len(), 1);
    assert_eq!(store.list_generations(&other.id).await.unwrap().len(), 1);
    assert_eq!(store.num_links(), 3);
}

// ─────────────────────────────────────────────────────────────────────────────
// NetJSON
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_netjson_file_roundtrip() {
    let document = json!({
        "type": "NetworkGraph",
        "protocol": "OLSR",
        "version": "0.8",
        "revision": "0.8.8",
        "metric": "ETX",
        "nodes": [
            {"id": "10.150.0.3", "label": "core", "local_addresses": ["172.16.40.3"]},
            {"id": "10.150.0.4", "properties": {"hostname": "roof"}}
        ],
        "links": [
            {"source": "10.150.0.3", "target": "10.150.0.4", "cost": 1.0, "cost_text": "1.0"},
            {"source": "10.150.0.4", "target": "10.150.0.5", "cost": 2.0}
        ]
    });
    let path = std::env::temp_dir().join(format!("netjson-{}.json", uuid::Uuid::new_v4()));
    std::fs::write(&path, document.to_string()).unwrap();

    let store = Arc::new(InMemoryGraphStore::new());
    let topology = Topology::new("olsr", "netjson", format!("file://{}", path.display()));
    store.add_topology(topology.clone());
    let fetcher = Arc::new(NetJsonFetcher::new(LinkKeyMode::Undirected));
    let config = UpdaterConfig::new(HistoryConfig::in_place().with_link_key(LinkKeyMode::Undirected));
    let updater = TopologyUpdater::new(Arc::clone(&store), fetcher, config);

    let outcome = updater.update(&topology.id).await.unwrap();
    assert_eq!(outcome.diff.added_nodes, 3);
    assert_eq!(outcome.diff.added_links, 2);

    let saved = store.get_topology(&topology.id).await.unwrap().unwrap();
    assert_eq!(saved.revision, "0.8.8");

    let graph = netjson::serialize(store.as_ref(), &saved, None).await.unwrap();
    assert_eq!(graph.kind, NETWORK_GRAPH);
    assert_eq!(graph.revision.as_deref(), Some("0.8.8"));
    let ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, ["10.150.0.3", "10.150.0.4", "10.150.0.5"]);
    assert_eq!(graph.nodes[0].local_addresses, ["172.16.40.3"]);
    assert_eq!(graph.links.len(), 2);
    assert!(graph
        .links
        .iter()
        .all(|l| l.properties.get("status") == Some(&json!("up"))));

    // Re-fetching the same file changes nothing.
    let again = updater.update(&topology.id).await.unwrap();
    assert_eq!(again.applied.writes(), 0);

    std::fs::remove_file(&path).unwrap();
}
