//! Axum routes for the topology service.

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::diff::DiffSummary;
use crate::fetch::{FetchError, Fetcher, NetJsonFetcher};
use crate::netjson::{self, NetworkCollection, NetworkGraph};
use crate::store::{GraphStore, PostgresGraphStore};
use crate::types::{GenerationId, Topology, TopologyId};
use crate::updater::{UpdateError, UpdateOutcome};
use crate::TOPOLOGY_HISTORY_SCHEMA_VERSION;

use super::state::{ServiceState, StoreHealth};

/// Service state used by the binary.
pub type AppState = ServiceState<PostgresGraphStore, NetJsonFetcher>;

type ApiError = (StatusCode, Json<ErrorResponse>);

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query for a topology graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphQuery {
    /// Generation to serialize instead of the latest.
    pub generation: Option<i64>,
}

/// One generation in a history listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationDto {
    /// Generation ID.
    pub id: i64,
    /// When the generation was opened.
    pub timestamp: DateTime<Utc>,
    /// Fingerprint of the fetched snapshot.
    pub snapshot_hash: Option<String>,
}

/// Generations of a topology, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// Topology ID.
    pub topology_id: String,
    /// Retained generations.
    pub generations: Vec<GenerationDto>,
}

/// A record skipped during an update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureDto {
    /// `add`, `change` or `remove`.
    pub action: String,
    /// Node addresses or `source -> target`.
    pub entity: String,
    /// Why the write was skipped.
    pub error: String,
}

/// Result of a triggered update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub topology_id: String,
    pub generation: i64,
    pub snapshot_hash: Option<String>,
    pub diff: DiffSummary,
    pub nodes_created: usize,
    pub nodes_updated: usize,
    pub nodes_skipped: usize,
    pub links_created: usize,
    pub links_updated: usize,
    pub links_unchanged: usize,
    pub failures: Vec<FailureDto>,
    /// Generations pruned after the apply.
    pub pruned_generations: Vec<i64>,
    pub metadata_changed: bool,
    pub latency_ms: u64,
}

impl From<UpdateOutcome> for UpdateResponse {
    fn from(outcome: UpdateOutcome) -> Self {
        let applied = outcome.applied;
        Self {
            topology_id: outcome.topology.to_string(),
            generation: outcome.generation.as_i64(),
            snapshot_hash: outcome.snapshot_hash,
            diff: outcome.diff,
            nodes_created: applied.nodes_created,
            nodes_updated: applied.nodes_updated,
            nodes_skipped: applied.nodes_skipped,
            links_created: applied.links_created,
            links_updated: applied.links_updated,
            links_unchanged: applied.links_unchanged,
            failures: applied
                .failures
                .into_iter()
                .map(|f| FailureDto {
                    action: f.section.action().to_string(),
                    entity: f.entity,
                    error: f.error.to_string(),
                })
                .collect(),
            pruned_generations: outcome
                .pruned
                .map(|p| p.removed_generations.iter().map(GenerationId::as_i64).collect())
                .unwrap_or_default(),
            metadata_changed: outcome.metadata_changed,
            latency_ms: outcome.latency_ms,
        }
    }
}

/// Service health response (detailed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub schema_version: String,
    /// Database connectivity status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseHealth>,
}

/// Database health information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseHealth {
    pub connected: bool,
    pub pool_size: u32,
    pub pool_idle: usize,
    pub pool_max: u32,
}

/// Simple liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub status: String,
}

/// Readiness response with dependency status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub database: bool,
    pub details: Option<String>,
}

/// Structured error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Machine-readable error code.
    pub code: String,
    /// Additional error details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response with code and message.
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    /// Add details to the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

fn store_error(e: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("STORE_ERROR", format!("Store error: {}", e))),
    )
}

fn parse_topology_id(raw: &str) -> Result<TopologyId, ApiError> {
    TopologyId::from_str(raw).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(
                ErrorResponse::new("INVALID_TOPOLOGY_ID", format!("Invalid topology ID: {}", e))
                    .with_details(raw.to_string()),
            ),
        )
    })
}

async fn load_topology<S: GraphStore>(store: &S, id: &TopologyId) -> Result<Topology, ApiError> {
    store.get_topology(id).await.map_err(store_error)?.ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("TOPOLOGY_NOT_FOUND", format!("Topology not found: {}", id))),
        )
    })
}

// ============================================================================
// Route Handlers
// ============================================================================

/// List all topologies as a `NetworkCollection`.
async fn list_topologies_handler<S, F>(
    State(state): State<Arc<ServiceState<S, F>>>,
) -> Result<Json<NetworkCollection>, ApiError>
where
    S: GraphStore + StoreHealth + 'static,
    F: Fetcher + 'static,
{
    let topologies = state.store.list_topologies().await.map_err(store_error)?;
    let collection = netjson::serialize_collection(state.store.as_ref(), &topologies)
        .await
        .map_err(store_error)?;
    Ok(Json(collection))
}

/// Serialize one topology, at the latest or a requested generation.
async fn topology_handler<S, F>(
    State(state): State<Arc<ServiceState<S, F>>>,
    Path(id): Path<String>,
    Query(query): Query<GraphQuery>,
) -> Result<Json<NetworkGraph>, ApiError>
where
    S: GraphStore + StoreHealth + 'static,
    F: Fetcher + 'static,
{
    let id = parse_topology_id(&id)?;
    let topology = load_topology(state.store.as_ref(), &id).await?;

    let generation = match query.generation {
        Some(raw) => {
            let requested = GenerationId::new(raw);
            let known = state
                .store
                .list_generations(&id)
                .await
                .map_err(store_error)?
                .iter()
                .any(|g| g.id == requested);
            if !known {
                return Err((
                    StatusCode::NOT_FOUND,
                    Json(ErrorResponse::new(
                        "GENERATION_NOT_FOUND",
                        format!("Generation {} not found for topology {}", raw, id),
                    )),
                ));
            }
            Some(requested)
        }
        None => None,
    };

    let graph = netjson::serialize(state.store.as_ref(), &topology, generation)
        .await
        .map_err(store_error)?;
    Ok(Json(graph))
}

/// List retained generations of a topology.
async fn history_handler<S, F>(
    State(state): State<Arc<ServiceState<S, F>>>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError>
where
    S: GraphStore + StoreHealth + 'static,
    F: Fetcher + 'static,
{
    let id = parse_topology_id(&id)?;
    load_topology(state.store.as_ref(), &id).await?;
    let generations = state.store.list_generations(&id).await.map_err(store_error)?;
    Ok(Json(HistoryResponse {
        topology_id: id.to_string(),
        generations: generations
            .into_iter()
            .map(|g| GenerationDto {
                id: g.id.as_i64(),
                timestamp: g.timestamp,
                snapshot_hash: g.snapshot_hash,
            })
            .collect(),
    }))
}

/// Run an update cycle now.
async fn update_handler<S, F>(
    State(state): State<Arc<ServiceState<S, F>>>,
    Path(id): Path<String>,
) -> Result<Json<UpdateResponse>, ApiError>
where
    S: GraphStore + StoreHealth + 'static,
    F: Fetcher + 'static,
{
    let id = parse_topology_id(&id)?;
    let outcome = state.updater.update(&id).await.map_err(|e| {
        let (status, code) = match &e {
            UpdateError::TopologyNotFound(_) => (StatusCode::NOT_FOUND, "TOPOLOGY_NOT_FOUND"),
            UpdateError::Fetch(FetchError::Timeout(_)) => (StatusCode::GATEWAY_TIMEOUT, "FETCH_TIMEOUT"),
            UpdateError::Fetch(_) => (StatusCode::BAD_GATEWAY, "FETCH_FAILED"),
            UpdateError::Store(_) | UpdateError::Reconcile(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "UPDATE_FAILED")
            }
        };
        (status, Json(ErrorResponse::new(code, e.to_string())))
    })?;
    Ok(Json(outcome.into()))
}

/// Health check endpoint (detailed).
async fn health_handler<S, F>(State(state): State<Arc<ServiceState<S, F>>>) -> Json<HealthResponse>
where
    S: GraphStore + StoreHealth + 'static,
    F: Fetcher + 'static,
{
    let db_healthy = state.store.is_healthy().await;
    Json(HealthResponse {
        status: if db_healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        schema_version: TOPOLOGY_HISTORY_SCHEMA_VERSION.to_string(),
        database: state.store.pool_stats().map(|stats| DatabaseHealth {
            connected: db_healthy,
            pool_size: stats.size,
            pool_idle: stats.idle,
            pool_max: stats.max,
        }),
    })
}

/// Liveness probe endpoint. Does not check dependencies.
async fn liveness_handler() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe endpoint.
///
/// Returns 200 if the store is reachable, 503 otherwise.
async fn readiness_handler<S, F>(
    State(state): State<Arc<ServiceState<S, F>>>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)>
where
    S: GraphStore + StoreHealth + 'static,
    F: Fetcher + 'static,
{
    if state.store.is_healthy().await {
        Ok(Json(ReadinessResponse {
            ready: true,
            database: true,
            details: None,
        }))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                database: false,
                details: Some("Database connection failed".to_string()),
            }),
        ))
    }
}

// ============================================================================
// Router Construction
// ============================================================================

/// Create the Axum router for the topology service.
pub fn create_router<S, F>(state: ServiceState<S, F>) -> Router
where
    S: GraphStore + StoreHealth + 'static,
    F: Fetcher + 'static,
{
    let state = Arc::new(state);

    Router::new()
        // Read API
        .route("/api/topology", get(list_topologies_handler::<S, F>))
        .route("/api/topology/:id", get(topology_handler::<S, F>))
        .route("/api/topology/:id/history", get(history_handler::<S, F>))
        // Trigger
        .route("/api/topology/:id/update", post(update_handler::<S, F>))
        // Health checks
        .route("/health", get(health_handler::<S, F>))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler::<S, F>))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpdaterConfig;
    use crate::fetch::StaticFetcher;
    use crate::store::InMemoryGraphStore;
    use crate::types::{GraphSnapshot, SnapshotLink};

    type TestState = ServiceState<InMemoryGraphStore, StaticFetcher>;

    fn state() -> (Arc<TestState>, Arc<StaticFetcher>, Topology) {
        let store = Arc::new(InMemoryGraphStore::new());
        let topology = Topology::new("mesh", "netjson", "mem://mesh");
        store.add_topology(topology.clone());
        let fetcher = Arc::new(StaticFetcher::new());
        let state = ServiceState::new(store, Arc::clone(&fetcher), UpdaterConfig::default());
        (Arc::new(state), fetcher, topology)
    }

    #[tokio::test]
    async fn test_update_then_read() {
        let (state, fetcher, topology) = state();
        fetcher.set(
            "mem://mesh",
            GraphSnapshot::builder("OLSR", "0.8", "ETX")
                .link(SnapshotLink::new("a", "b", 1.0))
                .build(),
        );

        let Json(update) = update_handler(State(Arc::clone(&state)), Path(topology.id.to_string()))
            .await
            .unwrap();
        assert_eq!(update.links_created, 1);
        assert!(update.failures.is_empty());

        let Json(graph) = topology_handler(
            State(Arc::clone(&state)),
            Path(topology.id.to_string()),
            Query(GraphQuery::default()),
        )
        .await
        .unwrap();
        assert_eq!(graph.protocol, "OLSR");
        assert_eq!(graph.links.len(), 1);

        let Json(history) = history_handler(State(Arc::clone(&state)), Path(topology.id.to_string()))
            .await
            .unwrap();
        assert_eq!(history.generations.len(), 1);

        let Json(collection) = list_topologies_handler(State(state)).await.unwrap();
        assert_eq!(collection.collection.len(), 1);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let (state, fetcher, topology) = state();
        fetcher.fail("mem://mesh", FetchError::Network("down".to_string()));

        let (status, Json(body)) = update_handler(State(Arc::clone(&state)), Path(topology.id.to_string()))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.code, "FETCH_FAILED");

        let (status, _) = topology_handler(
            State(Arc::clone(&state)),
            Path("not-a-uuid".to_string()),
            Query(GraphQuery::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = history_handler(State(Arc::clone(&state)), Path(TopologyId::random().to_string()))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = topology_handler(
            State(state),
            Path(topology.id.to_string()),
            Query(GraphQuery { generation: Some(42) }),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_in_memory() {
        let (state, _, _) = state();
        let Json(health) = health_handler(State(Arc::clone(&state))).await;
        assert_eq!(health.status, "healthy");
        assert!(health.database.is_none());
        assert!(readiness_handler(State(state)).await.is_ok());
    }
}
