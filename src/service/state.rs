//! Service state management.
//!
//! Holds the graph store and the updater shared by all handlers.

use std::sync::Arc;

use crate::config::UpdaterConfig;
use crate::fetch::Fetcher;
use crate::store::postgres::PoolStats;
use crate::store::{GraphStore, InMemoryGraphStore, PostgresGraphStore};
use crate::updater::TopologyUpdater;

/// Backend details reported by the health endpoint.
pub trait StoreHealth {
    /// Connection pool statistics, for pooled backends.
    fn pool_stats(&self) -> Option<PoolStats> {
        None
    }
}

impl StoreHealth for InMemoryGraphStore {}

impl StoreHealth for PostgresGraphStore {
    fn pool_stats(&self) -> Option<PoolStats> {
        Some(PostgresGraphStore::pool_stats(self))
    }
}

/// Shared service state.
pub struct ServiceState<S, F>
where
    S: GraphStore + StoreHealth + 'static,
    F: Fetcher + 'static,
{
    /// The graph store backing reads.
    pub store: Arc<S>,
    /// Runs update cycles triggered over HTTP.
    pub updater: Arc<TopologyUpdater<S, F>>,
}

impl<S, F> ServiceState<S, F>
where
    S: GraphStore + StoreHealth + 'static,
    F: Fetcher + 'static,
{
    /// Create service state over a store and a fetcher.
    pub fn new(store: Arc<S>, fetcher: Arc<F>, config: UpdaterConfig) -> Self {
        let updater = TopologyUpdater::new(Arc::clone(&store), fetcher, config);
        Self {
            store,
            updater: Arc::new(updater),
        }
    }

    /// Create service state with updater settings from environment variables.
    pub fn from_env(store: Arc<S>, fetcher: Arc<F>) -> Self {
        let config = UpdaterConfig::from_env();
        tracing::info!(
            max_generations = config.history.max_generations,
            link_key = ?config.history.link_key,
            fetch_timeout_secs = config.fetch_timeout.as_secs(),
            "Updater configured"
        );
        Self::new(store, fetcher, config)
    }
}

impl<S, F> Clone for ServiceState<S, F>
where
    S: GraphStore + StoreHealth + 'static,
    F: Fetcher + 'static,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            updater: Arc::clone(&self.updater),
        }
    }
}
