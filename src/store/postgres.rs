//! PostgreSQL graph store for production use.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 300)
//! - `DB_MAX_LIFETIME_SECS`: Max connection lifetime (default: 1800)
//!
//! ## Schema
//!
//! `topology` → `generation` → {`node`, `link`}, plus `node_address` with
//! one row per (node, address) so alias lookups hit an index. Deleting a
//! generation cascades to its rows. See [`SCHEMA_SQL`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use std::time::Duration;

use super::{DeletedRows, GraphStore};
use crate::types::{
    AddressList, Generation, GenerationId, Link, LinkId, LinkStatus, Node, NodeId, Properties,
    Topology, TopologyId,
};

/// Schema statements, applied in order by [`PostgresGraphStore::ensure_schema`].
pub const SCHEMA_SQL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS topology (
        id UUID PRIMARY KEY,
        label TEXT NOT NULL,
        parser TEXT NOT NULL,
        url TEXT NOT NULL,
        protocol TEXT NOT NULL DEFAULT '',
        version TEXT NOT NULL DEFAULT '',
        revision TEXT NOT NULL DEFAULT '',
        metric TEXT NOT NULL DEFAULT '',
        created TIMESTAMPTZ NOT NULL,
        modified TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS generation (
        id BIGSERIAL PRIMARY KEY,
        topology_id UUID NOT NULL REFERENCES topology(id) ON DELETE CASCADE,
        timestamp TIMESTAMPTZ NOT NULL,
        snapshot_hash TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS generation_topology_order ON generation (topology_id, timestamp, id)",
    r#"
    CREATE TABLE IF NOT EXISTS node (
        id UUID PRIMARY KEY,
        topology_id UUID NOT NULL REFERENCES topology(id) ON DELETE CASCADE,
        generation_id BIGINT NOT NULL REFERENCES generation(id) ON DELETE CASCADE,
        addresses TEXT[] NOT NULL,
        primary_address TEXT NOT NULL,
        label TEXT,
        properties JSONB NOT NULL DEFAULT '{}',
        created TIMESTAMPTZ NOT NULL,
        modified TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS node_generation ON node (topology_id, generation_id, primary_address)",
    r#"
    CREATE TABLE IF NOT EXISTS node_address (
        node_id UUID NOT NULL REFERENCES node(id) ON DELETE CASCADE,
        topology_id UUID NOT NULL,
        address TEXT NOT NULL,
        position INTEGER NOT NULL,
        PRIMARY KEY (node_id, address)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS node_address_lookup ON node_address (topology_id, address)",
    r#"
    CREATE TABLE IF NOT EXISTS link (
        id UUID PRIMARY KEY,
        topology_id UUID NOT NULL REFERENCES topology(id) ON DELETE CASCADE,
        generation_id BIGINT NOT NULL REFERENCES generation(id) ON DELETE CASCADE,
        source_id UUID NOT NULL REFERENCES node(id) ON DELETE CASCADE,
        target_id UUID NOT NULL REFERENCES node(id) ON DELETE CASCADE,
        cost DOUBLE PRECISION NOT NULL,
        cost_text TEXT,
        status TEXT NOT NULL CHECK (status IN ('up', 'down')),
        properties JSONB NOT NULL DEFAULT '{}',
        created TIMESTAMPTZ NOT NULL,
        modified TIMESTAMPTZ NOT NULL,
        CHECK (source_id <> target_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS link_generation ON link (topology_id, generation_id)",
    "CREATE INDEX IF NOT EXISTS link_endpoints ON link (source_id, target_id)",
];

/// Configuration for PostgreSQL connection pool.
///
/// Defaults favor failing fast over waiting on a saturated pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool (default: 10).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 2).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 300 = 5 min).
    pub idle_timeout_secs: u64,
    /// Maximum connection lifetime in seconds (default: 1800 = 30 min).
    pub max_lifetime_secs: u64,
}

impl PostgresConfig {
    /// Load configuration from environment variables with production defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/topology".to_string()),
            max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            min_connections: std::env::var("DB_MIN_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            connect_timeout_secs: std::env::var("DB_CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            idle_timeout_secs: std::env::var("DB_IDLE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
            max_lifetime_secs: std::env::var("DB_MAX_LIFETIME_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1800),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Error type for PostgreSQL store.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Generation not found.
    #[error("Generation not found: {0}")]
    GenerationNotFound(GenerationId),
    /// A stored row could not be decoded.
    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

/// PostgreSQL graph store.
///
/// Uses connection pooling; multi-statement writes run in a transaction.
pub struct PostgresGraphStore {
    pool: PgPool,
}

impl PostgresGraphStore {
    /// Create a new store with the given configuration.
    pub async fn new(config: PostgresConfig) -> Result<Self, sqlx::Error> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            idle_timeout_secs = config.idle_timeout_secs,
            max_lifetime_secs = config.max_lifetime_secs,
            "Initializing PostgreSQL connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a store from environment variables.
    pub async fn from_env() -> Result<Self, sqlx::Error> {
        Self::new(PostgresConfig::from_env()).await
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool for health checks.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if missing.
    pub async fn ensure_schema(&self) -> Result<(), PostgresError> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA_SQL {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        tracing::info!(statements = SCHEMA_SQL.len(), "Schema ensured");
        Ok(())
    }

    /// Get pool statistics for monitoring.
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max: self.pool.options().get_max_connections(),
        }
    }

    fn parse_topology_row(row: &PgRow) -> Result<Topology, PostgresError> {
        Ok(Topology {
            id: TopologyId::new(row.try_get("id")?),
            label: row.try_get("label")?,
            parser: row.try_get("parser")?,
            url: row.try_get("url")?,
            protocol: row.try_get("protocol")?,
            version: row.try_get("version")?,
            revision: row.try_get("revision")?,
            metric: row.try_get("metric")?,
            created: row.try_get("created")?,
            modified: row.try_get("modified")?,
        })
    }

    fn parse_generation_row(row: &PgRow) -> Result<Generation, PostgresError> {
        Ok(Generation {
            id: GenerationId::new(row.try_get("id")?),
            topology: TopologyId::new(row.try_get("topology_id")?),
            timestamp: row.try_get("timestamp")?,
            snapshot_hash: row.try_get("snapshot_hash")?,
        })
    }

    fn parse_node_row(row: &PgRow) -> Result<Node, PostgresError> {
        let addresses: Vec<String> = row.try_get("addresses")?;
        let properties: Json<Properties> = row.try_get("properties")?;
        Ok(Node {
            id: NodeId::new(row.try_get("id")?),
            topology: TopologyId::new(row.try_get("topology_id")?),
            generation: GenerationId::new(row.try_get("generation_id")?),
            addresses: AddressList::parse(&addresses.join(";")),
            label: row.try_get("label")?,
            properties: properties.0,
            created: row.try_get("created")?,
            modified: row.try_get("modified")?,
        })
    }

    fn parse_link_row(row: &PgRow) -> Result<Link, PostgresError> {
        let status: String = row.try_get("status")?;
        let properties: Json<Properties> = row.try_get("properties")?;
        Ok(Link {
            id: LinkId::new(row.try_get("id")?),
            topology: TopologyId::new(row.try_get("topology_id")?),
            generation: GenerationId::new(row.try_get("generation_id")?),
            source: NodeId::new(row.try_get("source_id")?),
            target: NodeId::new(row.try_get("target_id")?),
            cost: row.try_get("cost")?,
            cost_text: row.try_get("cost_text")?,
            status: LinkStatus::from_str(&status)
                .ok_or_else(|| PostgresError::InvalidRow(format!("link status {status:?}")))?,
            properties: properties.0,
            created: row.try_get("created")?,
            modified: row.try_get("modified")?,
        })
    }
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    /// Current pool size.
    pub size: u32,
    /// Number of idle connections.
    pub idle: usize,
    /// Maximum pool size.
    pub max: u32,
}

#[async_trait]
impl GraphStore for PostgresGraphStore {
    type Error = PostgresError;

    async fn get_topology(&self, id: &TopologyId) -> Result<Option<Topology>, Self::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, label, parser, url, protocol, version, revision, metric, created, modified
            FROM topology
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_topology_row).transpose()
    }

    async fn list_topologies(&self) -> Result<Vec<Topology>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, label, parser, url, protocol, version, revision, metric, created, modified
            FROM topology
            ORDER BY label, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_topology_row).collect()
    }

    async fn save_topology(&self, topology: &Topology) -> Result<(), Self::Error> {
        sqlx::query(
            r#"
            INSERT INTO topology (id, label, parser, url, protocol, version, revision, metric, created, modified)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                label = EXCLUDED.label,
                parser = EXCLUDED.parser,
                url = EXCLUDED.url,
                protocol = EXCLUDED.protocol,
                version = EXCLUDED.version,
                revision = EXCLUDED.revision,
                metric = EXCLUDED.metric,
                modified = EXCLUDED.modified
            "#,
        )
        .bind(topology.id.as_uuid())
        .bind(&topology.label)
        .bind(&topology.parser)
        .bind(&topology.url)
        .bind(&topology.protocol)
        .bind(&topology.version)
        .bind(&topology.revision)
        .bind(&topology.metric)
        .bind(topology.created)
        .bind(topology.modified)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_generation(
        &self,
        topology: &TopologyId,
        timestamp: DateTime<Utc>,
        snapshot_hash: Option<String>,
    ) -> Result<Generation, Self::Error> {
        let row = sqlx::query(
            r#"
            INSERT INTO generation (topology_id, timestamp, snapshot_hash)
            VALUES ($1, $2, $3)
            RETURNING id, topology_id, timestamp, snapshot_hash
            "#,
        )
        .bind(topology.as_uuid())
        .bind(timestamp)
        .bind(snapshot_hash)
        .fetch_one(&self.pool)
        .await?;

        Self::parse_generation_row(&row)
    }

    async fn list_generations(&self, topology: &TopologyId) -> Result<Vec<Generation>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, topology_id, timestamp, snapshot_hash
            FROM generation
            WHERE topology_id = $1
            ORDER BY timestamp, id
            "#,
        )
        .bind(topology.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_generation_row).collect()
    }

    async fn latest_generation(&self, topology: &TopologyId) -> Result<Option<Generation>, Self::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, topology_id, timestamp, snapshot_hash
            FROM generation
            WHERE topology_id = $1
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(topology.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_generation_row).transpose()
    }

    async fn delete_generation(&self, id: GenerationId) -> Result<DeletedRows, Self::Error> {
        let mut tx = self.pool.begin().await?;

        let links = sqlx::query(
            r#"
            DELETE FROM link
            WHERE generation_id = $1
               OR source_id IN (SELECT id FROM node WHERE generation_id = $1)
               OR target_id IN (SELECT id FROM node WHERE generation_id = $1)
            "#,
        )
        .bind(id.as_i64())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let nodes = sqlx::query("DELETE FROM node WHERE generation_id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let generations = sqlx::query("DELETE FROM generation WHERE id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if generations == 0 {
            tx.rollback().await?;
            return Err(PostgresError::GenerationNotFound(id));
        }

        tx.commit().await?;
        Ok(DeletedRows {
            nodes: nodes as usize,
            links: links as usize,
        })
    }

    async fn get_node(&self, id: &NodeId) -> Result<Option<Node>, Self::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, topology_id, generation_id, addresses, label, properties, created, modified
            FROM node
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_node_row).transpose()
    }

    async fn find_node_by_address(
        &self,
        topology: &TopologyId,
        address: &str,
        generation: GenerationId,
    ) -> Result<Option<Node>, Self::Error> {
        let row = sqlx::query(
            r#"
            SELECT n.id, n.topology_id, n.generation_id, n.addresses, n.label, n.properties,
                   n.created, n.modified
            FROM node n
            JOIN node_address a ON a.node_id = n.id
            WHERE a.topology_id = $1 AND a.address = $2 AND n.generation_id = $3
            ORDER BY a.position, n.id
            LIMIT 1
            "#,
        )
        .bind(topology.as_uuid())
        .bind(address)
        .bind(generation.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_node_row).transpose()
    }

    async fn count_nodes_with_address(
        &self,
        topology: &TopologyId,
        address: &str,
    ) -> Result<usize, Self::Error> {
        let count: i64 = sqlx::query(
            "SELECT COUNT(*) AS count FROM node_address WHERE topology_id = $1 AND address = $2",
        )
        .bind(topology.as_uuid())
        .bind(address)
        .fetch_one(&self.pool)
        .await?
        .try_get("count")?;
        Ok(count as usize)
    }

    async fn nodes(&self, topology: &TopologyId, generation: GenerationId) -> Result<Vec<Node>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, topology_id, generation_id, addresses, label, properties, created, modified
            FROM node
            WHERE topology_id = $1 AND generation_id = $2
            ORDER BY primary_address, id
            "#,
        )
        .bind(topology.as_uuid())
        .bind(generation.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_node_row).collect()
    }

    async fn save_node(&self, node: &Node) -> Result<(), Self::Error> {
        let addresses: Vec<String> = node.addresses.as_slice().to_vec();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO node (id, topology_id, generation_id, addresses, primary_address, label,
                              properties, created, modified)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                generation_id = EXCLUDED.generation_id,
                addresses = EXCLUDED.addresses,
                primary_address = EXCLUDED.primary_address,
                label = EXCLUDED.label,
                properties = EXCLUDED.properties,
                modified = EXCLUDED.modified
            "#,
        )
        .bind(node.id.as_uuid())
        .bind(node.topology.as_uuid())
        .bind(node.generation.as_i64())
        .bind(&addresses)
        .bind(node.primary_address())
        .bind(&node.label)
        .bind(Json(&node.properties))
        .bind(node.created)
        .bind(node.modified)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM node_address WHERE node_id = $1")
            .bind(node.id.as_uuid())
            .execute(&mut *tx)
            .await?;
        for (position, address) in addresses.iter().enumerate() {
            sqlx::query(
                "INSERT INTO node_address (node_id, topology_id, address, position) VALUES ($1, $2, $3, $4)",
            )
            .bind(node.id.as_uuid())
            .bind(node.topology.as_uuid())
            .bind(address)
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_link(
        &self,
        topology: &TopologyId,
        source: &str,
        target: &str,
    ) -> Result<Option<Link>, Self::Error> {
        let row = sqlx::query(
            r#"
            SELECT l.id, l.topology_id, l.generation_id, l.source_id, l.target_id, l.cost,
                   l.cost_text, l.status, l.properties, l.created, l.modified
            FROM link l
            JOIN node_address s ON s.node_id = l.source_id
            JOIN node_address t ON t.node_id = l.target_id
            WHERE l.topology_id = $1
              AND s.topology_id = $1 AND s.address = $2
              AND t.topology_id = $1 AND t.address = $3
            ORDER BY l.generation_id DESC, l.modified DESC
            LIMIT 1
            "#,
        )
        .bind(topology.as_uuid())
        .bind(source)
        .bind(target)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_link_row).transpose()
    }

    async fn links(&self, topology: &TopologyId, generation: GenerationId) -> Result<Vec<Link>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT l.id, l.topology_id, l.generation_id, l.source_id, l.target_id, l.cost,
                   l.cost_text, l.status, l.properties, l.created, l.modified
            FROM link l
            JOIN node s ON s.id = l.source_id
            JOIN node t ON t.id = l.target_id
            WHERE l.topology_id = $1 AND l.generation_id = $2
            ORDER BY s.primary_address, t.primary_address, l.id
            "#,
        )
        .bind(topology.as_uuid())
        .bind(generation.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_link_row).collect()
    }

    async fn save_link(&self, link: &Link) -> Result<(), Self::Error> {
        sqlx::query(
            r#"
            INSERT INTO link (id, topology_id, generation_id, source_id, target_id, cost, cost_text,
                              status, properties, created, modified)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                generation_id = EXCLUDED.generation_id,
                cost = EXCLUDED.cost,
                cost_text = EXCLUDED.cost_text,
                status = EXCLUDED.status,
                properties = EXCLUDED.properties,
                modified = EXCLUDED.modified
            "#,
        )
        .bind(link.id.as_uuid())
        .bind(link.topology.as_uuid())
        .bind(link.generation.as_i64())
        .bind(link.source.as_uuid())
        .bind(link.target.as_uuid())
        .bind(link.cost)
        .bind(&link.cost_text)
        .bind(link.status.as_str())
        .bind(Json(&link.properties))
        .bind(link.created)
        .bind(link.modified)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_covers_tables() {
        let ddl = SCHEMA_SQL.join("\n");
        for table in ["topology", "generation", "node", "node_address", "link"] {
            assert!(ddl.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")), "{table}");
        }
        assert!(ddl.contains("CHECK (source_id <> target_id)"));
    }
}
