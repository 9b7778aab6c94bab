//! Reconciliation of a diff into the persistent graph.
//!
//! ## Algorithm
//!
//! 1. Open a generation: a fresh one in versioned mode, the topology's
//!    latest one in mutate-in-place mode
//! 2. Persist added nodes (in-place mode skips addresses already tracked),
//!    then update changed nodes in place (in-place mode only)
//! 3. Walk link entries section by section (added, changed, removed):
//!    - reuse the stored link for the address pair, or build a new row
//!      between resolved endpoints (stubs are created as needed)
//!    - changed/removed force status up/down and the delta's cost
//!    - write only when something changed
//!
//! Links are never deleted here; a link missing from the latest fetch goes
//! `down`. A record that fails validation is logged and skipped without
//! aborting the pass. Store read failures abort the pass.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::HistoryConfig;
use crate::diff::{Diff, LinkDelta, NodeDelta, SectionKind};
use crate::identity::IdentityResolver;
use crate::store::GraphStore;
use crate::types::{
    Generation, GenerationId, GraphSnapshot, Link, LinkStatus, Node, NodeId, SnapshotLink,
    SnapshotNode, Topology, TopologyId, ValidationError,
};

/// Error type for reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Store error.
    #[error("Store error: {0}")]
    Store(String),
}

impl ReconcileError {
    /// Create a store error from any error type.
    pub fn from_store<E: std::error::Error>(e: E) -> Self {
        Self::Store(e.to_string())
    }
}

/// Why one record was not written.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RecordError {
    /// The record failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The store rejected the write.
    #[error("Store error: {0}")]
    Store(String),
}

/// A skipped node or link write.
#[derive(Debug, Clone)]
pub struct RecordFailure {
    /// Section the record came from.
    pub section: SectionKind,
    /// Human-readable record description.
    pub entity: String,
    /// What went wrong.
    pub error: RecordError,
}

/// Outcome of one apply.
#[derive(Debug, Clone)]
pub struct AppliedResult {
    /// Generation the rows were written to.
    pub generation: GenerationId,
    /// Node rows inserted (including link endpoint stubs).
    pub nodes_created: usize,
    /// Node rows updated in place.
    pub nodes_updated: usize,
    /// Added nodes skipped because the address is already tracked.
    pub nodes_skipped: usize,
    /// Link rows inserted.
    pub links_created: usize,
    /// Link rows updated in place.
    pub links_updated: usize,
    /// Link entries that needed no write.
    pub links_unchanged: usize,
    /// Records skipped after a validation or write failure.
    pub failures: Vec<RecordFailure>,
}

impl AppliedResult {
    fn new(generation: GenerationId) -> Self {
        Self {
            generation,
            nodes_created: 0,
            nodes_updated: 0,
            nodes_skipped: 0,
            links_created: 0,
            links_updated: 0,
            links_unchanged: 0,
            failures: Vec::new(),
        }
    }

    /// True when no record was skipped.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total rows written.
    pub fn writes(&self) -> usize {
        self.nodes_created + self.nodes_updated + self.links_created + self.links_updated
    }

    fn fail(&mut self, section: SectionKind, entity: String, error: RecordError) {
        warn!(
            action = section.action(),
            entity = %entity,
            error = %error,
            "Record write skipped"
        );
        self.failures.push(RecordFailure { section, entity, error });
    }
}

fn describe_link(delta: &LinkDelta) -> String {
    format!("{} -> {}", delta.source, delta.target)
}

/// Applies diffs to a [`GraphStore`].
pub struct ReconciliationStore<S: GraphStore> {
    store: Arc<S>,
    history: HistoryConfig,
}

impl<S: GraphStore> ReconciliationStore<S> {
    /// Create a reconciler over a store.
    pub fn new(store: Arc<S>, history: HistoryConfig) -> Self {
        Self { store, history }
    }

    /// History configuration in use.
    pub fn history(&self) -> HistoryConfig {
        self.history
    }

    /// Open the generation the next apply writes to.
    ///
    /// Versioned mode always creates one; in-place mode reuses the latest
    /// and only creates the first.
    pub async fn open_generation(
        &self,
        topology: &TopologyId,
        snapshot_hash: Option<String>,
    ) -> Result<Generation, ReconcileError> {
        if !self.history.is_versioned() {
            let latest = self
                .store
                .latest_generation(topology)
                .await
                .map_err(ReconcileError::from_store)?;
            if let Some(generation) = latest {
                return Ok(generation);
            }
        }
        let generation = self
            .store
            .create_generation(topology, Utc::now(), snapshot_hash)
            .await
            .map_err(ReconcileError::from_store)?;
        debug!(topology_id = %topology, generation_id = %generation.id, "Opened generation");
        Ok(generation)
    }

    /// Baseline to diff `latest` against.
    ///
    /// Versioned mode diffs against nothing, so every fetched element is
    /// added; in-place mode diffs against the stored graph.
    pub async fn baseline(
        &self,
        topology: &Topology,
        latest: &GraphSnapshot,
    ) -> Result<GraphSnapshot, ReconcileError> {
        if self.history.is_versioned() {
            return Ok(GraphSnapshot::empty_like(latest));
        }
        self.current_snapshot(topology).await
    }

    /// Rebuild the stored graph of the latest generation as a snapshot.
    ///
    /// Links that are down are left out: they are not part of the
    /// present topology, so their return shows up as added.
    pub async fn current_snapshot(&self, topology: &Topology) -> Result<GraphSnapshot, ReconcileError> {
        let mut builder = GraphSnapshot::builder(&topology.protocol, &topology.version, &topology.metric)
            .link_key(self.history.link_key);
        if !topology.revision.is_empty() {
            builder = builder.revision(&topology.revision);
        }

        let Some(generation) = self
            .store
            .latest_generation(&topology.id)
            .await
            .map_err(ReconcileError::from_store)?
        else {
            return Ok(builder.build());
        };

        let nodes = self
            .store
            .nodes(&topology.id, generation.id)
            .await
            .map_err(ReconcileError::from_store)?;
        let mut primaries: BTreeMap<NodeId, String> = BTreeMap::new();
        for node in &nodes {
            if node.addresses.is_empty() {
                continue;
            }
            primaries.insert(node.id, node.primary_address().to_string());
            builder.add_node(SnapshotNode {
                id: node.primary_address().to_string(),
                label: node.label.clone(),
                local_addresses: node.local_addresses().to_vec(),
                properties: node.properties.clone(),
            });
        }

        let links = self
            .store
            .links(&topology.id, generation.id)
            .await
            .map_err(ReconcileError::from_store)?;
        for link in links.iter().filter(|l| l.status == LinkStatus::Up) {
            let (Some(source), Some(target)) = (
                self.primary_address(&primaries, &link.source).await?,
                self.primary_address(&primaries, &link.target).await?,
            ) else {
                warn!(link_id = %link.id, "Link endpoint missing from store, leaving it out of baseline");
                continue;
            };
            builder.add_link(SnapshotLink {
                source,
                target,
                cost: link.cost,
                cost_text: link.cost_text.clone(),
                properties: link.properties.clone(),
            });
        }

        Ok(builder.build())
    }

    async fn primary_address(
        &self,
        primaries: &BTreeMap<NodeId, String>,
        id: &NodeId,
    ) -> Result<Option<String>, ReconcileError> {
        if let Some(address) = primaries.get(id) {
            return Ok(Some(address.clone()));
        }
        let node = self.store.get_node(id).await.map_err(ReconcileError::from_store)?;
        Ok(node.and_then(|n| n.addresses.primary().map(str::to_string)))
    }

    /// Open a generation and apply `diff` to it.
    pub async fn apply(&self, topology: &TopologyId, diff: &Diff) -> Result<AppliedResult, ReconcileError> {
        let generation = self.open_generation(topology, None).await?;
        self.apply_to(topology, &generation, diff).await
    }

    /// Apply `diff` to an already opened generation.
    pub async fn apply_to(
        &self,
        topology: &TopologyId,
        generation: &Generation,
        diff: &Diff,
    ) -> Result<AppliedResult, ReconcileError> {
        let resolver = IdentityResolver::new(&*self.store, *topology);
        let mut result = AppliedResult::new(generation.id);

        for delta in &diff.added.nodes {
            self.add_node(&resolver, generation, delta, &mut result).await?;
        }
        if !self.history.is_versioned() {
            for delta in &diff.changed.nodes {
                self.change_node(&resolver, generation, delta, &mut result).await?;
            }
        }
        for (kind, section) in diff.sections() {
            for delta in &section.links {
                self.apply_link(&resolver, generation, kind, delta, &mut result).await?;
            }
        }

        info!(
            topology_id = %topology,
            generation_id = %generation.id,
            nodes_created = result.nodes_created,
            nodes_updated = result.nodes_updated,
            nodes_skipped = result.nodes_skipped,
            links_created = result.links_created,
            links_updated = result.links_updated,
            links_unchanged = result.links_unchanged,
            failures = result.failures.len(),
            "Diff applied"
        );
        Ok(result)
    }

    async fn add_node(
        &self,
        resolver: &IdentityResolver<'_, S>,
        generation: &Generation,
        delta: &NodeDelta,
        result: &mut AppliedResult,
    ) -> Result<(), ReconcileError> {
        if !self.history.is_versioned() {
            let known = resolver
                .count_nodes_with_address(&delta.id)
                .await
                .map_err(ReconcileError::from_store)?;
            if known > 0 {
                debug!(address = %delta.id, "Address already tracked, node not duplicated");
                result.nodes_skipped += 1;
                return Ok(());
            }
        }
        let node = Node::from_snapshot(resolver.topology(), generation.id, delta);
        self.write_node(SectionKind::Added, node, true, result).await;
        Ok(())
    }

    async fn change_node(
        &self,
        resolver: &IdentityResolver<'_, S>,
        generation: &Generation,
        delta: &NodeDelta,
        result: &mut AppliedResult,
    ) -> Result<(), ReconcileError> {
        let resolved = resolver
            .resolve_node(&delta.id, generation.id)
            .await
            .map_err(ReconcileError::from_store)?;
        let mut node = resolved.node;
        if !node.merge_snapshot(delta) && !resolved.is_new {
            return Ok(());
        }
        self.write_node(SectionKind::Changed, node, resolved.is_new, result).await;
        Ok(())
    }

    /// Validate and save a node, recording the outcome. Returns true on success.
    async fn write_node(&self, section: SectionKind, node: Node, is_new: bool, result: &mut AppliedResult) -> bool {
        if let Err(e) = node.validate() {
            result.fail(section, node.addresses.to_field(), e.into());
            return false;
        }
        match self.store.save_node(&node).await {
            Ok(()) => {
                if is_new {
                    result.nodes_created += 1;
                } else {
                    result.nodes_updated += 1;
                }
                true
            }
            Err(e) => {
                result.fail(section, node.addresses.to_field(), RecordError::Store(e.to_string()));
                false
            }
        }
    }

    async fn apply_link(
        &self,
        resolver: &IdentityResolver<'_, S>,
        generation: &Generation,
        kind: SectionKind,
        delta: &LinkDelta,
        result: &mut AppliedResult,
    ) -> Result<(), ReconcileError> {
        let existing = if self.history.is_versioned() {
            None
        } else {
            resolver
                .find_link(&delta.source, &delta.target, self.history.link_key)
                .await
                .map_err(ReconcileError::from_store)?
        };

        let (mut link, created) = match existing {
            Some(link) => (link, false),
            None => match self.new_link(resolver, generation, kind, delta, result).await? {
                Some(link) => (link, true),
                None => return Ok(()),
            },
        };

        let mut dirty = created;
        match kind {
            SectionKind::Added => {
                if !created && (link.status != LinkStatus::Up || !link.matches_snapshot(delta)) {
                    link.status = LinkStatus::Up;
                    link.merge_snapshot(delta);
                    dirty = true;
                }
            }
            SectionKind::Changed => {
                link.status = kind.link_status();
                link.merge_snapshot(delta);
                dirty = true;
            }
            SectionKind::Removed => {
                link.status = kind.link_status();
                link.cost = delta.cost;
                dirty = true;
            }
        }

        if !dirty {
            result.links_unchanged += 1;
            return Ok(());
        }
        if let Err(e) = link.validate() {
            result.fail(kind, describe_link(delta), e.into());
            return Ok(());
        }
        if !created {
            link.generation = generation.id;
            link.modified = Utc::now();
        }
        match self.store.save_link(&link).await {
            Ok(()) if created => result.links_created += 1,
            Ok(()) => result.links_updated += 1,
            Err(e) => result.fail(kind, describe_link(delta), RecordError::Store(e.to_string())),
        }
        Ok(())
    }

    /// Build a new link row, saving endpoint stubs as needed.
    ///
    /// Returns `None` when the link or a stub failed and was recorded.
    async fn new_link(
        &self,
        resolver: &IdentityResolver<'_, S>,
        generation: &Generation,
        kind: SectionKind,
        delta: &LinkDelta,
        result: &mut AppliedResult,
    ) -> Result<Option<Link>, ReconcileError> {
        let source = resolver
            .resolve_node(&delta.source, generation.id)
            .await
            .map_err(ReconcileError::from_store)?;
        let target = resolver
            .resolve_node(&delta.target, generation.id)
            .await
            .map_err(ReconcileError::from_store)?;

        let mut link = Link::from_snapshot(
            resolver.topology(),
            generation.id,
            source.node.id,
            target.node.id,
            delta,
        );
        link.status = kind.link_status();
        if let Err(e) = link.validate_endpoints(&source.node, &target.node) {
            result.fail(kind, describe_link(delta), e.into());
            return Ok(None);
        }

        for stub in [source, target].into_iter().filter(|r| r.is_new) {
            if !self.write_node(kind, stub.node, true, result).await {
                return Ok(None);
            }
        }
        Ok(Some(link))
    }
}
