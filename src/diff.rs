//! Structural diff between two graph snapshots.
//!
//! Nodes are matched by primary address and links by `(source, target)`
//! address pair, never by store identifiers. Every key lands in at most one
//! of `added`, `changed`, `removed`; unchanged elements are left out.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::{GraphSnapshot, LinkKey, LinkStatus, SnapshotLink, SnapshotNode};

/// A node entry in a diff section.
pub type NodeDelta = SnapshotNode;

/// A link entry in a diff section.
///
/// Entries in `removed` carry the values last seen in the baseline.
pub type LinkDelta = SnapshotLink;

/// Diff section, in the order sections are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    /// Only in the latest snapshot.
    Added,
    /// In both, with different attributes.
    Changed,
    /// Only in the baseline.
    Removed,
}

impl SectionKind {
    /// All sections in application order.
    pub const ALL: [SectionKind; 3] = [Self::Added, Self::Changed, Self::Removed];

    /// Link status a section forces.
    pub fn link_status(&self) -> LinkStatus {
        match self {
            Self::Added | Self::Changed => LinkStatus::Up,
            Self::Removed => LinkStatus::Down,
        }
    }

    /// Action name used in logs.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Added => "add",
            Self::Changed => "change",
            Self::Removed => "remove",
        }
    }

    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Changed => "changed",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nodes and links of one section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffSection {
    /// Node entries, ordered by primary address.
    pub nodes: Vec<NodeDelta>,
    /// Link entries, ordered by key.
    pub links: Vec<LinkDelta>,
}

impl DiffSection {
    /// True when the section holds nothing.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }
}

/// Classification of every differing node and link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    /// Elements only in the latest snapshot.
    pub added: DiffSection,
    /// Elements in both with different attributes.
    pub changed: DiffSection,
    /// Elements only in the baseline.
    pub removed: DiffSection,
}

impl Diff {
    /// True when nothing differs.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// One section.
    pub fn section(&self, kind: SectionKind) -> &DiffSection {
        match kind {
            SectionKind::Added => &self.added,
            SectionKind::Changed => &self.changed,
            SectionKind::Removed => &self.removed,
        }
    }

    /// Sections in application order (added, changed, removed).
    pub fn sections(&self) -> impl Iterator<Item = (SectionKind, &DiffSection)> {
        SectionKind::ALL.into_iter().map(move |kind| (kind, self.section(kind)))
    }

    /// Per-section counts.
    pub fn summary(&self) -> DiffSummary {
        DiffSummary {
            added_nodes: self.added.nodes.len(),
            added_links: self.added.links.len(),
            changed_nodes: self.changed.nodes.len(),
            changed_links: self.changed.links.len(),
            removed_nodes: self.removed.nodes.len(),
            removed_links: self.removed.links.len(),
        }
    }
}

/// Counts of a diff, for logs and API responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    /// Added nodes.
    pub added_nodes: usize,
    /// Added links.
    pub added_links: usize,
    /// Changed nodes.
    pub changed_nodes: usize,
    /// Changed links.
    pub changed_links: usize,
    /// Removed nodes.
    pub removed_nodes: usize,
    /// Removed links.
    pub removed_links: usize,
}

/// Pure snapshot differ.
pub struct DiffEngine;

impl DiffEngine {
    /// Classify every node and link of `current` and `latest`.
    ///
    /// Link keys are rebuilt under `latest`'s key mode so both sides match
    /// the same way even if `current` was built differently.
    pub fn compute(current: &GraphSnapshot, latest: &GraphSnapshot) -> Diff {
        let mut diff = Diff::default();

        for node in latest.nodes() {
            match current.node(&node.id) {
                None => diff.added.nodes.push(node.clone()),
                Some(old) if node_changed(old, node) => diff.changed.nodes.push(node.clone()),
                Some(_) => {}
            }
        }
        for node in current.nodes() {
            if latest.node(&node.id).is_none() {
                diff.removed.nodes.push(node.clone());
            }
        }

        let mode = latest.link_key_mode();
        let current_links: BTreeMap<LinkKey, &SnapshotLink> =
            current.links().map(|(_, l)| (l.key(mode), l)).collect();
        let latest_links: BTreeMap<LinkKey, &SnapshotLink> =
            latest.links().map(|(_, l)| (l.key(mode), l)).collect();

        for (key, link) in &latest_links {
            match current_links.get(key) {
                None => diff.added.links.push((*link).clone()),
                Some(old) if link_changed(old, link) => diff.changed.links.push((*link).clone()),
                Some(_) => {}
            }
        }
        for (key, link) in &current_links {
            if !latest_links.contains_key(key) {
                diff.removed.links.push((*link).clone());
            }
        }

        diff
    }
}

fn node_changed(old: &SnapshotNode, new: &SnapshotNode) -> bool {
    old.label != new.label
        || old.properties != new.properties
        || old.local_addresses != new.local_addresses
}

fn link_changed(old: &SnapshotLink, new: &SnapshotLink) -> bool {
    old.cost != new.cost || old.cost_text != new.cost_text || old.properties != new.properties
}
