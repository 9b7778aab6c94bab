//! History generations.
//!
//! One generation is recorded per reconciliation pass. In versioned mode
//! every pass opens a fresh generation and writes new node/link rows into it;
//! in mutate-in-place mode a topology keeps a single generation that is
//! reused by every pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::topology::TopologyId;

/// Sequential generation identifier assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationId(i64);

impl GenerationId {
    /// Wrap a raw identifier.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Raw identifier.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One reconciliation pass's persisted marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    /// Store-assigned identifier.
    pub id: GenerationId,
    /// Owning topology.
    pub topology: TopologyId,
    /// When the generation was opened.
    pub timestamp: DateTime<Utc>,
    /// Fingerprint of the snapshot that produced this generation.
    pub snapshot_hash: Option<String>,
}

impl Generation {
    /// Ordering key: timestamp ascending, identifier breaks ties.
    pub fn order_key(&self) -> (DateTime<Utc>, GenerationId) {
        (self.timestamp, self.id)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "update {}", self.timestamp.to_rfc3339())
    }
}
