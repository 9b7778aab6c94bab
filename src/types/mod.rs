//! Core types for topology history.

pub mod address;
pub mod properties;
pub mod validation;
pub mod topology;
pub mod generation;
pub mod node;
pub mod link;
pub mod snapshot;

pub use address::AddressList;
pub use properties::{properties_from_value, Properties};
pub use validation::ValidationError;
pub use topology::{Topology, TopologyId};
pub use generation::{Generation, GenerationId};
pub use node::{Node, NodeId};
pub use link::{Link, LinkId, LinkKey, LinkKeyMode, LinkStatus};
pub use snapshot::{GraphSnapshot, SnapshotBuilder, SnapshotLink, SnapshotNode};
