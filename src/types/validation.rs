//! Record-level validation failures.

/// A node or link failed validation before being persisted.
///
/// Validation failures are local to one record: the reconciler logs them,
/// skips that write and carries on with the rest of the cycle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Node has no usable address.
    #[error("Node has no addresses")]
    EmptyAddresses,
    /// Address contains delimiter or control characters.
    #[error("Malformed address: {0:?}")]
    MalformedAddress(String),
    /// Source and target resolve to the same node.
    #[error("Link source and target must differ: {0}")]
    SelfLink(String),
    /// Link cost is NaN or infinite.
    #[error("Link cost must be a finite number, got {0}")]
    InvalidCost(f64),
    /// Properties are not a JSON object.
    #[error("Properties must be a JSON object: {0}")]
    InvalidProperties(String),
    /// A link endpoint belongs to another topology.
    #[error("Link endpoint {0} belongs to a different topology")]
    TopologyMismatch(String),
}
