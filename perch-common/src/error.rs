//! Shared error model for cross-crate APIs.

use thiserror::Error;

use crate::ids::{Resource, ShardId};

/// Unified result type used by all public interfaces in `perch`.
pub type PlacementResult<T> = Result<T, PlacementError>;

/// Closed set of failure categories surfaced by the placement engine.
///
/// Input-validation failures fire before any solver work. The structural kinds
/// ([`RfExceedsCluster`](PlacementError::RfExceedsCluster),
/// [`InsufficientCapacity`](PlacementError::InsufficientCapacity),
/// [`TagsUnsatisfiable`](PlacementError::TagsUnsatisfiable)) are detected while the model is
/// assembled, so hopeless instances are refused without paying for a search.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlacementError {
    /// Caller-supplied value is out of range for the requested operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A shard demands more replicas than the cluster has nodes.
    #[error("replication factor of shard {0} exceeds cluster size")]
    RfExceedsCluster(ShardId),

    /// Total demand for a resource exceeds the aggregate capacity of the cluster.
    #[error("shard demands exceed aggregate cluster capacity for {0}")]
    InsufficientCapacity(Resource),

    /// No node carries a superset of some shard's tags.
    #[error("no node satisfies the tags of shard {0}")]
    TagsUnsatisfiable(ShardId),

    /// The assembled constraint model was rejected by the solver.
    #[error("solver rejected the constraint model: {0}")]
    InvalidModel(String),

    /// The solver found the model infeasible, timed out, or returned no verdict.
    #[error("no allocation found: {0}")]
    NotSolved(String),
}
