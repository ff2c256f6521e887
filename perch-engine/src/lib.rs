//! Declarative replica placement for a sharded, replicated data store.
//!
//! Given a cluster of nodes (resource capacities, affinity tags) and a set of shards
//! (replication factor, resource demands, tag requirements), [`solve`] computes an
//! allocation mapping every shard to a list of distinct nodes, or refuses with a typed
//! [`PlacementError`]. Placement is encoded as a constraint program: one integer variable
//! per replica slot over the live node ids, all-different for replica spread, cumulative
//! unit intervals for capacity and load balancing, forbidden assignments for tag affinity,
//! and soft implication literals for churn against a prior allocation.
//!
//! ```
//! use perch_engine::{solve, ClusterState, Configuration, PlacementError};
//!
//! let mut cluster = ClusterState::new();
//! for node in 0..3 {
//!     cluster.add_node(node, vec![])?;
//! }
//! cluster.add_shard(0, 3, vec![])?;
//!
//! let config = Configuration::new(vec![])?;
//! let allocation = solve(&cluster, &config)?;
//! assert_eq!(allocation[&0].len(), 3);
//! # Ok::<(), PlacementError>(())
//! ```

mod builder;
mod solve;

pub use perch_cluster::{
    Allocation, ClusterState, Node, NodeOption, Shard, ShardOption, add_tags_to_node,
    add_tags_to_shard, remove_all_tags_of_node, remove_all_tags_of_shard, with_demand_of_shard,
    with_replication_factor_of_shard, with_resource_of_node, with_tags_of_node,
    with_tags_of_shard,
};
pub use perch_common::config::{
    Configuration, ConfigOption, DEFAULT_REPLICATION_FACTOR, DEFAULT_SEARCH_TIMEOUT,
    NO_MAX_CHURN, disable_max_churn, with_capacity, with_churn_minimized, with_load_balancing,
    with_max_churn, with_replication_factor, with_search_timeout, with_tag_affinity,
    with_verbose_logging,
};
pub use perch_common::error::{PlacementError, PlacementResult};
pub use perch_common::ids::{NodeId, Resource, ShardId};
pub use solve::solve;

#[cfg(test)]
mod tests;
