//! Cluster description consumed by the placement engine.
//!
//! [`ClusterState`] registers nodes and shards through constructor-plus-modifier semantics:
//! an entity is created with its id and default fields, then mutated through a recognized
//! set of modifier options. A solve reads the state as an immutable snapshot.

pub mod node;
pub mod shard;
pub mod state;

pub use node::{
    Node, NodeOption, add_tags_to_node, remove_all_tags_of_node, with_resource_of_node,
    with_tags_of_node,
};
pub use shard::{
    Shard, ShardOption, add_tags_to_shard, remove_all_tags_of_shard, with_demand_of_shard,
    with_replication_factor_of_shard, with_tags_of_shard,
};
pub use state::{Allocation, ClusterState};
