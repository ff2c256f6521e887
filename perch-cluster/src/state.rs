//! Cluster registry: nodes, shards, and the prior assignment snapshot.

use std::collections::BTreeMap;

use perch_common::error::{PlacementError, PlacementResult};
use perch_common::ids::{NodeId, ShardId};

use crate::node::{Node, NodeOption};
use crate::shard::{Shard, ShardOption};

/// Engine output: per shard an ordered list of distinct node ids, one per replica slot.
pub type Allocation = BTreeMap<ShardId, Vec<NodeId>>;

/// Mutable registry describing the cluster a solve runs against.
///
/// Maps are ordered so model construction traverses nodes and shards in a stable order,
/// which keeps solves reproducible for identical inputs. The registry itself carries no
/// synchronization; callers serialize mutation against concurrent solves or hand the engine
/// a cloned snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterState {
    nodes: BTreeMap<NodeId, Node>,
    shards: BTreeMap<ShardId, Shard>,
    current_assignment: Allocation,
}

impl ClusterState {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node, overwriting any existing node with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`PlacementError::InvalidArgument`] for a negative id or a failing option;
    /// the registry is untouched on failure.
    pub fn add_node(&mut self, id: i64, opts: Vec<NodeOption>) -> PlacementResult<()> {
        if id < 0 {
            return Err(PlacementError::InvalidArgument("node id cannot be negative"));
        }
        let mut node = Node::new(id);
        for opt in &opts {
            opt.apply(&mut node)?;
        }
        self.nodes.insert(id, node);
        Ok(())
    }

    /// Applies options to an existing node.
    ///
    /// Returns `Ok(true)` on a hit and `Ok(false)` when no node carries the id; options are
    /// only applied on a hit, and a failing option leaves the stored node unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`PlacementError::InvalidArgument`] when an option carries an out-of-range
    /// value.
    pub fn update_node(&mut self, id: i64, opts: Vec<NodeOption>) -> PlacementResult<bool> {
        let Some(existing) = self.nodes.get(&id) else {
            return Ok(false);
        };
        let mut updated = existing.clone();
        for opt in &opts {
            opt.apply(&mut updated)?;
        }
        self.nodes.insert(id, updated);
        Ok(true)
    }

    /// Removes a node; no-op when it does not exist.
    pub fn remove_node(&mut self, id: i64) {
        let _ = self.nodes.remove(&id);
    }

    /// Adds a shard, overwriting any existing shard with the same id.
    ///
    /// Passing `None` as the replication factor defers to the configuration fallback at
    /// solve time.
    ///
    /// # Errors
    ///
    /// Returns [`PlacementError::InvalidArgument`] for a negative id, a negative replication
    /// factor, or a failing option; the registry is untouched on failure.
    pub fn add_shard(
        &mut self,
        id: i64,
        replication_factor: impl Into<Option<i64>>,
        opts: Vec<ShardOption>,
    ) -> PlacementResult<()> {
        if id < 0 {
            return Err(PlacementError::InvalidArgument(
                "shard id cannot be negative",
            ));
        }
        let replication_factor = match replication_factor.into() {
            None => None,
            Some(rf) => {
                let Ok(rf) = usize::try_from(rf) else {
                    return Err(PlacementError::InvalidArgument(
                        "replication factor cannot be negative",
                    ));
                };
                Some(rf)
            }
        };
        let mut shard = Shard::new(id, replication_factor);
        for opt in &opts {
            opt.apply(&mut shard)?;
        }
        self.shards.insert(id, shard);
        Ok(())
    }

    /// Applies options to an existing shard.
    ///
    /// Returns `Ok(true)` on a hit and `Ok(false)` when no shard carries the id; options are
    /// only applied on a hit, and a failing option leaves the stored shard unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`PlacementError::InvalidArgument`] when an option carries an out-of-range
    /// value.
    pub fn update_shard(&mut self, id: i64, opts: Vec<ShardOption>) -> PlacementResult<bool> {
        let Some(existing) = self.shards.get(&id) else {
            return Ok(false);
        };
        let mut updated = existing.clone();
        for opt in &opts {
            opt.apply(&mut updated)?;
        }
        self.shards.insert(id, updated);
        Ok(true)
    }

    /// Removes a shard; no-op when it does not exist.
    pub fn remove_shard(&mut self, id: i64) {
        let _ = self.shards.remove(&id);
    }

    /// Replaces the prior-assignment snapshot consulted by churn constraints.
    pub fn update_current_assignment(&mut self, allocation: Allocation) {
        self.current_assignment = allocation;
    }

    /// Registered nodes keyed by id, in ascending order.
    #[must_use]
    pub fn nodes(&self) -> &BTreeMap<NodeId, Node> {
        &self.nodes
    }

    /// Registered shards keyed by id, in ascending order.
    #[must_use]
    pub fn shards(&self) -> &BTreeMap<ShardId, Shard> {
        &self.shards
    }

    /// Prior assignment snapshot; empty when none was recorded.
    #[must_use]
    pub fn current_assignment(&self) -> &Allocation {
        &self.current_assignment
    }
}
