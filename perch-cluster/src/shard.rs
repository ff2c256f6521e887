//! Shard value type and its modifier options.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use perch_common::error::{PlacementError, PlacementResult};
use perch_common::ids::{Resource, ShardId};

/// Unit of data whose replicas are placed together by the engine.
///
/// The replication factor is optional at the shard level; shards without one inherit the
/// configuration fallback when a solve runs. Tags are membership-only, and a resource missing
/// from the demand map counts as a demand of zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    id: ShardId,
    replication_factor: Option<usize>,
    tags: BTreeSet<String>,
    demands: BTreeMap<Resource, i64>,
}

impl Shard {
    pub(crate) fn new(id: ShardId, replication_factor: Option<usize>) -> Self {
        Self {
            id,
            replication_factor,
            tags: BTreeSet::new(),
            demands: BTreeMap::new(),
        }
    }

    /// Unique identifier of this shard.
    #[must_use]
    pub fn id(&self) -> ShardId {
        self.id
    }

    /// Replication factor, `None` when the shard defers to the configuration fallback.
    #[must_use]
    pub fn replication_factor(&self) -> Option<usize> {
        self.replication_factor
    }

    /// Tags every hosting node must carry when tag affinity is enforced.
    #[must_use]
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Demand of one replica for a resource; missing entries count as zero.
    #[must_use]
    pub fn demand(&self, resource: Resource) -> i64 {
        self.demands.get(&resource).copied().unwrap_or(0)
    }
}

/// Modifier closure mutating a [`Shard`]; later options overwrite earlier ones per field.
pub struct ShardOption(Box<dyn Fn(&mut Shard) -> PlacementResult<()>>);

impl ShardOption {
    fn new(apply: impl Fn(&mut Shard) -> PlacementResult<()> + 'static) -> Self {
        Self(Box::new(apply))
    }

    pub(crate) fn apply(&self, shard: &mut Shard) -> PlacementResult<()> {
        (self.0)(shard)
    }
}

impl fmt::Debug for ShardOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ShardOption")
    }
}

/// Sets or overwrites the shard's replication factor.
pub fn with_replication_factor_of_shard(replication_factor: i64) -> ShardOption {
    ShardOption::new(move |shard| {
        let Ok(replication_factor) = usize::try_from(replication_factor) else {
            return Err(PlacementError::InvalidArgument(
                "replication factor cannot be negative",
            ));
        };
        shard.replication_factor = Some(replication_factor);
        Ok(())
    })
}

/// Replaces the shard's tags with the provided set.
pub fn with_tags_of_shard<I>(tags: I) -> ShardOption
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    let tags: BTreeSet<String> = tags.into_iter().map(Into::into).collect();
    ShardOption::new(move |shard| {
        shard.tags = tags.clone();
        Ok(())
    })
}

/// Adds tags to the shard, keeping existing ones.
pub fn add_tags_to_shard<I>(tags: I) -> ShardOption
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    let tags: BTreeSet<String> = tags.into_iter().map(Into::into).collect();
    ShardOption::new(move |shard| {
        shard.tags.extend(tags.iter().cloned());
        Ok(())
    })
}

/// Removes every tag from the shard.
pub fn remove_all_tags_of_shard() -> ShardOption {
    ShardOption::new(|shard| {
        shard.tags.clear();
        Ok(())
    })
}

/// Sets or overwrites the amount of a resource one replica of the shard demands.
pub fn with_demand_of_shard(resource: Resource, amount: i64) -> ShardOption {
    ShardOption::new(move |shard| {
        if amount < 0 {
            return Err(PlacementError::InvalidArgument(
                "demand amount cannot be negative",
            ));
        }
        shard.demands.insert(resource, amount);
        Ok(())
    })
}
