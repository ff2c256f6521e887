//! Node value type and its modifier options.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use perch_common::error::{PlacementError, PlacementResult};
use perch_common::ids::{NodeId, Resource};

/// Cluster member able to host replicas.
///
/// A node carries a membership-only tag set and a per-resource capacity map. A resource
/// missing from the map means the node is unconstrained for that resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    id: NodeId,
    tags: BTreeSet<String>,
    resources: BTreeMap<Resource, i64>,
}

impl Node {
    pub(crate) fn new(id: NodeId) -> Self {
        Self {
            id,
            tags: BTreeSet::new(),
            resources: BTreeMap::new(),
        }
    }

    /// Unique identifier of this node.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Tags this node offers to affine shards.
    #[must_use]
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Declared capacity for a resource; `None` means unconstrained.
    #[must_use]
    pub fn capacity(&self, resource: Resource) -> Option<i64> {
        self.resources.get(&resource).copied()
    }
}

/// Modifier closure mutating a [`Node`]; later options overwrite earlier ones per field.
pub struct NodeOption(Box<dyn Fn(&mut Node) -> PlacementResult<()>>);

impl NodeOption {
    fn new(apply: impl Fn(&mut Node) -> PlacementResult<()> + 'static) -> Self {
        Self(Box::new(apply))
    }

    pub(crate) fn apply(&self, node: &mut Node) -> PlacementResult<()> {
        (self.0)(node)
    }
}

impl fmt::Debug for NodeOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NodeOption")
    }
}

/// Replaces the node's tags with the provided set.
pub fn with_tags_of_node<I>(tags: I) -> NodeOption
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    let tags: BTreeSet<String> = tags.into_iter().map(Into::into).collect();
    NodeOption::new(move |node| {
        node.tags = tags.clone();
        Ok(())
    })
}

/// Adds tags to the node, keeping existing ones.
pub fn add_tags_to_node<I>(tags: I) -> NodeOption
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    let tags: BTreeSet<String> = tags.into_iter().map(Into::into).collect();
    NodeOption::new(move |node| {
        node.tags.extend(tags.iter().cloned());
        Ok(())
    })
}

/// Removes every tag from the node.
pub fn remove_all_tags_of_node() -> NodeOption {
    NodeOption::new(|node| {
        node.tags.clear();
        Ok(())
    })
}

/// Sets or overwrites the amount of a resource the node provides.
pub fn with_resource_of_node(resource: Resource, amount: i64) -> NodeOption {
    NodeOption::new(move |node| {
        if amount < 0 {
            return Err(PlacementError::InvalidArgument(
                "resource amount cannot be negative",
            ));
        }
        node.resources.insert(resource, amount);
        Ok(())
    })
}
