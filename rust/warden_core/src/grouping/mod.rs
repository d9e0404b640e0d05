//! Grouping engine: transitive membership over a mutable, possibly cyclic
//! graph of members and groups.
//!
//! Two interchangeable implementations satisfy the same contract:
//! [`DirectGrouping`] walks the one-hop edges on every read, and
//! [`MemoizedGrouping`] keeps full closures per node and repairs them on
//! every write. Both walk with a visited set, so cycles terminate and deep
//! hierarchies resolve exactly; an optional hop bound truncates the walk.

mod edges;

pub mod direct;
pub mod memoized;

pub use direct::DirectGrouping;
pub use memoized::MemoizedGrouping;

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Entity, Node};

/// Conventional hop bound when a depth limit is wanted.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Read half of the grouping contract.
pub trait GroupingReader<I: Node, G: Node> {
    /// True if `member` reaches `group` through one edge plus zero or more
    /// group-nesting hops.
    fn is_in(&self, member: &Entity<I, G>, group: &G) -> Result<bool>;

    /// Every group reachable from `member`.
    fn groups_of(&self, member: &Entity<I, G>) -> Result<AHashSet<G>>;

    /// Every individual reachable into `group`, recursing through nested groups.
    fn members_in(&self, group: &G) -> Result<AHashSet<I>>;

    fn immediate_groups_of(&self, member: &Entity<I, G>) -> Result<AHashSet<G>>;

    fn immediate_entities_in(&self, group: &G) -> Result<AHashSet<Entity<I, G>>>;

    /// Hop bound applied by closure reads, `None` when exact.
    fn max_depth(&self) -> Option<usize> {
        None
    }
}

/// Write half of the grouping contract.
pub trait Grouping<I: Node, G: Node>: GroupingReader<I, G> {
    /// Add `member` as an immediate member of `group`. Joining twice is a no-op.
    fn join(&mut self, member: &Entity<I, G>, group: &G) -> Result<()>;

    /// Remove an immediate edge. Fails with `NotFound` if it does not exist.
    fn leave(&mut self, member: &Entity<I, G>, group: &G) -> Result<()>;

    /// Delete `group` and every edge touching it.
    fn remove_group(&mut self, group: &G) -> Result<()>;

    /// Delete the individual `member` and every edge touching it.
    fn remove_member(&mut self, member: &I) -> Result<()>;
}

impl<I: Node, G: Node, T: GroupingReader<I, G> + ?Sized> GroupingReader<I, G> for &T {
    fn is_in(&self, member: &Entity<I, G>, group: &G) -> Result<bool> {
        (**self).is_in(member, group)
    }

    fn groups_of(&self, member: &Entity<I, G>) -> Result<AHashSet<G>> {
        (**self).groups_of(member)
    }

    fn members_in(&self, group: &G) -> Result<AHashSet<I>> {
        (**self).members_in(group)
    }

    fn immediate_groups_of(&self, member: &Entity<I, G>) -> Result<AHashSet<G>> {
        (**self).immediate_groups_of(member)
    }

    fn immediate_entities_in(&self, group: &G) -> Result<AHashSet<Entity<I, G>>> {
        (**self).immediate_entities_in(group)
    }

    fn max_depth(&self) -> Option<usize> {
        (**self).max_depth()
    }
}

/// Which implementation to build.
#[derive(Debug, Clone, Copy, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingKind {
    Direct,
    #[default]
    Memoized,
}

/// A grouping engine chosen at runtime.
#[derive(Debug, Clone)]
pub enum AnyGrouping<I: Node, G: Node> {
    Direct(DirectGrouping<I, G>),
    Memoized(MemoizedGrouping<I, G>),
}

impl<I: Node, G: Node> AnyGrouping<I, G> {
    pub fn new(kind: GroupingKind, max_depth: Option<usize>) -> Self {
        match kind {
            GroupingKind::Direct => AnyGrouping::Direct(DirectGrouping::with_max_depth(max_depth)),
            GroupingKind::Memoized => {
                AnyGrouping::Memoized(MemoizedGrouping::with_max_depth(max_depth))
            }
        }
    }

    pub fn kind(&self) -> GroupingKind {
        match self {
            AnyGrouping::Direct(_) => GroupingKind::Direct,
            AnyGrouping::Memoized(_) => GroupingKind::Memoized,
        }
    }
}

impl<I: Node, G: Node> GroupingReader<I, G> for AnyGrouping<I, G> {
    fn is_in(&self, member: &Entity<I, G>, group: &G) -> Result<bool> {
        match self {
            AnyGrouping::Direct(g) => g.is_in(member, group),
            AnyGrouping::Memoized(g) => g.is_in(member, group),
        }
    }

    fn groups_of(&self, member: &Entity<I, G>) -> Result<AHashSet<G>> {
        match self {
            AnyGrouping::Direct(g) => g.groups_of(member),
            AnyGrouping::Memoized(g) => g.groups_of(member),
        }
    }

    fn members_in(&self, group: &G) -> Result<AHashSet<I>> {
        match self {
            AnyGrouping::Direct(g) => g.members_in(group),
            AnyGrouping::Memoized(g) => g.members_in(group),
        }
    }

    fn immediate_groups_of(&self, member: &Entity<I, G>) -> Result<AHashSet<G>> {
        match self {
            AnyGrouping::Direct(g) => g.immediate_groups_of(member),
            AnyGrouping::Memoized(g) => g.immediate_groups_of(member),
        }
    }

    fn immediate_entities_in(&self, group: &G) -> Result<AHashSet<Entity<I, G>>> {
        match self {
            AnyGrouping::Direct(g) => g.immediate_entities_in(group),
            AnyGrouping::Memoized(g) => g.immediate_entities_in(group),
        }
    }

    fn max_depth(&self) -> Option<usize> {
        match self {
            AnyGrouping::Direct(g) => g.max_depth(),
            AnyGrouping::Memoized(g) => g.max_depth(),
        }
    }
}

impl<I: Node, G: Node> Grouping<I, G> for AnyGrouping<I, G> {
    fn join(&mut self, member: &Entity<I, G>, group: &G) -> Result<()> {
        match self {
            AnyGrouping::Direct(g) => g.join(member, group),
            AnyGrouping::Memoized(g) => g.join(member, group),
        }
    }

    fn leave(&mut self, member: &Entity<I, G>, group: &G) -> Result<()> {
        match self {
            AnyGrouping::Direct(g) => g.leave(member, group),
            AnyGrouping::Memoized(g) => g.leave(member, group),
        }
    }

    fn remove_group(&mut self, group: &G) -> Result<()> {
        match self {
            AnyGrouping::Direct(g) => g.remove_group(group),
            AnyGrouping::Memoized(g) => g.remove_group(group),
        }
    }

    fn remove_member(&mut self, member: &I) -> Result<()> {
        match self {
            AnyGrouping::Direct(g) => g.remove_member(member),
            AnyGrouping::Memoized(g) => g.remove_member(member),
        }
    }
}

#[cfg(test)]
mod tests;
