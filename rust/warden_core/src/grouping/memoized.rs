//! Closure-caching grouping. Keeps, per entity, every group above it and,
//! per group, every entity below it, so reads are single map lookups.
//!
//! `join` folds the new reachability into the cached closures in place:
//! everything at or below the member gains everything at or above the
//! group. `leave` and the removals rebuild the closures of every node at or
//! above / at or below the touched node from the one-hop edges instead of
//! patching them, because a removed path may or may not have been the only
//! one. Rebuilds walk the edges unconditionally even when a node is reached
//! more than once; group graphs are small next to query volume.

use ahash::{AHashMap, AHashSet};
use tracing::trace;

use super::edges::Edges;
use super::{Grouping, GroupingReader};
use crate::error::{AuthzError, Result};
use crate::types::{Entity, Node};

#[derive(Debug, Clone)]
pub struct MemoizedGrouping<I: Node, G: Node> {
    edges: Edges<I, G>,
    max_depth: Option<usize>,
    /// entity -> every group reachable upward
    groups: AHashMap<Entity<I, G>, AHashSet<G>>,
    /// group -> every entity reachable downward, nested groups included
    members: AHashMap<G, AHashSet<Entity<I, G>>>,
}

impl<I: Node, G: Node> Default for MemoizedGrouping<I, G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Node, G: Node> MemoizedGrouping<I, G> {
    pub fn new() -> Self {
        Self::with_max_depth(None)
    }

    pub fn with_max_depth(max_depth: Option<usize>) -> Self {
        Self {
            edges: Edges::default(),
            max_depth,
            groups: AHashMap::new(),
            members: AHashMap::new(),
        }
    }

    fn groups_above(&self, node: &Entity<I, G>) -> impl Iterator<Item = &G> {
        self.groups.get(node).into_iter().flatten()
    }

    fn entities_below(&self, node: &Entity<I, G>) -> impl Iterator<Item = &Entity<I, G>> {
        node.group()
            .and_then(|g| self.members.get(g))
            .into_iter()
            .flatten()
    }

    /// Nodes whose closures can change when `node` gains or loses an edge
    /// or disappears: everything cached above it and below it.
    fn around(&self, node: &Entity<I, G>) -> AHashSet<Entity<I, G>> {
        let mut affected: AHashSet<Entity<I, G>> = self.entities_below(node).cloned().collect();
        affected.extend(self.groups_above(node).cloned().map(Entity::Group));
        affected
    }

    /// Nodes whose closures can change when the edge `member -> group`
    /// appears or disappears, read from the closures before the change.
    fn affected_by_edge(&self, member: &Entity<I, G>, group: &G) -> AHashSet<Entity<I, G>> {
        let group_node = Entity::Group(group.clone());
        let mut affected = self.around(member);
        affected.extend(self.around(&group_node));
        affected.insert(member.clone());
        affected.insert(group_node);
        affected
    }

    /// Recompute both closures of every node in `affected` from the edges.
    fn rebuild(&mut self, affected: AHashSet<Entity<I, G>>) {
        trace!("Rebuilding memoized closures for {} nodes", affected.len());
        for node in affected {
            let above = self.edges.ancestors(&node, self.max_depth);
            if let Entity::Group(group) = &node {
                let below = self.edges.descendants(group, self.max_depth);
                store(&mut self.members, group.clone(), below);
            }
            store(&mut self.groups, node, above);
        }
    }
}

impl<I: Node, G: Node> GroupingReader<I, G> for MemoizedGrouping<I, G> {
    fn is_in(&self, member: &Entity<I, G>, group: &G) -> Result<bool> {
        Ok(self.groups.get(member).is_some_and(|g| g.contains(group)))
    }

    fn groups_of(&self, member: &Entity<I, G>) -> Result<AHashSet<G>> {
        Ok(self.groups.get(member).cloned().unwrap_or_default())
    }

    fn members_in(&self, group: &G) -> Result<AHashSet<I>> {
        Ok(self
            .members
            .get(group)
            .into_iter()
            .flatten()
            .filter_map(|e| e.individual().cloned())
            .collect())
    }

    fn immediate_groups_of(&self, member: &Entity<I, G>) -> Result<AHashSet<G>> {
        Ok(self.edges.parents_of(member))
    }

    fn immediate_entities_in(&self, group: &G) -> Result<AHashSet<Entity<I, G>>> {
        Ok(self.edges.children_of(group))
    }

    fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }
}

impl<I: Node, G: Node> Grouping<I, G> for MemoizedGrouping<I, G> {
    fn join(&mut self, member: &Entity<I, G>, group: &G) -> Result<()> {
        if !self.edges.insert(member, group) {
            return Ok(());
        }

        // A hop bound makes reachability distance-dependent; let the
        // bounded walk decide instead of unioning closures.
        if self.max_depth.is_some() {
            let affected = self.affected_by_edge(member, group);
            self.rebuild(affected);
            return Ok(());
        }

        let group_node = Entity::Group(group.clone());
        let mut above: AHashSet<G> = self.groups_above(&group_node).cloned().collect();
        above.insert(group.clone());
        let mut below: AHashSet<Entity<I, G>> = self.entities_below(member).cloned().collect();
        below.insert(member.clone());

        for node in &below {
            self.groups
                .entry(node.clone())
                .or_default()
                .extend(above.iter().cloned());
        }
        for g in &above {
            self.members
                .entry(g.clone())
                .or_default()
                .extend(below.iter().cloned());
        }
        Ok(())
    }

    fn leave(&mut self, member: &Entity<I, G>, group: &G) -> Result<()> {
        let affected = self.affected_by_edge(member, group);
        if !self.edges.remove(member, group) {
            return Err(AuthzError::NotFound(format!("{member} in {group}")));
        }
        self.rebuild(affected);
        Ok(())
    }

    fn remove_group(&mut self, group: &G) -> Result<()> {
        let node = Entity::Group(group.clone());
        let mut affected = self.around(&node);
        affected.remove(&node);

        self.edges.remove_node(&node);
        self.groups.remove(&node);
        self.members.remove(group);
        self.rebuild(affected);
        Ok(())
    }

    fn remove_member(&mut self, member: &I) -> Result<()> {
        let node = Entity::Individual(member.clone());
        let affected = self.around(&node);

        self.edges.remove_node(&node);
        self.groups.remove(&node);
        self.rebuild(affected);
        Ok(())
    }
}

fn store<K, V>(map: &mut AHashMap<K, AHashSet<V>>, key: K, value: AHashSet<V>)
where
    K: std::hash::Hash + Eq,
{
    if value.is_empty() {
        map.remove(&key);
    } else {
        map.insert(key, value);
    }
}
