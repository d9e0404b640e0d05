//! Traversal-on-read grouping. Stores only one-hop edges; every closure
//! query walks the graph.

use ahash::AHashSet;

use super::edges::Edges;
use super::{Grouping, GroupingReader};
use crate::error::{AuthzError, Result};
use crate::types::{Entity, Node};

#[derive(Debug, Clone)]
pub struct DirectGrouping<I: Node, G: Node> {
    edges: Edges<I, G>,
    max_depth: Option<usize>,
}

impl<I: Node, G: Node> Default for DirectGrouping<I, G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Node, G: Node> DirectGrouping<I, G> {
    /// Unbounded traversal; cycles are cut by the visited set.
    pub fn new() -> Self {
        Self::with_max_depth(None)
    }

    pub fn with_max_depth(max_depth: Option<usize>) -> Self {
        Self {
            edges: Edges::default(),
            max_depth,
        }
    }
}

impl<I: Node, G: Node> GroupingReader<I, G> for DirectGrouping<I, G> {
    fn is_in(&self, member: &Entity<I, G>, group: &G) -> Result<bool> {
        Ok(self.edges.reaches(member, group, self.max_depth))
    }

    fn groups_of(&self, member: &Entity<I, G>) -> Result<AHashSet<G>> {
        Ok(self.edges.ancestors(member, self.max_depth))
    }

    fn members_in(&self, group: &G) -> Result<AHashSet<I>> {
        Ok(self
            .edges
            .descendants(group, self.max_depth)
            .into_iter()
            .filter_map(|e| match e {
                Entity::Individual(i) => Some(i),
                Entity::Group(_) => None,
            })
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

impl<I: Node, G: Node> Grouping<I, G> for DirectGrouping<I, G> {
    fn join(&mut self, member: &Entity<I, G>, group: &G) -> Result<()> {
        self.edges.insert(member, group);
        Ok(())
    }

    fn leave(&mut self, member: &Entity<I, G>, group: &G) -> Result<()> {
        if self.edges.remove(member, group) {
            Ok(())
        } else {
            Err(AuthzError::NotFound(format!("{member} in {group}")))
        }
    }

    fn remove_group(&mut self, group: &G) -> Result<()> {
        self.edges.remove_node(&Entity::Group(group.clone()));
        Ok(())
    }

    fn remove_member(&mut self, member: &I) -> Result<()> {
        self.edges.remove_node(&Entity::Individual(member.clone()));
        Ok(())
    }
}
