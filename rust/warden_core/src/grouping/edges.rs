//! One-hop membership edges, indexed in both directions.

use ahash::{AHashMap, AHashSet};

use crate::types::{Entity, Node};

#[derive(Debug, Clone)]
pub(crate) struct Edges<I: Node, G: Node> {
    /// member -> groups it is an immediate member of
    parents: AHashMap<Entity<I, G>, AHashSet<G>>,
    /// group -> its immediate members
    children: AHashMap<G, AHashSet<Entity<I, G>>>,
}

impl<I: Node, G: Node> Default for Edges<I, G> {
    fn default() -> Self {
        Self {
            parents: AHashMap::new(),
            children: AHashMap::new(),
        }
    }
}

impl<I: Node, G: Node> Edges<I, G> {
    /// Returns false if the edge already existed.
    pub(crate) fn insert(&mut self, member: &Entity<I, G>, group: &G) -> bool {
        let added = self
            .parents
            .entry(member.clone())
            .or_default()
            .insert(group.clone());
        if added {
            self.children
                .entry(group.clone())
                .or_default()
                .insert(member.clone());
        }
        added
    }

    /// Returns false if the edge did not exist.
    pub(crate) fn remove(&mut self, member: &Entity<I, G>, group: &G) -> bool {
        let removed = remove_from(&mut self.parents, member, group);
        if removed {
            remove_from(&mut self.children, group, member);
        }
        removed
    }

    /// Drop `node` and every edge touching it, in either direction.
    pub(crate) fn remove_node(&mut self, node: &Entity<I, G>) {
        if let Some(groups) = self.parents.remove(node) {
            for group in groups {
                remove_from(&mut self.children, &group, node);
            }
        }
        if let Entity::Group(group) = node {
            if let Some(members) = self.children.remove(group) {
                for member in members {
                    remove_from(&mut self.parents, &member, group);
                }
            }
        }
    }

    pub(crate) fn parents_of(&self, member: &Entity<I, G>) -> AHashSet<G> {
        self.parents.get(member).cloned().unwrap_or_default()
    }

    pub(crate) fn children_of(&self, group: &G) -> AHashSet<Entity<I, G>> {
        self.children.get(group).cloned().unwrap_or_default()
    }

    /// Every group reachable upward from `start`, walking at most
    /// `max_depth` edges.
    pub(crate) fn ancestors(&self, start: &Entity<I, G>, max_depth: Option<usize>) -> AHashSet<G> {
        let mut seen: AHashSet<G> = AHashSet::new();
        let mut frontier: Vec<G> = self.parents.get(start).into_iter().flatten().cloned().collect();
        let mut depth = 1;
        while !frontier.is_empty() && within(depth, max_depth) {
            let mut next = Vec::new();
            for group in frontier {
                if !seen.insert(group.clone()) {
                    continue;
                }
                if let Some(parents) = self.parents.get(&Entity::Group(group)) {
                    next.extend(parents.iter().filter(|p| !seen.contains(*p)).cloned());
                }
            }
            frontier = next;
            depth += 1;
        }
        seen
    }

    /// Every entity (nested groups and individuals) reachable downward into
    /// `group`, walking at most `max_depth` edges.
    pub(crate) fn descendants(&self, group: &G, max_depth: Option<usize>) -> AHashSet<Entity<I, G>> {
        let mut seen: AHashSet<Entity<I, G>> = AHashSet::new();
        let mut frontier: Vec<Entity<I, G>> =
            self.children.get(group).into_iter().flatten().cloned().collect();
        let mut depth = 1;
        while !frontier.is_empty() && within(depth, max_depth) {
            let mut next = Vec::new();
            for entity in frontier {
                if !seen.insert(entity.clone()) {
                    continue;
                }
                if let Entity::Group(g) = &entity {
                    if let Some(children) = self.children.get(g) {
                        next.extend(children.iter().filter(|c| !seen.contains(*c)).cloned());
                    }
                }
            }
            frontier = next;
            depth += 1;
        }
        seen
    }

    /// Early-exit upward walk from `start` looking for `target`.
    pub(crate) fn reaches(&self, start: &Entity<I, G>, target: &G, max_depth: Option<usize>) -> bool {
        let mut seen: AHashSet<G> = AHashSet::new();
        let mut frontier: Vec<G> = self.parents.get(start).into_iter().flatten().cloned().collect();
        let mut depth = 1;
        while !frontier.is_empty() && within(depth, max_depth) {
            if frontier.iter().any(|g| g == target) {
                return true;
            }
            let mut next = Vec::new();
            for group in frontier {
                if !seen.insert(group.clone()) {
                    continue;
                }
                if let Some(parents) = self.parents.get(&Entity::Group(group)) {
                    next.extend(parents.iter().filter(|p| !seen.contains(*p)).cloned());
                }
            }
            frontier = next;
            depth += 1;
        }
        false
    }
}

fn within(depth: usize, max_depth: Option<usize>) -> bool {
    max_depth.map_or(true, |max| depth <= max)
}

fn remove_from<K, V>(map: &mut AHashMap<K, AHashSet<V>>, key: &K, value: &V) -> bool
where
    K: std::hash::Hash + Eq,
    V: std::hash::Hash + Eq,
{
    let Some(set) = map.get_mut(key) else {
        return false;
    };
    let removed = set.remove(value);
    if set.is_empty() {
        map.remove(key);
    }
    removed
}
