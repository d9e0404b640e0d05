//! In-memory persisters with change-stream semantics.
//!
//! Every write that changes stored state is published to each live watcher.
//! Writes that change nothing publish nothing, like a document store whose
//! change stream only reports real modifications. Handles are cheap clones
//! sharing one store.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::trace;
use warden_core::{ActionSet, Grant, Object, Subject};

use crate::error::{Result, SyncError};
use crate::persister::{
    ChangeMethod, Feed, GroupRef, GroupingChange, GroupingPersister, IndividualRef, Membership,
    PermissionChange, PermissionPersister,
};

struct Watcher<T> {
    tx: mpsc::UnboundedSender<T>,
    shutdown: watch::Receiver<bool>,
}

impl<T> Watcher<T> {
    fn is_live(&self) -> bool {
        !self.tx.is_closed() && !*self.shutdown.borrow()
    }
}

/// Deliver `changes` in order to every live watcher, dropping dead ones.
/// Called under the store lock so every feed sees writes in storage order.
fn publish<T: Clone>(watchers: &mut Vec<Watcher<T>>, changes: &[T]) {
    watchers.retain(Watcher::is_live);
    for watcher in watchers.iter() {
        for change in changes {
            // A receiver dropped mid-publish just stops listening.
            if watcher.tx.send(change.clone()).is_err() {
                break;
            }
        }
    }
}

fn subscribe<T>(watchers: &mut Vec<Watcher<T>>, shutdown: watch::Receiver<bool>) -> Feed<T> {
    let (tx, rx) = mpsc::unbounded_channel();
    watchers.push(Watcher { tx, shutdown });
    rx
}

// ---------------------------------------------------------------------------
// Groupings
// ---------------------------------------------------------------------------

#[derive(Default)]
struct GroupingState {
    edges: AHashSet<Membership>,
    watchers: Vec<Watcher<GroupingChange>>,
}

#[derive(Clone, Default)]
pub struct MemoryGroupingPersister {
    state: Arc<Mutex<GroupingState>>,
}

impl MemoryGroupingPersister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed without publishing, as if written before anyone watched.
    pub fn with_edges(edges: impl IntoIterator<Item = Membership>) -> Self {
        let persister = Self::new();
        persister.state.lock().edges.extend(edges);
        persister
    }

    pub fn len(&self) -> usize {
        self.state.lock().edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().edges.is_empty()
    }

    /// Remove every edge matching `pred` and publish one delete per edge.
    fn remove_where(&self, pred: impl Fn(&Membership) -> bool) -> Result<()> {
        let mut state = self.state.lock();
        let removed: Vec<Membership> = state.edges.iter().filter(|m| pred(m)).cloned().collect();
        for m in &removed {
            state.edges.remove(m);
        }
        let changes: Vec<GroupingChange> = removed
            .into_iter()
            .map(|membership| GroupingChange {
                membership,
                method: ChangeMethod::Delete,
            })
            .collect();
        publish(&mut state.watchers, &changes);
        trace!("Bulk remove deleted {} memberships", changes.len());
        Ok(())
    }
}

impl GroupingPersister for MemoryGroupingPersister {
    async fn insert(&self, membership: &Membership) -> Result<()> {
        let mut state = self.state.lock();
        if !state.edges.insert(membership.clone()) {
            return Ok(());
        }
        let change = GroupingChange {
            membership: membership.clone(),
            method: ChangeMethod::Insert,
        };
        publish(&mut state.watchers, &[change]);
        Ok(())
    }

    async fn remove(&self, membership: &Membership) -> Result<()> {
        let mut state = self.state.lock();
        if !state.edges.remove(membership) {
            return Err(SyncError::NotFound(membership.to_string()));
        }
        let change = GroupingChange {
            membership: membership.clone(),
            method: ChangeMethod::Delete,
        };
        publish(&mut state.watchers, &[change]);
        Ok(())
    }

    async fn remove_by_group(&self, group: &GroupRef) -> Result<()> {
        self.remove_where(|m| m.touches_group(group))
    }

    async fn remove_by_individual(&self, individual: &IndividualRef) -> Result<()> {
        self.remove_where(|m| m.has_member(individual))
    }

    async fn list(&self) -> Result<Vec<Membership>> {
        Ok(self.state.lock().edges.iter().cloned().collect())
    }

    async fn watch(&self, shutdown: watch::Receiver<bool>) -> Result<Feed<GroupingChange>> {
        Ok(subscribe(&mut self.state.lock().watchers, shutdown))
    }
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PermissionState {
    grants: AHashMap<(Subject, Object), ActionSet>,
    watchers: Vec<Watcher<PermissionChange>>,
}

#[derive(Clone, Default)]
pub struct MemoryPermissionPersister {
    state: Arc<Mutex<PermissionState>>,
}

impl MemoryPermissionPersister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed without publishing, as if written before anyone watched.
    pub fn with_grants(grants: impl IntoIterator<Item = Grant>) -> Self {
        let persister = Self::new();
        {
            let mut state = persister.state.lock();
            for grant in grants {
                if !grant.actions.is_empty() {
                    state.grants.insert((grant.subject, grant.object), grant.actions);
                }
            }
        }
        persister
    }

    pub fn len(&self) -> usize {
        self.state.lock().grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().grants.is_empty()
    }
}

impl PermissionPersister for MemoryPermissionPersister {
    async fn upsert(&self, grant: &Grant) -> Result<()> {
        if grant.actions.is_empty() {
            return self.remove(&grant.subject, &grant.object).await;
        }
        let mut state = self.state.lock();
        let key = (grant.subject.clone(), grant.object.clone());
        let method = match state.grants.insert(key, grant.actions) {
            None => ChangeMethod::Insert,
            Some(previous) if previous == grant.actions => return Ok(()),
            Some(_) => ChangeMethod::Update,
        };
        let change = PermissionChange {
            grant: grant.clone(),
            method,
        };
        publish(&mut state.watchers, &[change]);
        Ok(())
    }

    async fn remove(&self, subject: &Subject, object: &Object) -> Result<()> {
        let mut state = self.state.lock();
        let Some(actions) = state.grants.remove(&(subject.clone(), object.clone())) else {
            return Err(SyncError::NotFound(format!("grant of {subject} on {object}")));
        };
        let change = PermissionChange {
            grant: Grant {
                subject: subject.clone(),
                object: object.clone(),
                actions,
            },
            method: ChangeMethod::Delete,
        };
        publish(&mut state.watchers, &[change]);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Grant>> {
        Ok(self
            .state
            .lock()
            .grants
            .iter()
            .map(|((subject, object), actions)| Grant {
                subject: subject.clone(),
                object: object.clone(),
                actions: *actions,
            })
            .collect())
    }

    async fn watch(&self, shutdown: watch::Receiver<bool>) -> Result<Feed<PermissionChange>> {
        Ok(subscribe(&mut self.state.lock().watchers, shutdown))
    }
}
