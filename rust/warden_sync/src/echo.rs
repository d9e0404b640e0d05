//! Echo suppression: changes this process wrote, awaiting their reflection
//! on the watch feed.

use std::collections::VecDeque;
use std::hash::Hash;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use warden_core::{ActionSet, Object, Subject};

use crate::persister::{ChangeMethod, PermissionChange};

/// Default lifetime of a recorded echo.
pub const DEFAULT_ECHO_TTL: Duration = Duration::from_secs(30);

/// Multiset of expected echoes. Each record is consumed at most once and
/// lapses after `ttl` if the feed never delivers it.
#[derive(Debug)]
pub struct PendingChanges<K> {
    ttl: Duration,
    entries: Mutex<AHashMap<K, VecDeque<Instant>>>,
}

impl<K: Hash + Eq + Clone> Default for PendingChanges<K> {
    fn default() -> Self {
        Self::new(DEFAULT_ECHO_TTL)
    }
}

impl<K: Hash + Eq + Clone> PendingChanges<K> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(AHashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Expect `key` back on the feed.
    pub fn record(&self, key: K) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, stamps| {
            expire(stamps, now, self.ttl);
            !stamps.is_empty()
        });
        entries.entry(key).or_default().push_back(now);
    }

    /// Undo the latest `record` of `key`, after the write it announced failed.
    pub fn forget(&self, key: &K) {
        let mut entries = self.entries.lock();
        if let Some(stamps) = entries.get_mut(key) {
            stamps.pop_back();
            if stamps.is_empty() {
                entries.remove(key);
            }
        }
    }

    /// True if `key` was expected; the expectation is used up.
    pub fn consume(&self, key: &K) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let Some(stamps) = entries.get_mut(key) else {
            return false;
        };
        expire(stamps, now, self.ttl);
        let hit = stamps.pop_front().is_some();
        if stamps.is_empty() {
            entries.remove(key);
        }
        hit
    }

    /// Live (unexpired) records.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .flatten()
            .filter(|stamp| now.duration_since(**stamp) <= self.ttl)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn expire(stamps: &mut VecDeque<Instant>, now: Instant, ttl: Duration) {
    while stamps
        .front()
        .is_some_and(|stamp| now.duration_since(*stamp) > ttl)
    {
        stamps.pop_front();
    }
}

/// Echo key for permission changes. Insert and update both mean "the pair
/// now holds `actions`"; a delete carries `None`.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct PermissionEcho {
    pub subject: Subject,
    pub object: Object,
    pub actions: Option<ActionSet>,
}

impl PermissionEcho {
    pub fn stored(subject: &Subject, object: &Object, actions: ActionSet) -> Self {
        Self {
            subject: subject.clone(),
            object: object.clone(),
            actions: Some(actions),
        }
    }

    pub fn deleted(subject: &Subject, object: &Object) -> Self {
        Self {
            subject: subject.clone(),
            object: object.clone(),
            actions: None,
        }
    }
}

impl From<&PermissionChange> for PermissionEcho {
    fn from(change: &PermissionChange) -> Self {
        match change.method {
            ChangeMethod::Insert | ChangeMethod::Update => Self::stored(
                &change.grant.subject,
                &change.grant.object,
                change.grant.actions,
            ),
            ChangeMethod::Delete => Self::deleted(&change.grant.subject, &change.grant.object),
        }
    }
}
