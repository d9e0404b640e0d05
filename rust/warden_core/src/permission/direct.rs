//! The grant matrix, indexed by subject and by object.

use ahash::AHashMap;

use super::{PermissionReader, Permissions};
use crate::actions::ActionSet;
use crate::error::Result;
use crate::types::{Grant, Object, Subject};

/// (subject, object) -> actions. An empty action set is never stored.
#[derive(Debug, Clone, Default)]
pub struct DirectPermissions {
    by_subject: AHashMap<Subject, AHashMap<Object, ActionSet>>,
    by_object: AHashMap<Object, AHashMap<Subject, ActionSet>>,
}

impl DirectPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored (subject, object) entries.
    pub fn len(&self) -> usize {
        self.by_subject.values().map(|row| row.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_subject.is_empty()
    }

    fn get(&self, subject: &Subject, object: &Object) -> ActionSet {
        self.by_subject
            .get(subject)
            .and_then(|row| row.get(object))
            .copied()
            .unwrap_or_default()
    }

    fn set(&mut self, subject: &Subject, object: &Object, actions: ActionSet) {
        if actions.is_empty() {
            remove_cell(&mut self.by_subject, subject, object);
            remove_cell(&mut self.by_object, object, subject);
            return;
        }
        self.by_subject
            .entry(subject.clone())
            .or_default()
            .insert(object.clone(), actions);
        self.by_object
            .entry(object.clone())
            .or_default()
            .insert(subject.clone(), actions);
    }
}

impl PermissionReader for DirectPermissions {
    fn permitted_actions(&self, subject: &Subject, object: &Object) -> Result<ActionSet> {
        Ok(self.get(subject, object))
    }

    fn permissions_on(&self, object: &Object) -> Result<AHashMap<Subject, ActionSet>> {
        Ok(self.by_object.get(object).cloned().unwrap_or_default())
    }

    fn permissions_for(&self, subject: &Subject) -> Result<AHashMap<Object, ActionSet>> {
        Ok(self.by_subject.get(subject).cloned().unwrap_or_default())
    }
}

impl Permissions for DirectPermissions {
    fn permit(&mut self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<()> {
        let current = self.get(subject, object);
        self.set(subject, object, current | actions);
        Ok(())
    }

    fn revoke(&mut self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<()> {
        let current = self.get(subject, object);
        if current.intersection(actions).is_empty() {
            return Ok(());
        }
        self.set(subject, object, current - actions);
        Ok(())
    }

    fn remove_subject(&mut self, subject: &Subject) -> Result<()> {
        if let Some(row) = self.by_subject.remove(subject) {
            for object in row.keys() {
                remove_cell(&mut self.by_object, object, subject);
            }
        }
        Ok(())
    }

    fn remove_object(&mut self, object: &Object) -> Result<()> {
        if let Some(column) = self.by_object.remove(object) {
            for subject in column.keys() {
                remove_cell(&mut self.by_subject, subject, object);
            }
        }
        Ok(())
    }

    fn grants(&self) -> Result<Vec<Grant>> {
        Ok(self
            .by_subject
            .iter()
            .flat_map(|(subject, row)| {
                row.iter().map(move |(object, actions)| Grant {
                    subject: subject.clone(),
                    object: object.clone(),
                    actions: *actions,
                })
            })
            .collect())
    }
}

fn remove_cell<K, C>(map: &mut AHashMap<K, AHashMap<C, ActionSet>>, key: &K, cell: &C)
where
    K: std::hash::Hash + Eq,
    C: std::hash::Hash + Eq,
{
    if let Some(row) = map.get_mut(key) {
        row.remove(cell);
        if row.is_empty() {
            map.remove(key);
        }
    }
}
