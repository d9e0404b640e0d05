//! Group-resolving combinators over an inner permission engine.
//!
//! Resolution only ever ORs grants together, so it stops as soon as the
//! accumulated set can no longer change the answer: the universal set for
//! `permitted_actions`, the requested actions for `shall`.

use ahash::AHashMap;
use std::hash::Hash;

use super::{PermissionReader, Permissions};
use crate::actions::{ActionSet, ActionVocabulary};
use crate::error::{AuthzError, Result};
use crate::grouping::GroupingReader;
use crate::types::{Article, Category, Entity, Grant, Object, Role, Side, Subject, User};

/// Running union with an early-exit test.
struct Accumulator<F> {
    acc: ActionSet,
    done: F,
}

impl<F: Fn(ActionSet) -> bool> Accumulator<F> {
    fn new(done: F) -> Self {
        Self {
            acc: ActionSet::EMPTY,
            done,
        }
    }

    /// Fold in `actions`; true once nothing more can change the answer.
    fn add(&mut self, actions: ActionSet) -> bool {
        self.acc |= actions;
        (self.done)(self.acc)
    }
}

fn merge<K: Clone + Eq + Hash>(into: &mut AHashMap<K, ActionSet>, from: AHashMap<K, ActionSet>) {
    for (key, actions) in from {
        *into.entry(key).or_default() |= actions;
    }
}

/// Categories need an object grouping to resolve through.
fn individual_object(object: &Object) -> Result<()> {
    match object {
        Entity::Individual(_) => Ok(()),
        Entity::Group(_) => Err(AuthzError::GroupingNotConfigured(Side::Object)),
    }
}

/// Roles need a subject grouping to resolve through.
fn individual_subject(subject: &Subject) -> Result<()> {
    match subject {
        Entity::Individual(_) => Ok(()),
        Entity::Group(_) => Err(AuthzError::GroupingNotConfigured(Side::Subject)),
    }
}

// ============================================================================
// Subject side
// ============================================================================

/// Adds grants held by every role above the subject.
#[derive(Debug, Clone)]
pub struct SubjectGrouped<P, G> {
    inner: P,
    subjects: G,
    all: ActionSet,
}

impl<P, G> SubjectGrouped<P, G> {
    pub fn new(inner: P, subjects: G, vocabulary: &ActionVocabulary) -> Self {
        Self {
            inner,
            subjects,
            all: vocabulary.all(),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn grouping(&self) -> &G {
        &self.subjects
    }

    pub fn grouping_mut(&mut self) -> &mut G {
        &mut self.subjects
    }

    pub fn into_parts(self) -> (P, G) {
        (self.inner, self.subjects)
    }
}

impl<P, G> SubjectGrouped<P, G>
where
    P: PermissionReader,
    G: GroupingReader<User, Role>,
{
    fn resolve(
        &self,
        subject: &Subject,
        object: &Object,
        done: impl Fn(ActionSet) -> bool,
    ) -> Result<ActionSet> {
        individual_object(object)?;
        let mut acc = Accumulator::new(done);
        if acc.add(self.inner.permitted_actions(subject, object)?) {
            return Ok(acc.acc);
        }
        for role in self.subjects.groups_of(subject)? {
            if acc.add(self.inner.permitted_actions(&Entity::Group(role), object)?) {
                break;
            }
        }
        Ok(acc.acc)
    }
}

impl<P, G> PermissionReader for SubjectGrouped<P, G>
where
    P: PermissionReader,
    G: GroupingReader<User, Role>,
{
    fn permitted_actions(&self, subject: &Subject, object: &Object) -> Result<ActionSet> {
        self.resolve(subject, object, |acc| acc.contains(self.all))
    }

    fn shall(&self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<bool> {
        Ok(self
            .resolve(subject, object, |acc| acc.contains(actions))?
            .contains(actions))
    }

    fn permissions_on(&self, object: &Object) -> Result<AHashMap<Subject, ActionSet>> {
        individual_object(object)?;
        self.inner.permissions_on(object)
    }

    fn permissions_for(&self, subject: &Subject) -> Result<AHashMap<Object, ActionSet>> {
        let mut row = self.inner.permissions_for(subject)?;
        for role in self.subjects.groups_of(subject)? {
            merge(&mut row, self.inner.permissions_for(&Entity::Group(role))?);
        }
        Ok(row)
    }
}

impl<P, G> Permissions for SubjectGrouped<P, G>
where
    P: Permissions,
    G: GroupingReader<User, Role>,
{
    fn permit(&mut self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<()> {
        individual_object(object)?;
        self.inner.permit(subject, object, actions)
    }

    fn revoke(&mut self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<()> {
        individual_object(object)?;
        self.inner.revoke(subject, object, actions)
    }

    fn remove_subject(&mut self, subject: &Subject) -> Result<()> {
        self.inner.remove_subject(subject)
    }

    fn remove_object(&mut self, object: &Object) -> Result<()> {
        self.inner.remove_object(object)
    }

    fn grants(&self) -> Result<Vec<Grant>> {
        self.inner.grants()
    }
}

// ============================================================================
// Object side
// ============================================================================

/// Adds grants held on every category above the object.
#[derive(Debug, Clone)]
pub struct ObjectGrouped<P, G> {
    inner: P,
    objects: G,
    all: ActionSet,
}

impl<P, G> ObjectGrouped<P, G> {
    pub fn new(inner: P, objects: G, vocabulary: &ActionVocabulary) -> Self {
        Self {
            inner,
            objects,
            all: vocabulary.all(),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn grouping(&self) -> &G {
        &self.objects
    }

    pub fn grouping_mut(&mut self) -> &mut G {
        &mut self.objects
    }

    pub fn into_parts(self) -> (P, G) {
        (self.inner, self.objects)
    }
}

impl<P, G> ObjectGrouped<P, G>
where
    P: PermissionReader,
    G: GroupingReader<Article, Category>,
{
    fn resolve(
        &self,
        subject: &Subject,
        object: &Object,
        done: impl Fn(ActionSet) -> bool,
    ) -> Result<ActionSet> {
        individual_subject(subject)?;
        let mut acc = Accumulator::new(done);
        if acc.add(self.inner.permitted_actions(subject, object)?) {
            return Ok(acc.acc);
        }
        for category in self.objects.groups_of(object)? {
            if acc.add(self.inner.permitted_actions(subject, &Entity::Group(category))?) {
                break;
            }
        }
        Ok(acc.acc)
    }
}

impl<P, G> PermissionReader for ObjectGrouped<P, G>
where
    P: PermissionReader,
    G: GroupingReader<Article, Category>,
{
    fn permitted_actions(&self, subject: &Subject, object: &Object) -> Result<ActionSet> {
        self.resolve(subject, object, |acc| acc.contains(self.all))
    }

    fn shall(&self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<bool> {
        Ok(self
            .resolve(subject, object, |acc| acc.contains(actions))?
            .contains(actions))
    }

    fn permissions_on(&self, object: &Object) -> Result<AHashMap<Subject, ActionSet>> {
        let mut column = self.inner.permissions_on(object)?;
        for category in self.objects.groups_of(object)? {
            merge(&mut column, self.inner.permissions_on(&Entity::Group(category))?);
        }
        Ok(column)
    }

    fn permissions_for(&self, subject: &Subject) -> Result<AHashMap<Object, ActionSet>> {
        individual_subject(subject)?;
        self.inner.permissions_for(subject)
    }
}

impl<P, G> Permissions for ObjectGrouped<P, G>
where
    P: Permissions,
    G: GroupingReader<Article, Category>,
{
    fn permit(&mut self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<()> {
        individual_subject(subject)?;
        self.inner.permit(subject, object, actions)
    }

    fn revoke(&mut self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<()> {
        individual_subject(subject)?;
        self.inner.revoke(subject, object, actions)
    }

    fn remove_subject(&mut self, subject: &Subject) -> Result<()> {
        self.inner.remove_subject(subject)
    }

    fn remove_object(&mut self, object: &Object) -> Result<()> {
        self.inner.remove_object(object)
    }

    fn grants(&self) -> Result<Vec<Grant>> {
        self.inner.grants()
    }
}

// ============================================================================
// Both sides
// ============================================================================

/// Resolves both sides plus the cross term: a grant from a role above the
/// subject on a category above the object.
#[derive(Debug, Clone)]
pub struct BothGrouped<P, S, O> {
    inner: P,
    subjects: S,
    objects: O,
    all: ActionSet,
}

impl<P, S, O> BothGrouped<P, S, O> {
    pub fn new(inner: P, subjects: S, objects: O, vocabulary: &ActionVocabulary) -> Self {
        Self {
            inner,
            subjects,
            objects,
            all: vocabulary.all(),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn subject_grouping(&self) -> &S {
        &self.subjects
    }

    pub fn subject_grouping_mut(&mut self) -> &mut S {
        &mut self.subjects
    }

    pub fn object_grouping(&self) -> &O {
        &self.objects
    }

    pub fn object_grouping_mut(&mut self) -> &mut O {
        &mut self.objects
    }

    pub fn into_parts(self) -> (P, S, O) {
        (self.inner, self.subjects, self.objects)
    }
}

impl<P, S, O> BothGrouped<P, S, O>
where
    P: PermissionReader,
    S: GroupingReader<User, Role>,
    O: GroupingReader<Article, Category>,
{
    fn resolve(
        &self,
        subject: &Subject,
        object: &Object,
        done: impl Fn(ActionSet) -> bool,
    ) -> Result<ActionSet> {
        let mut acc = Accumulator::new(done);
        if acc.add(self.inner.permitted_actions(subject, object)?) {
            return Ok(acc.acc);
        }

        let roles: Vec<Subject> = self
            .subjects
            .groups_of(subject)?
            .into_iter()
            .map(Entity::Group)
            .collect();
        for role in &roles {
            if acc.add(self.inner.permitted_actions(role, object)?) {
                return Ok(acc.acc);
            }
        }

        let categories: Vec<Object> = self
            .objects
            .groups_of(object)?
            .into_iter()
            .map(Entity::Group)
            .collect();
        for category in &categories {
            if acc.add(self.inner.permitted_actions(subject, category)?) {
                return Ok(acc.acc);
            }
        }

        for role in &roles {
            for category in &categories {
                if acc.add(self.inner.permitted_actions(role, category)?) {
                    return Ok(acc.acc);
                }
            }
        }
        Ok(acc.acc)
    }
}

impl<P, S, O> PermissionReader for BothGrouped<P, S, O>
where
    P: PermissionReader,
    S: GroupingReader<User, Role>,
    O: GroupingReader<Article, Category>,
{
    fn permitted_actions(&self, subject: &Subject, object: &Object) -> Result<ActionSet> {
        self.resolve(subject, object, |acc| acc.contains(self.all))
    }

    fn shall(&self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<bool> {
        Ok(self
            .resolve(subject, object, |acc| acc.contains(actions))?
            .contains(actions))
    }

    fn permissions_on(&self, object: &Object) -> Result<AHashMap<Subject, ActionSet>> {
        let mut column = self.inner.permissions_on(object)?;
        for category in self.objects.groups_of(object)? {
            merge(&mut column, self.inner.permissions_on(&Entity::Group(category))?);
        }
        Ok(column)
    }

    fn permissions_for(&self, subject: &Subject) -> Result<AHashMap<Object, ActionSet>> {
        let mut row = self.inner.permissions_for(subject)?;
        for role in self.subjects.groups_of(subject)? {
            merge(&mut row, self.inner.permissions_for(&Entity::Group(role))?);
        }
        Ok(row)
    }
}

impl<P, S, O> Permissions for BothGrouped<P, S, O>
where
    P: Permissions,
    S: GroupingReader<User, Role>,
    O: GroupingReader<Article, Category>,
{
    fn permit(&mut self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<()> {
        self.inner.permit(subject, object, actions)
    }

    fn revoke(&mut self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<()> {
        self.inner.revoke(subject, object, actions)
    }

    fn remove_subject(&mut self, subject: &Subject) -> Result<()> {
        self.inner.remove_subject(subject)
    }

    fn remove_object(&mut self, object: &Object) -> Result<()> {
        self.inner.remove_object(object)
    }

    fn grants(&self) -> Result<Vec<Grant>> {
        self.inner.grants()
    }
}
