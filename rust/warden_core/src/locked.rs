//! Lock-guarded decorators for sharing engines across threads.
//!
//! Writers hold the exclusive lock for the whole call, including cache
//! repair, so readers never observe an engine update without its repair.

use ahash::{AHashMap, AHashSet};
use parking_lot::RwLock;

use crate::actions::{ActionSet, ActionVocabulary};
use crate::authorizer::{Authorizer, DecisionCache};
use crate::error::Result;
use crate::grouping::{Grouping, GroupingReader, MemoizedGrouping};
use crate::permission::{DirectPermissions, PermissionReader, Permissions};
use crate::types::{Article, Category, Entity, Grant, Node, Object, Role, Subject, User};

// ---------------------------------------------------------------------------
// Locked<T>
// ---------------------------------------------------------------------------

/// Any engine behind a reader-writer lock.
#[derive(Debug, Default)]
pub struct Locked<T> {
    inner: RwLock<T>,
}

impl<T> Locked<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Run `f` under the shared lock.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.read())
    }

    /// Run `f` under the exclusive lock.
    pub fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.write())
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T> From<T> for Locked<T> {
    fn from(inner: T) -> Self {
        Self::new(inner)
    }
}

impl<I: Node, G: Node, T: GroupingReader<I, G>> GroupingReader<I, G> for Locked<T> {
    fn is_in(&self, member: &Entity<I, G>, group: &G) -> Result<bool> {
        self.read(|g| g.is_in(member, group))
    }

    fn groups_of(&self, member: &Entity<I, G>) -> Result<AHashSet<G>> {
        self.read(|g| g.groups_of(member))
    }

    fn members_in(&self, group: &G) -> Result<AHashSet<I>> {
        self.read(|g| g.members_in(group))
    }

    fn immediate_groups_of(&self, member: &Entity<I, G>) -> Result<AHashSet<G>> {
        self.read(|g| g.immediate_groups_of(member))
    }

    fn immediate_entities_in(&self, group: &G) -> Result<AHashSet<Entity<I, G>>> {
        self.read(|g| g.immediate_entities_in(group))
    }

    fn max_depth(&self) -> Option<usize> {
        self.read(|g| g.max_depth())
    }
}

impl<T: PermissionReader> PermissionReader for Locked<T> {
    fn permitted_actions(&self, subject: &Subject, object: &Object) -> Result<ActionSet> {
        self.read(|p| p.permitted_actions(subject, object))
    }

    fn shall(&self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<bool> {
        self.read(|p| p.shall(subject, object, actions))
    }

    fn permissions_on(&self, object: &Object) -> Result<AHashMap<Subject, ActionSet>> {
        self.read(|p| p.permissions_on(object))
    }

    fn permissions_for(&self, subject: &Subject) -> Result<AHashMap<Object, ActionSet>> {
        self.read(|p| p.permissions_for(subject))
    }
}

/// Grouping writes through a shared reference.
impl<T> Locked<T> {
    pub fn join<I: Node, G: Node>(&self, member: &Entity<I, G>, group: &G) -> Result<()>
    where
        T: Grouping<I, G>,
    {
        self.write(|g| g.join(member, group))
    }

    pub fn leave<I: Node, G: Node>(&self, member: &Entity<I, G>, group: &G) -> Result<()>
    where
        T: Grouping<I, G>,
    {
        self.write(|g| g.leave(member, group))
    }

    pub fn remove_group<I: Node, G: Node>(&self, group: &G) -> Result<()>
    where
        T: Grouping<I, G>,
    {
        self.write(|g| g.remove_group(group))
    }

    pub fn remove_member<I: Node, G: Node>(&self, member: &I) -> Result<()>
    where
        T: Grouping<I, G>,
    {
        self.write(|g| g.remove_member(member))
    }
}

/// Permission writes through a shared reference.
impl<T: Permissions> Locked<T> {
    pub fn permit(&self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<()> {
        self.write(|p| p.permit(subject, object, actions))
    }

    pub fn revoke(&self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<()> {
        self.write(|p| p.revoke(subject, object, actions))
    }

    pub fn remove_subject(&self, subject: &Subject) -> Result<()> {
        self.write(|p| p.remove_subject(subject))
    }

    pub fn remove_object(&self, object: &Object) -> Result<()> {
        self.write(|p| p.remove_object(object))
    }

    pub fn grants(&self) -> Result<Vec<Grant>> {
        self.read(|p| p.grants())
    }
}

// ---------------------------------------------------------------------------
// SharedAuthorizer
// ---------------------------------------------------------------------------

/// The lock-guarded authorizer. Share it with `Arc`.
#[derive(Debug)]
pub struct SharedAuthorizer<
    S = MemoizedGrouping<User, Role>,
    O = MemoizedGrouping<Article, Category>,
    P = DirectPermissions,
> {
    inner: Locked<Authorizer<S, O, P>>,
}

impl SharedAuthorizer {
    pub fn new() -> Self {
        Self::from(Authorizer::new())
    }
}

impl Default for SharedAuthorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, O, P> From<Authorizer<S, O, P>> for SharedAuthorizer<S, O, P> {
    fn from(authorizer: Authorizer<S, O, P>) -> Self {
        Self {
            inner: Locked::new(authorizer),
        }
    }
}

impl<S, O, P> SharedAuthorizer<S, O, P>
where
    S: Grouping<User, Role>,
    O: Grouping<Article, Category>,
    P: Permissions,
{
    /// Run `f` under the shared lock, for multi-step reads that must see
    /// one consistent state.
    pub fn read<R>(&self, f: impl FnOnce(&Authorizer<S, O, P>) -> R) -> R {
        self.inner.read(f)
    }

    /// Run `f` under the exclusive lock, for multi-step writes that must
    /// not interleave with other callers.
    pub fn write<R>(&self, f: impl FnOnce(&mut Authorizer<S, O, P>) -> R) -> R {
        self.inner.write(f)
    }

    pub fn into_inner(self) -> Authorizer<S, O, P> {
        self.inner.into_inner()
    }

    // Writes

    pub fn subject_join(&self, member: &Subject, role: &Role) -> Result<()> {
        self.write(|a| a.subject_join(member, role))
    }

    pub fn subject_leave(&self, member: &Subject, role: &Role) -> Result<()> {
        self.write(|a| a.subject_leave(member, role))
    }

    pub fn object_join(&self, member: &Object, category: &Category) -> Result<()> {
        self.write(|a| a.object_join(member, category))
    }

    pub fn object_leave(&self, member: &Object, category: &Category) -> Result<()> {
        self.write(|a| a.object_leave(member, category))
    }

    pub fn remove_user(&self, user: &User) -> Result<()> {
        self.write(|a| a.remove_user(user))
    }

    pub fn remove_role(&self, role: &Role) -> Result<()> {
        self.write(|a| a.remove_role(role))
    }

    pub fn remove_article(&self, article: &Article) -> Result<()> {
        self.write(|a| a.remove_article(article))
    }

    pub fn remove_category(&self, category: &Category) -> Result<()> {
        self.write(|a| a.remove_category(category))
    }

    pub fn permit(&self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<()> {
        self.write(|a| a.permit(subject, object, actions))
    }

    pub fn revoke(&self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<()> {
        self.write(|a| a.revoke(subject, object, actions))
    }

    pub fn set_permission(&self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<()> {
        self.write(|a| a.set_permission(subject, object, actions))
    }

    pub fn rebuild_cache(&self) -> Result<()> {
        self.write(|a| a.rebuild_cache())
    }

    // Reads

    pub fn shall(&self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<bool> {
        self.read(|a| a.shall(subject, object, actions))
    }

    pub fn permitted_actions(&self, subject: &Subject, object: &Object) -> Result<ActionSet> {
        self.read(|a| a.permitted_actions(subject, object))
    }

    pub fn permissions_on(&self, object: &Object) -> Result<AHashMap<Subject, ActionSet>> {
        self.read(|a| a.permissions_on(object))
    }

    pub fn permissions_for(&self, subject: &Subject) -> Result<AHashMap<Object, ActionSet>> {
        self.read(|a| a.permissions_for(subject))
    }

    pub fn direct_actions(&self, subject: &Subject, object: &Object) -> Result<ActionSet> {
        self.read(|a| a.direct_actions(subject, object))
    }

    pub fn grants(&self) -> Result<Vec<Grant>> {
        self.read(|a| a.grants())
    }

    pub fn is_in_role(&self, member: &Subject, role: &Role) -> Result<bool> {
        self.read(|a| a.is_in_role(member, role))
    }

    pub fn roles_of(&self, member: &Subject) -> Result<AHashSet<Role>> {
        self.read(|a| a.roles_of(member))
    }

    pub fn users_in(&self, role: &Role) -> Result<AHashSet<User>> {
        self.read(|a| a.users_in(role))
    }

    pub fn immediate_roles_of(&self, member: &Subject) -> Result<AHashSet<Role>> {
        self.read(|a| a.immediate_roles_of(member))
    }

    pub fn immediate_members_of_role(&self, role: &Role) -> Result<AHashSet<Subject>> {
        self.read(|a| a.immediate_members_of_role(role))
    }

    pub fn is_in_category(&self, member: &Object, category: &Category) -> Result<bool> {
        self.read(|a| a.is_in_category(member, category))
    }

    pub fn categories_of(&self, member: &Object) -> Result<AHashSet<Category>> {
        self.read(|a| a.categories_of(member))
    }

    pub fn articles_in(&self, category: &Category) -> Result<AHashSet<Article>> {
        self.read(|a| a.articles_in(category))
    }

    pub fn immediate_categories_of(&self, member: &Object) -> Result<AHashSet<Category>> {
        self.read(|a| a.immediate_categories_of(member))
    }

    pub fn immediate_members_of_category(&self, category: &Category) -> Result<AHashSet<Object>> {
        self.read(|a| a.immediate_members_of_category(category))
    }

    /// Snapshot of the decision cache.
    pub fn cache(&self) -> DecisionCache {
        self.read(|a| a.cache().clone())
    }

    pub fn vocabulary(&self) -> ActionVocabulary {
        self.read(|a| a.vocabulary().clone())
    }
}
