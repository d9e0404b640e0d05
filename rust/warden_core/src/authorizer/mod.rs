//! The authorizer: grouping engines plus a permission engine, fronted by a
//! denormalized user × article decision cache.
//!
//! Every mutation updates the engines and then repairs the cache before it
//! returns, so `cache[user][article]` always equals what full resolution
//! would compute from scratch. Additive changes (joins, permits) fold their
//! delta into the affected cells; subtractive ones (leaves, revokes,
//! removals) recompute the affected cells because another path may still
//! grant the same actions.
//!
//! A failure partway through a fan-out leaves earlier cells repaired and
//! later ones stale. Callers recover with [`Authorizer::rebuild_cache`] or a
//! reload from the persister snapshot.

mod cache;

pub use cache::DecisionCache;

use ahash::{AHashMap, AHashSet};
use tracing::debug;

use crate::actions::{ActionSet, ActionVocabulary};
use crate::error::{AuthzError, Result};
use crate::grouping::{Grouping, GroupingReader, MemoizedGrouping};
use crate::permission::{
    BothGrouped, DirectPermissions, ObjectGrouped, PermissionReader, Permissions, SubjectGrouped,
};
use crate::types::{Article, Category, Entity, Grant, Object, Role, Side, Subject, User};

/// Decision cache over optional subject/object grouping engines and a
/// permission engine.
#[derive(Debug, Clone)]
pub struct Authorizer<
    S = MemoizedGrouping<User, Role>,
    O = MemoizedGrouping<Article, Category>,
    P = DirectPermissions,
> {
    subjects: Option<S>,
    objects: Option<O>,
    permissions: P,
    vocabulary: ActionVocabulary,
    cache: DecisionCache,
}

impl Authorizer {
    /// Memoized groupings on both sides, default vocabulary, nothing granted.
    pub fn new() -> Self {
        Self {
            subjects: Some(MemoizedGrouping::new()),
            objects: Some(MemoizedGrouping::new()),
            permissions: DirectPermissions::new(),
            vocabulary: ActionVocabulary::default(),
            cache: DecisionCache::new(),
        }
    }

    /// Starts with no groupings, an empty matrix and the default vocabulary.
    pub fn builder() -> AuthorizerBuilder {
        AuthorizerBuilder {
            subjects: None,
            objects: None,
            permissions: DirectPermissions::new(),
            vocabulary: ActionVocabulary::default(),
        }
    }
}

impl Default for Authorizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Wires engines into an [`Authorizer`]. Each `with_*` call may change the
/// engine type.
#[derive(Debug)]
pub struct AuthorizerBuilder<
    S = MemoizedGrouping<User, Role>,
    O = MemoizedGrouping<Article, Category>,
    P = DirectPermissions,
> {
    subjects: Option<S>,
    objects: Option<O>,
    permissions: P,
    vocabulary: ActionVocabulary,
}

impl<S, O, P> AuthorizerBuilder<S, O, P> {
    pub fn with_subject_grouping<S2>(self, subjects: S2) -> AuthorizerBuilder<S2, O, P> {
        AuthorizerBuilder {
            subjects: Some(subjects),
            objects: self.objects,
            permissions: self.permissions,
            vocabulary: self.vocabulary,
        }
    }

    pub fn with_object_grouping<O2>(self, objects: O2) -> AuthorizerBuilder<S, O2, P> {
        AuthorizerBuilder {
            subjects: self.subjects,
            objects: Some(objects),
            permissions: self.permissions,
            vocabulary: self.vocabulary,
        }
    }

    pub fn with_permissions<P2>(self, permissions: P2) -> AuthorizerBuilder<S, O, P2> {
        AuthorizerBuilder {
            subjects: self.subjects,
            objects: self.objects,
            permissions,
            vocabulary: self.vocabulary,
        }
    }

    pub fn with_vocabulary(mut self, vocabulary: ActionVocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    /// Drop the subject grouping; role arguments will then be rejected.
    pub fn without_subject_grouping(mut self) -> Self {
        self.subjects = None;
        self
    }

    /// Drop the object grouping; category arguments will then be rejected.
    pub fn without_object_grouping(mut self) -> Self {
        self.objects = None;
        self
    }
}

impl<S, O, P> AuthorizerBuilder<S, O, P>
where
    S: Grouping<User, Role>,
    O: Grouping<Article, Category>,
    P: Permissions,
{
    /// Fails if the engines hold group-typed grants on a side with no
    /// grouping configured.
    pub fn build(self) -> Result<Authorizer<S, O, P>> {
        let mut authorizer = Authorizer {
            subjects: self.subjects,
            objects: self.objects,
            permissions: self.permissions,
            vocabulary: self.vocabulary,
            cache: DecisionCache::new(),
        };
        authorizer.rebuild_cache()?;
        Ok(authorizer)
    }
}

/// Permission resolution matching whichever groupings are configured.
enum Resolver<'a, S, O, P> {
    Direct(&'a P),
    Subjects(SubjectGrouped<&'a P, &'a S>),
    Objects(ObjectGrouped<&'a P, &'a O>),
    Both(BothGrouped<&'a P, &'a S, &'a O>),
}

impl<S, O, P> PermissionReader for Resolver<'_, S, O, P>
where
    S: GroupingReader<User, Role>,
    O: GroupingReader<Article, Category>,
    P: PermissionReader,
{
    fn permitted_actions(&self, subject: &Subject, object: &Object) -> Result<ActionSet> {
        match self {
            Resolver::Direct(p) => p.permitted_actions(subject, object),
            Resolver::Subjects(p) => p.permitted_actions(subject, object),
            Resolver::Objects(p) => p.permitted_actions(subject, object),
            Resolver::Both(p) => p.permitted_actions(subject, object),
        }
    }

    fn shall(&self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<bool> {
        match self {
            Resolver::Direct(p) => p.shall(subject, object, actions),
            Resolver::Subjects(p) => p.shall(subject, object, actions),
            Resolver::Objects(p) => p.shall(subject, object, actions),
            Resolver::Both(p) => p.shall(subject, object, actions),
        }
    }

    fn permissions_on(&self, object: &Object) -> Result<AHashMap<Subject, ActionSet>> {
        match self {
            Resolver::Direct(p) => p.permissions_on(object),
            Resolver::Subjects(p) => p.permissions_on(object),
            Resolver::Objects(p) => p.permissions_on(object),
            Resolver::Both(p) => p.permissions_on(object),
        }
    }

    fn permissions_for(&self, subject: &Subject) -> Result<AHashMap<Object, ActionSet>> {
        match self {
            Resolver::Direct(p) => p.permissions_for(subject),
            Resolver::Subjects(p) => p.permissions_for(subject),
            Resolver::Objects(p) => p.permissions_for(subject),
            Resolver::Both(p) => p.permissions_for(subject),
        }
    }
}

impl<S, O, P> Authorizer<S, O, P>
where
    S: Grouping<User, Role>,
    O: Grouping<Article, Category>,
    P: Permissions,
{
    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn subject_grouping(&self) -> Option<&S> {
        self.subjects.as_ref()
    }

    pub fn object_grouping(&self) -> Option<&O> {
        self.objects.as_ref()
    }

    pub fn permissions(&self) -> &P {
        &self.permissions
    }

    pub fn vocabulary(&self) -> &ActionVocabulary {
        &self.vocabulary
    }

    /// The denormalized user × article table.
    pub fn cache(&self) -> &DecisionCache {
        &self.cache
    }

    fn resolver(&self) -> Resolver<'_, S, O, P> {
        let p = &self.permissions;
        match (&self.subjects, &self.objects) {
            (None, None) => Resolver::Direct(p),
            (Some(s), None) => Resolver::Subjects(SubjectGrouped::new(p, s, &self.vocabulary)),
            (None, Some(o)) => Resolver::Objects(ObjectGrouped::new(p, o, &self.vocabulary)),
            (Some(s), Some(o)) => Resolver::Both(BothGrouped::new(p, s, o, &self.vocabulary)),
        }
    }

    fn roles(&self) -> Result<&S> {
        self.subjects
            .as_ref()
            .ok_or(AuthzError::GroupingNotConfigured(Side::Subject))
    }

    fn roles_mut(&mut self) -> Result<&mut S> {
        self.subjects
            .as_mut()
            .ok_or(AuthzError::GroupingNotConfigured(Side::Subject))
    }

    fn categories(&self) -> Result<&O> {
        self.objects
            .as_ref()
            .ok_or(AuthzError::GroupingNotConfigured(Side::Object))
    }

    fn categories_mut(&mut self) -> Result<&mut O> {
        self.objects
            .as_mut()
            .ok_or(AuthzError::GroupingNotConfigured(Side::Object))
    }

    fn check_subject(&self, subject: &Subject) -> Result<()> {
        if subject.is_group() {
            self.roles()?;
        }
        Ok(())
    }

    fn check_object(&self, object: &Object) -> Result<()> {
        if object.is_group() {
            self.categories()?;
        }
        Ok(())
    }

    /// Users the subject stands for: itself, or everyone inside the role.
    fn users_of(&self, subject: &Subject) -> Result<AHashSet<User>> {
        match subject {
            Entity::Individual(user) => Ok(AHashSet::from_iter([user.clone()])),
            Entity::Group(role) => self.roles()?.members_in(role),
        }
    }

    /// Articles the object stands for: itself, or everything in the category.
    fn articles_of(&self, object: &Object) -> Result<AHashSet<Article>> {
        match object {
            Entity::Individual(article) => Ok(AHashSet::from_iter([article.clone()])),
            Entity::Group(category) => self.categories()?.members_in(category),
        }
    }

    fn bounded(&self) -> bool {
        self.subjects.as_ref().is_some_and(|g| g.max_depth().is_some())
            || self.objects.as_ref().is_some_and(|g| g.max_depth().is_some())
    }

    // ------------------------------------------------------------------
    // Cache repair
    // ------------------------------------------------------------------

    /// Recompute every cell of `user` from full resolution.
    fn rebuild_user(&mut self, user: &User) -> Result<()> {
        let resolved = self
            .resolver()
            .permissions_for(&Entity::Individual(user.clone()))?;
        let row = self.expand_row(resolved)?;
        self.cache.replace_row(user, row);
        Ok(())
    }

    /// Recompute every cached cell on each of `articles`. Only current
    /// holders are visited, so this serves changes that can only take
    /// access away.
    fn refresh_articles(&mut self, articles: &AHashSet<Article>) -> Result<()> {
        for article in articles {
            let holders: Vec<User> = self
                .cache
                .holders(article)
                .map(|users| users.iter().cloned().collect())
                .unwrap_or_default();
            let object = Entity::Individual(article.clone());
            for user in holders {
                let actions = self
                    .resolver()
                    .permitted_actions(&Entity::Individual(user.clone()), &object)?;
                self.cache.set(&user, article, actions);
            }
        }
        Ok(())
    }

    /// Recompute the cells of `users` × `articles`.
    fn refresh_cells(&mut self, users: &AHashSet<User>, articles: &AHashSet<Article>) -> Result<()> {
        for user in users {
            let subject = Entity::Individual(user.clone());
            for article in articles {
                let actions = self
                    .resolver()
                    .permitted_actions(&subject, &Entity::Individual(article.clone()))?;
                self.cache.set(user, article, actions);
            }
        }
        Ok(())
    }

    /// Expand a resolved row into (article, actions) pairs.
    fn expand_row(&self, row: AHashMap<Object, ActionSet>) -> Result<AHashMap<Article, ActionSet>> {
        let mut expanded: AHashMap<Article, ActionSet> = AHashMap::new();
        for (object, actions) in row {
            for article in self.articles_of(&object)? {
                *expanded.entry(article).or_default() |= actions;
            }
        }
        Ok(expanded)
    }

    /// Expand a resolved column into (user, actions) pairs.
    fn expand_column(&self, column: AHashMap<Subject, ActionSet>) -> Result<AHashMap<User, ActionSet>> {
        let mut expanded: AHashMap<User, ActionSet> = AHashMap::new();
        for (subject, actions) in column {
            for user in self.users_of(&subject)? {
                *expanded.entry(user).or_default() |= actions;
            }
        }
        Ok(expanded)
    }

    /// Recompute the whole cache from the engines.
    pub fn rebuild_cache(&mut self) -> Result<()> {
        self.cache.clear();
        let grants = self.permissions.grants()?;
        for Grant {
            subject,
            object,
            actions,
        } in &grants
        {
            self.check_subject(subject)?;
            self.check_object(object)?;
            let users = self.users_of(subject)?;
            let articles = self.articles_of(object)?;
            for user in &users {
                for article in &articles {
                    self.cache.grant(user, article, *actions);
                }
            }
        }
        debug!(
            "Rebuilt decision cache ({} grants, {} cells)",
            grants.len(),
            self.cache.len()
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Grouping writes
    // ------------------------------------------------------------------

    /// Add `member` to `role`; every user reaching `member` gains what the
    /// role and the roles above it grant.
    pub fn subject_join(&mut self, member: &Subject, role: &Role) -> Result<()> {
        self.roles_mut()?.join(member, role)?;
        let users = self.users_of(member)?;
        debug!("{} joined {} ({} users affected)", member, role, users.len());

        if self.bounded() {
            for user in &users {
                self.rebuild_user(user)?;
            }
            return Ok(());
        }

        let inherited = self
            .resolver()
            .permissions_for(&Entity::Group(role.clone()))?;
        let gained = self.expand_row(inherited)?;
        for user in &users {
            for (article, actions) in &gained {
                self.cache.grant(user, article, *actions);
            }
        }
        Ok(())
    }

    /// Add `member` to `category`; every article inside `member` becomes
    /// reachable by whoever holds grants on the category or above it.
    pub fn object_join(&mut self, member: &Object, category: &Category) -> Result<()> {
        self.categories_mut()?.join(member, category)?;
        let articles = self.articles_of(member)?;
        debug!("{} joined {} ({} articles affected)", member, category, articles.len());

        let inherited = self
            .resolver()
            .permissions_on(&Entity::Group(category.clone()))?;
        let gained = self.expand_column(inherited)?;

        if self.bounded() {
            // The column names every user that could have gained; let full
            // resolution decide which ones did.
            let users: AHashSet<User> = gained.into_iter().map(|(user, _)| user).collect();
            return self.refresh_cells(&users, &articles);
        }

        for (user, actions) in &gained {
            for article in &articles {
                self.cache.grant(user, article, *actions);
            }
        }
        Ok(())
    }

    pub fn subject_leave(&mut self, member: &Subject, role: &Role) -> Result<()> {
        let users = self.users_of(member)?;
        self.roles_mut()?.leave(member, role)?;
        debug!("{} left {} ({} users affected)", member, role, users.len());
        for user in &users {
            self.rebuild_user(user)?;
        }
        Ok(())
    }

    pub fn object_leave(&mut self, member: &Object, category: &Category) -> Result<()> {
        let articles = self.articles_of(member)?;
        self.categories_mut()?.leave(member, category)?;
        debug!("{} left {} ({} articles affected)", member, category, articles.len());
        self.refresh_articles(&articles)
    }

    /// Delete a user with its memberships and grants.
    pub fn remove_user(&mut self, user: &User) -> Result<()> {
        if let Some(roles) = self.subjects.as_mut() {
            roles.remove_member(user)?;
        }
        self.permissions
            .remove_subject(&Entity::Individual(user.clone()))?;
        self.cache.remove_user(user);
        debug!("Removed user {}", user);
        Ok(())
    }

    /// Delete a role with its edges and grants; former members are rebuilt.
    pub fn remove_role(&mut self, role: &Role) -> Result<()> {
        let users = self.roles()?.members_in(role)?;
        self.roles_mut()?.remove_group(role)?;
        self.permissions.remove_subject(&Entity::Group(role.clone()))?;
        debug!("Removed role {} ({} users affected)", role, users.len());
        for user in &users {
            self.rebuild_user(user)?;
        }
        Ok(())
    }

    /// Delete an article with its memberships and grants.
    pub fn remove_article(&mut self, article: &Article) -> Result<()> {
        if let Some(categories) = self.objects.as_mut() {
            categories.remove_member(article)?;
        }
        self.permissions
            .remove_object(&Entity::Individual(article.clone()))?;
        self.cache.remove_article(article);
        debug!("Removed article {}", article);
        Ok(())
    }

    /// Delete a category with its edges and grants; former contents are
    /// recomputed.
    pub fn remove_category(&mut self, category: &Category) -> Result<()> {
        let articles = self.categories()?.members_in(category)?;
        self.categories_mut()?.remove_group(category)?;
        self.permissions
            .remove_object(&Entity::Group(category.clone()))?;
        debug!("Removed category {} ({} articles affected)", category, articles.len());
        self.refresh_articles(&articles)
    }

    // ------------------------------------------------------------------
    // Permission writes
    // ------------------------------------------------------------------

    /// OR `actions` into the grant and into every covered cache cell.
    pub fn permit(&mut self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<()> {
        self.check_subject(subject)?;
        self.check_object(object)?;
        self.permissions.permit(subject, object, actions)?;

        let users = self.users_of(subject)?;
        let articles = self.articles_of(object)?;
        debug!(
            "Permit {} for {} on {} ({} cells)",
            actions,
            subject,
            object,
            users.len() * articles.len()
        );
        for user in &users {
            for article in &articles {
                self.cache.grant(user, article, actions);
            }
        }
        Ok(())
    }

    /// Clear `actions` from the grant; covered cells are recomputed since
    /// another path may still grant them.
    pub fn revoke(&mut self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<()> {
        self.check_subject(subject)?;
        self.check_object(object)?;
        self.permissions.revoke(subject, object, actions)?;

        let users = self.users_of(subject)?;
        let articles = self.articles_of(object)?;
        debug!(
            "Revoke {} for {} on {} ({} cells)",
            actions,
            subject,
            object,
            users.len() * articles.len()
        );
        self.refresh_cells(&users, &articles)
    }

    /// Replace the stored grant for the pair. An empty set deletes it.
    pub fn set_permission(&mut self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<()> {
        self.check_subject(subject)?;
        self.check_object(object)?;
        let current = self.permissions.permitted_actions(subject, object)?;
        if current == actions {
            return Ok(());
        }
        self.permissions.revoke(subject, object, current - actions)?;
        self.permissions.permit(subject, object, actions - current)?;

        let users = self.users_of(subject)?;
        let articles = self.articles_of(object)?;
        debug!(
            "Set {} for {} on {} ({} cells)",
            actions,
            subject,
            object,
            users.len() * articles.len()
        );
        self.refresh_cells(&users, &articles)
    }

    // ------------------------------------------------------------------
    // Permission reads
    // ------------------------------------------------------------------

    /// Answers user × article from the cache; anything involving a group
    /// goes through full resolution.
    pub fn shall(&self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<bool> {
        self.check_subject(subject)?;
        self.check_object(object)?;
        match (subject, object) {
            (Entity::Individual(user), Entity::Individual(article)) => {
                Ok(self.cache.get(user, article).contains(actions))
            }
            _ => self.resolver().shall(subject, object, actions),
        }
    }

    pub fn permitted_actions(&self, subject: &Subject, object: &Object) -> Result<ActionSet> {
        self.check_subject(subject)?;
        self.check_object(object)?;
        match (subject, object) {
            (Entity::Individual(user), Entity::Individual(article)) => {
                Ok(self.cache.get(user, article))
            }
            _ => self.resolver().permitted_actions(subject, object),
        }
    }

    /// Subjects holding actions on `object`, including grants inherited
    /// from categories above it.
    pub fn permissions_on(&self, object: &Object) -> Result<AHashMap<Subject, ActionSet>> {
        self.check_object(object)?;
        self.resolver().permissions_on(object)
    }

    /// Objects `subject` holds actions on, including grants inherited from
    /// roles above it.
    pub fn permissions_for(&self, subject: &Subject) -> Result<AHashMap<Object, ActionSet>> {
        self.check_subject(subject)?;
        self.resolver().permissions_for(subject)
    }

    /// The stored grant for the pair, without any group resolution.
    pub fn direct_actions(&self, subject: &Subject, object: &Object) -> Result<ActionSet> {
        self.check_subject(subject)?;
        self.check_object(object)?;
        self.permissions.permitted_actions(subject, object)
    }

    pub fn grants(&self) -> Result<Vec<Grant>> {
        self.permissions.grants()
    }

    // ------------------------------------------------------------------
    // Membership reads
    // ------------------------------------------------------------------

    pub fn is_in_role(&self, member: &Subject, role: &Role) -> Result<bool> {
        self.roles()?.is_in(member, role)
    }

    pub fn roles_of(&self, member: &Subject) -> Result<AHashSet<Role>> {
        self.roles()?.groups_of(member)
    }

    pub fn users_in(&self, role: &Role) -> Result<AHashSet<User>> {
        self.roles()?.members_in(role)
    }

    pub fn immediate_roles_of(&self, member: &Subject) -> Result<AHashSet<Role>> {
        self.roles()?.immediate_groups_of(member)
    }

    pub fn immediate_members_of_role(&self, role: &Role) -> Result<AHashSet<Subject>> {
        self.roles()?.immediate_entities_in(role)
    }

    pub fn is_in_category(&self, member: &Object, category: &Category) -> Result<bool> {
        self.categories()?.is_in(member, category)
    }

    pub fn categories_of(&self, member: &Object) -> Result<AHashSet<Category>> {
        self.categories()?.groups_of(member)
    }

    pub fn articles_in(&self, category: &Category) -> Result<AHashSet<Article>> {
        self.categories()?.members_in(category)
    }

    pub fn immediate_categories_of(&self, member: &Object) -> Result<AHashSet<Category>> {
        self.categories()?.immediate_groups_of(member)
    }

    pub fn immediate_members_of_category(&self, category: &Category) -> Result<AHashSet<Object>> {
        self.categories()?.immediate_entities_in(category)
    }
}

#[cfg(test)]
mod tests;
