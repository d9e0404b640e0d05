//! An authorizer kept in step with a grouping persister and a permission
//! persister.
//!
//! Writes go to the persister first and are applied locally once it
//! accepts them. Each write is recorded as a pending echo so the consumer
//! drops it when the feed reports it back; changes made by anyone else are
//! applied from the feed through the same locked authorizer.
//!
//! One async write guard serializes every write and every feed apply. A
//! write holds it from reading the current state until the local apply, so
//! concurrent writes to the same pair cannot overwrite each other.

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashSet;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use warden_core::{
    ActionSet, AnyGrouping, Article, AuthzError, Category, ConfiguredAuthorizer,
    DirectPermissions, Entity, Grant, Grouping, MemoizedGrouping, Object,
    Permissions, Role, SharedAuthorizer, Subject, User,
};

use crate::config::SyncConfig;
use crate::echo::{PendingChanges, PermissionEcho};
use crate::error::{Result, SyncError};
use crate::persister::{
    ChangeMethod, Feed, GroupRef, GroupingChange, GroupingPersister, IndividualRef, Membership,
    PermissionChange, PermissionPersister,
};

const GROUPING_FEED: &str = "grouping";
const PERMISSION_FEED: &str = "permission";

pub struct SyncedAuthorizer<
    GP,
    PP,
    S = MemoizedGrouping<User, Role>,
    O = MemoizedGrouping<Article, Category>,
    P = DirectPermissions,
> {
    authorizer: Arc<SharedAuthorizer<S, O, P>>,
    groupings: GP,
    permissions: PP,
    grouping_echoes: Arc<PendingChanges<GroupingChange>>,
    permission_echoes: Arc<PendingChanges<PermissionEcho>>,
    write_guard: Arc<Mutex<()>>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl<GP, PP>
    SyncedAuthorizer<
        GP,
        PP,
        AnyGrouping<User, Role>,
        AnyGrouping<Article, Category>,
        DirectPermissions,
    >
where
    GP: GroupingPersister,
    PP: PermissionPersister,
{
    /// Build the authorizer described by `config` and start syncing it.
    pub async fn from_config(config: &SyncConfig, groupings: GP, permissions: PP) -> Result<Self> {
        let authorizer: ConfiguredAuthorizer = config.authorizer.build()?;
        Self::start(authorizer.into(), groupings, permissions, config.echo_ttl()).await
    }
}

impl<GP, PP, S, O, P> SyncedAuthorizer<GP, PP, S, O, P>
where
    GP: GroupingPersister,
    PP: PermissionPersister,
    S: Grouping<User, Role> + Send + Sync + 'static,
    O: Grouping<Article, Category> + Send + Sync + 'static,
    P: Permissions + Send + Sync + 'static,
{
    /// Replay both snapshots into `authorizer`, then start one feed
    /// consumer per persister.
    ///
    /// Snapshots are fully applied before either watch begins, so no feed
    /// change is ever applied to a half-loaded state.
    pub async fn start(
        authorizer: SharedAuthorizer<S, O, P>,
        groupings: GP,
        permissions: PP,
        echo_ttl: Duration,
    ) -> Result<Self> {
        let authorizer = Arc::new(authorizer);

        let edges = groupings.list().await?;
        for membership in &edges {
            join(&authorizer, membership)?;
        }
        let grants = permissions.list().await?;
        for grant in &grants {
            authorizer.permit(&grant.subject, &grant.object, grant.actions)?;
        }
        info!(
            "Loaded snapshot ({} memberships, {} grants)",
            edges.len(),
            grants.len()
        );

        let (shutdown, shutdown_rx) = watch::channel(false);
        let grouping_feed = groupings.watch(shutdown_rx.clone()).await?;
        let permission_feed = permissions.watch(shutdown_rx.clone()).await?;

        let grouping_echoes = Arc::new(PendingChanges::new(echo_ttl));
        let permission_echoes = Arc::new(PendingChanges::new(echo_ttl));
        let write_guard = Arc::new(Mutex::new(()));

        let tasks = vec![
            tokio::spawn(consume(
                GROUPING_FEED,
                grouping_feed,
                shutdown_rx.clone(),
                Arc::clone(&write_guard),
                {
                    let authorizer = Arc::clone(&authorizer);
                    let echoes = Arc::clone(&grouping_echoes);
                    move |change| apply_grouping_change(&authorizer, &echoes, change)
                },
            )),
            tokio::spawn(consume(
                PERMISSION_FEED,
                permission_feed,
                shutdown_rx,
                Arc::clone(&write_guard),
                {
                    let authorizer = Arc::clone(&authorizer);
                    let echoes = Arc::clone(&permission_echoes);
                    move |change| apply_permission_change(&authorizer, &echoes, change)
                },
            )),
        ];

        Ok(Self {
            authorizer,
            groupings,
            permissions,
            grouping_echoes,
            permission_echoes,
            write_guard,
            shutdown,
            tasks,
        })
    }

    /// The locked authorizer. Reads through it are always current; writes
    /// through it bypass the persisters.
    pub fn authorizer(&self) -> &Arc<SharedAuthorizer<S, O, P>> {
        &self.authorizer
    }

    /// Changes written by this instance whose echo has not arrived yet.
    pub fn pending_echoes(&self) -> usize {
        self.grouping_echoes.len() + self.permission_echoes.len()
    }

    /// Stop both consumers and wait for them to exit.
    pub async fn shutdown(mut self) -> Result<()> {
        // Receivers may already be gone if the feeds closed.
        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            task.await?;
        }
        info!("Synced authorizer stopped");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Grouping writes
    // ------------------------------------------------------------------

    pub async fn subject_join(&self, member: &Subject, role: &Role) -> Result<()> {
        let _guard = self.write_guard.lock().await;
        if self.authorizer.immediate_roles_of(member)?.contains(role) {
            return Ok(());
        }
        let membership = Membership::subject(member.clone(), role.clone());
        self.insert_edge(&membership).await?;
        self.authorizer.subject_join(member, role)?;
        Ok(())
    }

    pub async fn subject_leave(&self, member: &Subject, role: &Role) -> Result<()> {
        let _guard = self.write_guard.lock().await;
        if !self.authorizer.immediate_roles_of(member)?.contains(role) {
            return Err(AuthzError::NotFound(format!("{member} in {role}")).into());
        }
        let membership = Membership::subject(member.clone(), role.clone());
        self.remove_edge(&membership).await?;
        self.authorizer.subject_leave(member, role)?;
        Ok(())
    }

    pub async fn object_join(&self, member: &Object, category: &Category) -> Result<()> {
        let _guard = self.write_guard.lock().await;
        if self
            .authorizer
            .immediate_categories_of(member)?
            .contains(category)
        {
            return Ok(());
        }
        let membership = Membership::object(member.clone(), category.clone());
        self.insert_edge(&membership).await?;
        self.authorizer.object_join(member, category)?;
        Ok(())
    }

    pub async fn object_leave(&self, member: &Object, category: &Category) -> Result<()> {
        let _guard = self.write_guard.lock().await;
        if !self
            .authorizer
            .immediate_categories_of(member)?
            .contains(category)
        {
            return Err(AuthzError::NotFound(format!("{member} in {category}")).into());
        }
        let membership = Membership::object(member.clone(), category.clone());
        self.remove_edge(&membership).await?;
        self.authorizer.object_leave(member, category)?;
        Ok(())
    }

    async fn insert_edge(&self, membership: &Membership) -> Result<()> {
        let echo = GroupingChange {
            membership: membership.clone(),
            method: ChangeMethod::Insert,
        };
        self.grouping_echoes.record(echo.clone());
        if let Err(e) = self.groupings.insert(membership).await {
            self.grouping_echoes.forget(&echo);
            return Err(e);
        }
        Ok(())
    }

    async fn remove_edge(&self, membership: &Membership) -> Result<()> {
        let echo = GroupingChange {
            membership: membership.clone(),
            method: ChangeMethod::Delete,
        };
        self.grouping_echoes.record(echo.clone());
        if let Err(e) = self.groupings.remove(membership).await {
            self.grouping_echoes.forget(&echo);
            return Err(e);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Entity removal
    // ------------------------------------------------------------------

    /// Delete a user with its memberships and grants, in storage and locally.
    pub async fn remove_user(&self, user: &User) -> Result<()> {
        let _guard = self.write_guard.lock().await;
        let member = Entity::Individual(user.clone());
        let edges = self.authorizer.read(|a| -> Result<Vec<Membership>> {
            let roles = match a.subject_grouping() {
                Some(g) => g.immediate_groups_of(&member)?,
                None => AHashSet::new(),
            };
            Ok(roles
                .into_iter()
                .map(|role| Membership::subject(member.clone(), role))
                .collect())
        })?;
        let grants = self.grants_naming(|g| g.subject == member)?;

        let removal = Removal::record(self, edges, &grants);
        let individual = IndividualRef::User(user.clone());
        removal
            .run(self, self.groupings.remove_by_individual(&individual), &grants)
            .await?;
        self.authorizer.remove_user(user)?;
        Ok(())
    }

    /// Delete a role with every edge touching it and its grants.
    pub async fn remove_role(&self, role: &Role) -> Result<()> {
        let _guard = self.write_guard.lock().await;
        let group = Entity::Group(role.clone());
        let mut edges: Vec<Membership> = self
            .authorizer
            .immediate_members_of_role(role)?
            .into_iter()
            .map(|member| Membership::subject(member, role.clone()))
            .collect();
        edges.extend(
            self.authorizer
                .immediate_roles_of(&group)?
                .into_iter()
                .map(|parent| Membership::subject(group.clone(), parent)),
        );
        let grants = self.grants_naming(|g| g.subject == group)?;

        let removal = Removal::record(self, edges, &grants);
        let group_ref = GroupRef::Role(role.clone());
        removal
            .run(self, self.groupings.remove_by_group(&group_ref), &grants)
            .await?;
        self.authorizer.remove_role(role)?;
        Ok(())
    }

    /// Delete an article with its memberships and grants.
    pub async fn remove_article(&self, article: &Article) -> Result<()> {
        let _guard = self.write_guard.lock().await;
        let member = Entity::Individual(article.clone());
        let edges = self.authorizer.read(|a| -> Result<Vec<Membership>> {
            let categories = match a.object_grouping() {
                Some(g) => g.immediate_groups_of(&member)?,
                None => AHashSet::new(),
            };
            Ok(categories
                .into_iter()
                .map(|category| Membership::object(member.clone(), category))
                .collect())
        })?;
        let grants = self.grants_naming(|g| g.object == member)?;

        let removal = Removal::record(self, edges, &grants);
        let individual = IndividualRef::Article(article.clone());
        removal
            .run(self, self.groupings.remove_by_individual(&individual), &grants)
            .await?;
        self.authorizer.remove_article(article)?;
        Ok(())
    }

    /// Delete a category with every edge touching it and its grants.
    pub async fn remove_category(&self, category: &Category) -> Result<()> {
        let _guard = self.write_guard.lock().await;
        let group = Entity::Group(category.clone());
        let mut edges: Vec<Membership> = self
            .authorizer
            .immediate_members_of_category(category)?
            .into_iter()
            .map(|member| Membership::object(member, category.clone()))
            .collect();
        edges.extend(
            self.authorizer
                .immediate_categories_of(&group)?
                .into_iter()
                .map(|parent| Membership::object(group.clone(), parent)),
        );
        let grants = self.grants_naming(|g| g.object == group)?;

        let removal = Removal::record(self, edges, &grants);
        let group_ref = GroupRef::Category(category.clone());
        removal
            .run(self, self.groupings.remove_by_group(&group_ref), &grants)
            .await?;
        self.authorizer.remove_category(category)?;
        Ok(())
    }

    fn grants_naming(&self, pred: impl Fn(&Grant) -> bool) -> Result<Vec<Grant>> {
        Ok(self
            .authorizer
            .grants()?
            .into_iter()
            .filter(|g| pred(g))
            .collect())
    }

    // ------------------------------------------------------------------
    // Permission writes
    // ------------------------------------------------------------------

    /// Add `actions` to the stored grant for the pair.
    pub async fn permit(&self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<()> {
        let _guard = self.write_guard.lock().await;
        let current = self.authorizer.direct_actions(subject, object)?;
        self.store(subject, object, current, current | actions).await
    }

    /// Clear `actions` from the stored grant for the pair.
    pub async fn revoke(&self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<()> {
        let _guard = self.write_guard.lock().await;
        let current = self.authorizer.direct_actions(subject, object)?;
        self.store(subject, object, current, current - actions).await
    }

    /// Replace the stored grant for the pair. An empty set deletes it.
    pub async fn set_permission(
        &self,
        subject: &Subject,
        object: &Object,
        actions: ActionSet,
    ) -> Result<()> {
        let _guard = self.write_guard.lock().await;
        let current = self.authorizer.direct_actions(subject, object)?;
        self.store(subject, object, current, actions).await
    }

    async fn store(
        &self,
        subject: &Subject,
        object: &Object,
        current: ActionSet,
        next: ActionSet,
    ) -> Result<()> {
        if next == current {
            return Ok(());
        }
        let written = if next.is_empty() {
            let echo = PermissionEcho::deleted(subject, object);
            self.permission_echoes.record(echo.clone());
            (self.permissions.remove(subject, object).await, echo)
        } else {
            let echo = PermissionEcho::stored(subject, object, next);
            self.permission_echoes.record(echo.clone());
            let grant = Grant {
                subject: subject.clone(),
                object: object.clone(),
                actions: next,
            };
            (self.permissions.upsert(&grant).await, echo)
        };
        if let (Err(e), echo) = written {
            self.permission_echoes.forget(&echo);
            return Err(e);
        }
        self.authorizer.set_permission(subject, object, next)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn shall(&self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<bool> {
        Ok(self.authorizer.shall(subject, object, actions)?)
    }

    pub fn permitted_actions(&self, subject: &Subject, object: &Object) -> Result<ActionSet> {
        Ok(self.authorizer.permitted_actions(subject, object)?)
    }
}

impl<GP, PP, S, O, P> Drop for SyncedAuthorizer<GP, PP, S, O, P> {
    fn drop(&mut self) {
        // Consumers exit on their own once the signal flips.
        let _ = self.shutdown.send(true);
    }
}

/// Echoes recorded ahead of a bulk removal.
struct Removal {
    edges: Vec<GroupingChange>,
    grants: Vec<PermissionEcho>,
}

impl Removal {
    fn record<GP, PP, S, O, P>(
        synced: &SyncedAuthorizer<GP, PP, S, O, P>,
        edges: Vec<Membership>,
        grants: &[Grant],
    ) -> Self {
        let edges: Vec<GroupingChange> = edges
            .into_iter()
            .map(|membership| GroupingChange {
                membership,
                method: ChangeMethod::Delete,
            })
            .collect();
        let grants: Vec<PermissionEcho> = grants
            .iter()
            .map(|g| PermissionEcho::deleted(&g.subject, &g.object))
            .collect();
        for echo in &edges {
            synced.grouping_echoes.record(echo.clone());
        }
        for echo in &grants {
            synced.permission_echoes.record(echo.clone());
        }
        Self { edges, grants }
    }

    /// Issue the bulk edge removal, then one grant removal per grant. On
    /// failure every echo is forgotten, so whatever did reach storage comes
    /// back through the feed and is applied there.
    async fn run<GP, PP, S, O, P>(
        self,
        synced: &SyncedAuthorizer<GP, PP, S, O, P>,
        remove_edges: impl std::future::Future<Output = Result<()>>,
        grants: &[Grant],
    ) -> Result<()>
    where
        PP: PermissionPersister,
    {
        let mut outcome = remove_edges.await;
        if outcome.is_ok() {
            for grant in grants {
                outcome = synced.permissions.remove(&grant.subject, &grant.object).await;
                if outcome.is_err() {
                    break;
                }
            }
        }
        if let Err(e) = outcome {
            for echo in &self.edges {
                synced.grouping_echoes.forget(echo);
            }
            for echo in &self.grants {
                synced.permission_echoes.forget(echo);
            }
            return Err(e);
        }
        debug!(
            "Removed {} memberships and {} grants from storage",
            self.edges.len(),
            self.grants.len()
        );
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Feed consumers
// ----------------------------------------------------------------------

/// Apply `feed` until it closes or `shutdown` fires. Each change is applied
/// under `write_guard`. A change that fails to apply is logged and skipped.
async fn consume<T>(
    name: &'static str,
    mut feed: Feed<T>,
    mut shutdown: watch::Receiver<bool>,
    write_guard: Arc<Mutex<()>>,
    mut apply: impl FnMut(T) -> Result<()>,
) {
    info!("{} feed consumer started", name);
    loop {
        tokio::select! {
            change = feed.recv() => match change {
                Some(change) => {
                    let _guard = write_guard.lock().await;
                    if let Err(e) = apply(change) {
                        warn!("Failed to apply {} change: {}", name, e);
                    }
                }
                None => {
                    warn!("{}", SyncError::FeedClosed(name));
                    break;
                }
            },
            _ = shutdown.changed() => {
                break;
            }
        }
    }
    info!("{} feed consumer stopped", name);
}

fn join<S, O, P>(authorizer: &SharedAuthorizer<S, O, P>, membership: &Membership) -> Result<()>
where
    S: Grouping<User, Role>,
    O: Grouping<Article, Category>,
    P: Permissions,
{
    match membership {
        Membership::Subject { member, group } => authorizer.subject_join(member, group)?,
        Membership::Object { member, group } => authorizer.object_join(member, group)?,
    }
    Ok(())
}

fn apply_grouping_change<S, O, P>(
    authorizer: &SharedAuthorizer<S, O, P>,
    echoes: &PendingChanges<GroupingChange>,
    change: GroupingChange,
) -> Result<()>
where
    S: Grouping<User, Role>,
    O: Grouping<Article, Category>,
    P: Permissions,
{
    if echoes.consume(&change) {
        trace!("Dropped echo of {} {}", change.method, change.membership);
        return Ok(());
    }
    match (change.method, &change.membership) {
        (ChangeMethod::Insert, membership) => join(authorizer, membership),
        (ChangeMethod::Delete, Membership::Subject { member, group }) => {
            Ok(authorizer.subject_leave(member, group)?)
        }
        (ChangeMethod::Delete, Membership::Object { member, group }) => {
            Ok(authorizer.object_leave(member, group)?)
        }
        (method @ ChangeMethod::Update, _) => Err(SyncError::UnsupportedChangeMethod {
            feed: GROUPING_FEED,
            method,
        }),
    }
}

fn apply_permission_change<S, O, P>(
    authorizer: &SharedAuthorizer<S, O, P>,
    echoes: &PendingChanges<PermissionEcho>,
    change: PermissionChange,
) -> Result<()>
where
    S: Grouping<User, Role>,
    O: Grouping<Article, Category>,
    P: Permissions,
{
    if echoes.consume(&PermissionEcho::from(&change)) {
        trace!(
            "Dropped echo of {} {} on {}",
            change.method,
            change.grant.subject,
            change.grant.object
        );
        return Ok(());
    }
    let Grant {
        subject,
        object,
        actions,
    } = &change.grant;
    let actions = match change.method {
        ChangeMethod::Insert | ChangeMethod::Update => *actions,
        ChangeMethod::Delete => ActionSet::EMPTY,
    };
    authorizer.set_permission(subject, object, actions)?;
    Ok(())
}
