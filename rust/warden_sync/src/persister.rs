//! Change records and the contracts durable storage backends implement.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use warden_core::{Article, Category, Grant, Object, Role, Side, Subject, User};

use crate::error::Result;

/// Live change stream from a persister. Unbounded, so a writer publishing
/// its own change never waits on a consumer that waits on that writer.
pub type Feed<T> = mpsc::UnboundedReceiver<T>;

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeMethod {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeMethod::Insert => f.write_str("insert"),
            ChangeMethod::Update => f.write_str("update"),
            ChangeMethod::Delete => f.write_str("delete"),
        }
    }
}

/// One immediate grouping edge, on either side.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "side", rename_all = "snake_case")]
pub enum Membership {
    Subject { member: Subject, group: Role },
    Object { member: Object, group: Category },
}

impl Membership {
    pub fn subject(member: impl Into<Subject>, group: Role) -> Self {
        Membership::Subject {
            member: member.into(),
            group,
        }
    }

    pub fn object(member: impl Into<Object>, group: Category) -> Self {
        Membership::Object {
            member: member.into(),
            group,
        }
    }

    pub fn side(&self) -> Side {
        match self {
            Membership::Subject { .. } => Side::Subject,
            Membership::Object { .. } => Side::Object,
        }
    }

    /// True if the edge touches `group`, as parent or as member.
    pub fn touches_group(&self, group: &GroupRef) -> bool {
        match (self, group) {
            (Membership::Subject { member, group: g }, GroupRef::Role(role)) => {
                g == role || member.group() == Some(role)
            }
            (Membership::Object { member, group: g }, GroupRef::Category(category)) => {
                g == category || member.group() == Some(category)
            }
            _ => false,
        }
    }

    pub fn has_member(&self, individual: &IndividualRef) -> bool {
        match (self, individual) {
            (Membership::Subject { member, .. }, IndividualRef::User(user)) => {
                member.individual() == Some(user)
            }
            (Membership::Object { member, .. }, IndividualRef::Article(article)) => {
                member.individual() == Some(article)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Membership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Membership::Subject { member, group } => write!(f, "{member} in {group}"),
            Membership::Object { member, group } => write!(f, "{member} in {group}"),
        }
    }
}

/// A group to delete with every edge touching it.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupRef {
    Role(Role),
    Category(Category),
}

/// An individual to delete with every edge touching it.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndividualRef {
    User(User),
    Article(Article),
}

#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct GroupingChange {
    pub membership: Membership,
    pub method: ChangeMethod,
}

#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct PermissionChange {
    pub grant: Grant,
    pub method: ChangeMethod,
}

/// Durable store of grouping edges.
pub trait GroupingPersister: Send + Sync + 'static {
    fn insert(&self, membership: &Membership) -> impl Future<Output = Result<()>> + Send;

    fn remove(&self, membership: &Membership) -> impl Future<Output = Result<()>> + Send;

    /// Delete every edge where `group` is the parent or the member.
    fn remove_by_group(&self, group: &GroupRef) -> impl Future<Output = Result<()>> + Send;

    /// Delete every edge whose member is `individual`.
    fn remove_by_individual(
        &self,
        individual: &IndividualRef,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Full snapshot.
    fn list(&self) -> impl Future<Output = Result<Vec<Membership>>> + Send;

    /// Changes from now on, until `shutdown` flips to true.
    fn watch(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> impl Future<Output = Result<Feed<GroupingChange>>> + Send;
}

/// Durable store of permission grants.
pub trait PermissionPersister: Send + Sync + 'static {
    /// Replace the full action set stored for the pair.
    fn upsert(&self, grant: &Grant) -> impl Future<Output = Result<()>> + Send;

    fn remove(&self, subject: &Subject, object: &Object) -> impl Future<Output = Result<()>> + Send;

    /// Full snapshot.
    fn list(&self) -> impl Future<Output = Result<Vec<Grant>>> + Send;

    /// Changes from now on, until `shutdown` flips to true.
    fn watch(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> impl Future<Output = Result<Feed<PermissionChange>>> + Send;
}

impl From<Role> for GroupRef {
    fn from(role: Role) -> Self {
        GroupRef::Role(role)
    }
}

impl From<Category> for GroupRef {
    fn from(category: Category) -> Self {
        GroupRef::Category(category)
    }
}

impl From<User> for IndividualRef {
    fn from(user: User) -> Self {
        IndividualRef::User(user)
    }
}

impl From<Article> for IndividualRef {
    fn from(article: Article) -> Self {
        IndividualRef::Article(article)
    }
}
