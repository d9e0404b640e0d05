//! Domain types shared across warden_core modules.

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::actions::ActionSet;
use crate::error::AuthzError;

/// Bound for anything stored as a node of a membership graph.
pub trait Node: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {}

impl<T> Node for T where T: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {}

macro_rules! entity_kind {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Prefix of the canonical `<kind>:<id>` text form.
            pub const KIND: &'static str = $kind;

            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn id(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}:{}", $kind, self.0)
            }
        }

        impl FromStr for $name {
            type Err = AuthzError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match split_key(s) {
                    Some(($kind, id)) => Ok(Self::new(id)),
                    _ => Err(AuthzError::InvalidEntityKind {
                        expected: $kind,
                        got: s.to_string(),
                    }),
                }
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

entity_kind!(
    /// An individual subject.
    User,
    "user"
);
entity_kind!(
    /// A subject group. Roles nest inside other roles.
    Role,
    "role"
);
entity_kind!(
    /// An individual object.
    Article,
    "article"
);
entity_kind!(
    /// An object group. Categories nest inside other categories.
    Category,
    "category"
);

/// Split a canonical key into `(kind, id)`.
fn split_key(s: &str) -> Option<(&str, &str)> {
    s.split_once(':')
}

/// Either an individual member or a group. The closed sum type behind
/// both [`Subject`] and [`Object`].
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity<I, G> {
    Individual(I),
    Group(G),
}

/// The actor side of a check: a user or a role.
pub type Subject = Entity<User, Role>;

/// The resource side of a check: an article or a category.
pub type Object = Entity<Article, Category>;

impl<I, G> Entity<I, G> {
    pub fn individual(&self) -> Option<&I> {
        match self {
            Entity::Individual(i) => Some(i),
            Entity::Group(_) => None,
        }
    }

    pub fn group(&self) -> Option<&G> {
        match self {
            Entity::Individual(_) => None,
            Entity::Group(g) => Some(g),
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Entity::Group(_))
    }
}

impl<I: fmt::Display, G: fmt::Display> fmt::Display for Entity<I, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Individual(i) => i.fmt(f),
            Entity::Group(g) => g.fmt(f),
        }
    }
}

impl From<User> for Subject {
    fn from(user: User) -> Self {
        Entity::Individual(user)
    }
}

impl From<Role> for Subject {
    fn from(role: Role) -> Self {
        Entity::Group(role)
    }
}

impl From<Article> for Object {
    fn from(article: Article) -> Self {
        Entity::Individual(article)
    }
}

impl From<Category> for Object {
    fn from(category: Category) -> Self {
        Entity::Group(category)
    }
}

impl FromStr for Subject {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match split_key(s) {
            Some((User::KIND, id)) => Ok(Entity::Individual(User::new(id))),
            Some((Role::KIND, id)) => Ok(Entity::Group(Role::new(id))),
            _ => Err(AuthzError::InvalidEntityKind {
                expected: "user or role",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for Object {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match split_key(s) {
            Some((Article::KIND, id)) => Ok(Entity::Individual(Article::new(id))),
            Some((Category::KIND, id)) => Ok(Entity::Group(Category::new(id))),
            _ => Err(AuthzError::InvalidEntityKind {
                expected: "article or category",
                got: s.to_string(),
            }),
        }
    }
}

/// Which half of the model an operation touches.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Subject,
    Object,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Subject => f.write_str("subject"),
            Side::Object => f.write_str("object"),
        }
    }
}

/// A stored permission entry.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    pub subject: Subject,
    pub object: Object,
    pub actions: ActionSet,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_keys_roundtrip() {
        let subject: Subject = "role:2_1".parse().unwrap();
        assert_eq!(subject, Entity::Group(Role::new("2_1")));
        assert_eq!(subject.to_string(), "role:2_1");

        let object: Object = "article:project apollo".parse().unwrap();
        assert_eq!(object, Entity::Individual(Article::new("project apollo")));
    }

    #[test]
    fn ids_may_contain_separator() {
        let user: User = "user:a:b".parse().unwrap();
        assert_eq!(user.id(), "a:b");
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let err = "article:x".parse::<Subject>().unwrap_err();
        assert!(matches!(
            err,
            AuthzError::InvalidEntityKind {
                expected: "user or role",
                ..
            }
        ));
        assert!("role:x".parse::<User>().is_err());
        assert!("no-separator".parse::<Object>().is_err());
    }

    #[test]
    fn entity_serde_is_tagged() {
        let subject = Subject::from(User::new("5"));
        let json = serde_json::to_string(&subject).unwrap();
        assert_eq!(json, r#"{"individual":"5"}"#);
        let back: Subject = serde_json::from_str(&json).unwrap();
        assert_eq!(back, subject);
    }
}
