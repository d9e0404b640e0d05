//! `warden_core`: embeddable role-based access control engine.
//!
//! Subjects (users, nested roles) are granted action sets on objects
//! (articles, nested categories). A decision cache keeps the effective
//! user × article actions denormalized so the common check is a map lookup.
//!
//! Modules:
//! - `types`      entity kinds, the subject/object sum types, grant records
//! - `actions`    action bitsets and per-instance action vocabularies
//! - `grouping`   transitive membership closures (direct and memoized)
//! - `permission` the grant matrix and group-resolving combinators
//! - `authorizer` the decision cache over grouping + permission engines
//! - `locked`     lock-guarded decorators for concurrent use
//! - `config`     JSON configuration for building an authorizer

pub mod actions;
pub mod authorizer;
pub mod config;
pub mod error;
pub mod grouping;
pub mod locked;
pub mod permission;
pub mod types;

pub use actions::{ActionSet, ActionVocabulary};
pub use authorizer::{Authorizer, AuthorizerBuilder, DecisionCache};
pub use config::{parse_config, AuthorizerConfig, ConfiguredAuthorizer};
pub use error::{AuthzError, Result};
pub use grouping::{
    AnyGrouping, DirectGrouping, Grouping, GroupingKind, GroupingReader, MemoizedGrouping,
};
pub use locked::{Locked, SharedAuthorizer};
pub use permission::{
    BothGrouped, DirectPermissions, ObjectGrouped, PermissionReader, Permissions, SubjectGrouped,
};
pub use types::{Article, Category, Entity, Grant, Object, Role, Side, Subject, User};
