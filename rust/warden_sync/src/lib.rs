//! `warden_sync`: keeps a [`warden_core`] authorizer in step with durable
//! storage.
//!
//! At startup the full membership and grant snapshots are replayed into the
//! authorizer; afterwards a background task per persister applies the live
//! change feed through the same locked write path as direct callers. Writes
//! issued by this process are remembered briefly so their echoes on the
//! feed are dropped instead of re-applied.
//!
//! Modules:
//! - `persister` change records and the async persister contracts
//! - `echo`      short-lived pending-change sets for echo suppression
//! - `synced`    the synced authorizer and its feed consumers
//! - `memory`    in-memory persisters with change-stream semantics
//! - `config`    JSON configuration

pub mod config;
pub mod echo;
pub mod error;
pub mod memory;
pub mod persister;
pub mod synced;

pub use config::{parse_sync_config, SyncConfig};
pub use echo::{PendingChanges, PermissionEcho};
pub use error::{Result, SyncError};
pub use memory::{MemoryGroupingPersister, MemoryPermissionPersister};
pub use persister::{
    ChangeMethod, Feed, GroupRef, GroupingChange, GroupingPersister, IndividualRef, Membership,
    PermissionChange, PermissionPersister,
};
pub use synced::SyncedAuthorizer;
