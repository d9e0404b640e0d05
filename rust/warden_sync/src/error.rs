use thiserror::Error;
use warden_core::AuthzError;

use crate::persister::ChangeMethod;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Authz(#[from] AuthzError),

    #[error("not found in persister: {0}")]
    NotFound(String),

    #[error("unsupported change method {method} on {feed} feed")]
    UnsupportedChangeMethod {
        feed: &'static str,
        method: ChangeMethod,
    },

    #[error("persister error: {0}")]
    Persister(String),

    #[error("{0} feed closed")]
    FeedClosed(&'static str),

    #[error("feed consumer failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
