use thiserror::Error;

use crate::types::Side;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid entity kind: expected {expected}, got {got:?}")]
    InvalidEntityKind { expected: &'static str, got: String },

    #[error("no {0} grouping configured")]
    GroupingNotConfigured(Side),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AuthzError>;
