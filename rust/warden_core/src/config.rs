//! JSON configuration for building an authorizer.

use serde::{Deserialize, Serialize};

use crate::actions::ActionVocabulary;
use crate::authorizer::Authorizer;
use crate::error::Result;
use crate::grouping::{AnyGrouping, GroupingKind};
use crate::permission::DirectPermissions;
use crate::types::{Article, Category, Role, User};

/// An authorizer whose grouping engines are picked at runtime.
pub type ConfiguredAuthorizer =
    Authorizer<AnyGrouping<User, Role>, AnyGrouping<Article, Category>, DirectPermissions>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizerConfig {
    /// Engine used on both sides.
    pub grouping: GroupingKind,
    /// Resolve users through nested roles.
    pub subject_grouping: bool,
    /// Resolve articles through nested categories.
    pub object_grouping: bool,
    /// Hop bound for closure walks. Unset walks are exact.
    pub max_depth: Option<usize>,
    /// Replaces the default `read`/`write`/`exec` vocabulary.
    pub actions: Option<Vec<String>>,
}

impl Default for AuthorizerConfig {
    fn default() -> Self {
        Self {
            grouping: GroupingKind::Memoized,
            subject_grouping: true,
            object_grouping: true,
            max_depth: None,
            actions: None,
        }
    }
}

impl AuthorizerConfig {
    pub fn vocabulary(&self) -> Result<ActionVocabulary> {
        match &self.actions {
            Some(names) => ActionVocabulary::new(names.iter().cloned()),
            None => Ok(ActionVocabulary::default()),
        }
    }

    pub fn build(&self) -> Result<ConfiguredAuthorizer> {
        let mut builder = Authorizer::builder()
            .with_subject_grouping(AnyGrouping::new(self.grouping, self.max_depth))
            .with_object_grouping(AnyGrouping::new(self.grouping, self.max_depth))
            .with_permissions(DirectPermissions::new())
            .with_vocabulary(self.vocabulary()?);
        if !self.subject_grouping {
            builder = builder.without_subject_grouping();
        }
        if !self.object_grouping {
            builder = builder.without_object_grouping();
        }
        builder.build()
    }
}

/// Parse an authorizer config from a JSON string.
pub fn parse_config(json: &str) -> std::result::Result<AuthorizerConfig, serde_json::Error> {
    serde_json::from_str(json)
}
