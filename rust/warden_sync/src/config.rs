//! JSON configuration for a synced authorizer.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_core::AuthorizerConfig;

use crate::echo::DEFAULT_ECHO_TTL;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    #[serde(flatten)]
    pub authorizer: AuthorizerConfig,
    /// How long a written change waits for its echo before it is forgotten.
    pub echo_ttl_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            authorizer: AuthorizerConfig::default(),
            echo_ttl_ms: DEFAULT_ECHO_TTL.as_millis() as u64,
        }
    }
}

impl SyncConfig {
    pub fn echo_ttl(&self) -> Duration {
        Duration::from_millis(self.echo_ttl_ms)
    }
}

/// Parse a sync config from a JSON string. Authorizer fields sit at the top
/// level next to `echo_ttl_ms`.
pub fn parse_sync_config(json: &str) -> std::result::Result<SyncConfig, serde_json::Error> {
    serde_json::from_str(json)
}
