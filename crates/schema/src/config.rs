use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cache lifetimes for the schema retriever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// How long a successfully fetched class stays cached.
    pub positive_ttl_secs: u64,
    /// How long a kind the registry did not return stays known-invalid.
    pub negative_ttl_secs: u64,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        RetrieverConfig {
            positive_ttl_secs: 24 * 3600,
            negative_ttl_secs: 10 * 60,
        }
    }
}

impl RetrieverConfig {
    pub fn positive_ttl(&self) -> Duration {
        Duration::from_secs(self.positive_ttl_secs)
    }

    pub fn negative_ttl(&self) -> Duration {
        Duration::from_secs(self.negative_ttl_secs)
    }
}
