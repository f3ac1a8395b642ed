// Logger configuration
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub redaction_enabled: bool,
    /// Replace redacted values with a short hash so repeated values can be correlated.
    pub hash_for_correlation: bool,
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    pub log_level: String,
    pub json: bool,
    pub with_target: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            redaction_enabled: true,
            hash_for_correlation: false,
            log_level: "info".to_string(),
            json: false,
            with_target: true,
        }
    }
}
