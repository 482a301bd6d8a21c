//! Reconciler configuration
//!
//! Plain values with defaults; any field omitted from a JSON document keeps
//! its default.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use types::side::BookDepth;

use crate::error::ConfigError;

/// Configuration shared by every book session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Minimum spacing between two publications of a book (default: 500ms).
    pub publish_interval_ms: u64,
    /// Wait before re-subscribing after a feed error (default: 5s).
    pub retry_delay_ms: u64,
    /// Depth used when the consumer does not pick one.
    pub default_depth: BookDepth,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            publish_interval_ms: 500,
            retry_delay_ms: 5_000,
            default_depth: BookDepth::D10,
        }
    }
}

impl ReconcilerConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_delay_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "retry_delay_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
