//! Error types for the reconciliation service
//!
//! Feed errors are never fatal: a session surfaces the latest one to its
//! consumer and re-subscribes after the configured delay.

use thiserror::Error;

/// Failure of the market-data feed for one subscription
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("Feed transport error: {0}")]
    Transport(String),

    #[error("Feed stream closed")]
    Closed,

    #[error("Subscription rejected: {0}")]
    Subscribe(String),
}

/// Invalid reconciler configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_error_display() {
        let err = FeedError::Transport("connection reset".to_string());
        assert_eq!(err.to_string(), "Feed transport error: connection reset");
        assert_eq!(FeedError::Closed.to_string(), "Feed stream closed");
    }

    #[test]
    fn test_config_error_from_json() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: ConfigError = json_err.into();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
