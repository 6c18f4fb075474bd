//! Error handling shared across the workspace
//!
//! - `ServiceError` trait for consistent error bounds at crate boundaries
//! - `ConfigurationError` for everything that can go wrong while loading config
//!
//! Library crates define their own `thiserror` enums and implement
//! `ServiceError` for them; `anyhow` is reserved for the application edge.

use thiserror::Error;

/// Base trait for all errors exposed by workspace crates
///
/// Guarantees the error is thread-safe and `'static`, so it can travel
/// through spawned tasks and channels.
pub trait ServiceError: std::error::Error + Send + Sync + 'static {}

/// Configuration-related errors
///
/// These errors occur during configuration loading, parsing, or validation.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Configuration parsing failed
    #[error("Failed to parse configuration: {details}")]
    ParseError { details: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for {key}: {value} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    /// Missing required configuration
    #[error("Missing required configuration: {key}")]
    MissingRequired { key: String },
}

impl ServiceError for ConfigurationError {}

impl ConfigurationError {
    /// Shorthand for an invalid value with a reason
    pub fn invalid_value(
        key: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_display() {
        let err = ConfigurationError::invalid_value("providers[0].batch_limit", 0, "must be > 0");
        let display = err.to_string();
        assert!(display.contains("providers[0].batch_limit"));
        assert!(display.contains("must be > 0"));
    }

    #[test]
    fn test_service_error_trait() {
        fn assert_service_error(_: impl ServiceError) {}

        assert_service_error(ConfigurationError::MissingRequired {
            key: "electrum.nodes".to_string(),
        });
    }
}
