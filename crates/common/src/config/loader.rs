//! # Configuration Loader
//!
//! Figment-based configuration loading with layered support:
//! 1. Compiled defaults
//! 2. Configuration file (TOML)
//! 3. Environment variable overrides
//!
//! Nested fields use a double underscore in environment variables, e.g.
//! `BALANCE_AGGREGATOR_SERVER__BIND_ADDRESS`.

use crate::error::ConfigurationError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Configuration loading options
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Environment variable prefix, without the trailing underscore
    pub env_prefix: String,
    /// Whether the configuration file must exist
    pub require_file: bool,
}

impl LoadOptions {
    /// Options for an optional file with the given prefix
    pub fn new(config_path: impl Into<PathBuf>, env_prefix: impl Into<String>) -> Self {
        Self {
            config_path: config_path.into(),
            env_prefix: env_prefix.into(),
            require_file: false,
        }
    }

    /// Require the configuration file to exist
    pub fn required(mut self) -> Self {
        self.require_file = true;
        self
    }
}

/// Load configuration with the layered approach
pub fn load_config_with_options<T>(options: &LoadOptions) -> Result<T, ConfigurationError>
where
    T: Default + DeserializeOwned + Serialize,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()));

    let path = &options.config_path;
    if path.exists() {
        info!("Loading configuration from file: {}", path.display());
        figment = add_file_provider(figment, path)?;
    } else if options.require_file {
        return Err(ConfigurationError::FileNotFound {
            path: path.display().to_string(),
        });
    } else {
        warn!(
            "Configuration file not found: {} (using defaults)",
            path.display()
        );
    }

    debug!(
        "Loading environment variables with prefix: {}",
        options.env_prefix
    );
    figment = figment.merge(env_provider(&options.env_prefix));

    figment
        .extract()
        .map_err(|err| ConfigurationError::ParseError {
            details: err.to_string(),
        })
}

fn env_provider(prefix: &str) -> Env {
    Env::prefixed(&format!("{prefix}_")).split("__")
}

fn add_file_provider(figment: Figment, path: &Path) -> Result<Figment, ConfigurationError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("toml");

    match extension.to_lowercase().as_str() {
        "toml" => Ok(figment.merge(Toml::file(path))),
        _ => Err(ConfigurationError::ParseError {
            details: format!(
                "Unsupported configuration file format: {extension} (supported: toml)"
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        port: u16,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                name: "sample".to_string(),
                port: 8000,
            }
        }
    }

    #[test]
    fn test_missing_optional_file_uses_defaults() {
        let options = LoadOptions::new("/nonexistent/sample.toml", "COMMON_LOADER_TEST_A");
        let loaded: Sample = load_config_with_options(&options).unwrap();
        assert_eq!(loaded, Sample::default());
    }

    #[test]
    fn test_missing_required_file_fails() {
        let options =
            LoadOptions::new("/nonexistent/sample.toml", "COMMON_LOADER_TEST_B").required();
        let result: Result<Sample, _> = load_config_with_options(&options);
        assert!(matches!(
            result,
            Err(ConfigurationError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_env_overrides_defaults() {
        std::env::set_var("COMMON_LOADER_TEST_C_PORT", "9100");
        let options = LoadOptions::new("/nonexistent/sample.toml", "COMMON_LOADER_TEST_C");
        let loaded: Sample = load_config_with_options(&options).unwrap();
        std::env::remove_var("COMMON_LOADER_TEST_C_PORT");

        assert_eq!(loaded.port, 9100);
        assert_eq!(loaded.name, "sample");
    }

    #[test]
    fn test_unsupported_extension() {
        let figment = Figment::new();
        let result = add_file_provider(figment, Path::new("settings.yaml"));
        assert!(result.is_err());
    }
}
