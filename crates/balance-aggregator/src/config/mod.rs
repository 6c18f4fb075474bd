//! Configuration module for the balance aggregator

mod dispatcher;
mod nodes;
mod providers;
mod server;
mod telemetry;

pub use dispatcher::{DispatcherDefaults, RetryConfig};
pub use nodes::ElectrumConfig;
pub use providers::{ProviderConfig, ProviderKind, RateLimitConfig};
pub use server::ServerConfig;
pub use telemetry::TelemetryConfig;

use crate::dispatcher::{DispatcherConfig, RateLimit, RetryPolicy};
use common::config::{load_config_with_options, ConfigLoader, LoadOptions};
use common::ConfigurationError as ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "balance-aggregator.toml";

/// Prefix for environment overrides, e.g. `BALANCE_AGGREGATOR_SERVER__BIND_ADDRESS`
pub const ENV_PREFIX: &str = "BALANCE_AGGREGATOR";

/// Fan-out settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Addresses queried at once by multi-address lookups
    pub max_concurrent_addresses: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_addresses: 16,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Defaults for every dispatcher
    pub dispatcher: DispatcherDefaults,

    /// Fan-out configuration
    pub aggregator: AggregatorConfig,

    /// Electrum nodes for the `electrumx` provider
    pub electrum: ElectrumConfig,

    /// Telemetry configuration
    pub telemetry: TelemetryConfig,

    /// Providers to run, in order
    pub providers: Vec<ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            dispatcher: DispatcherDefaults::default(),
            aggregator: AggregatorConfig::default(),
            electrum: ElectrumConfig::default(),
            telemetry: TelemetryConfig::default(),
            providers: providers::default_providers(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment, then validate it
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match config_path {
            Some(path) => <Config as ConfigLoader<Config>>::load_from_file(path),
            None => <Config as ConfigLoader<Config>>::load(None),
        }?;
        config.validate()?;
        Ok(config)
    }

    /// Generate example configuration file
    pub fn generate_example() -> Result<String, ConfigError> {
        let config = Self::default();
        toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError {
            details: format!("Failed to serialize config: {e}"),
        })
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout)
    }

    /// Providers with `enabled = true`
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter().filter(|p| p.enabled)
    }

    /// Dispatcher settings for one provider, falling back to the shared defaults
    pub fn dispatcher_config(&self, provider: &ProviderConfig) -> DispatcherConfig {
        let defaults = &self.dispatcher;
        DispatcherConfig {
            batch_limit: provider.batch_limit(),
            flush_interval: Duration::from_secs(
                provider
                    .flush_interval_secs
                    .unwrap_or(defaults.flush_interval_secs),
            ),
            rate_limit: provider.rate_limit().map(|limit| RateLimit {
                quota: limit.quota,
                period: Duration::from_secs(limit.period_secs),
            }),
            retry: RetryPolicy::from(&defaults.retry),
            intake_capacity: defaults.intake_capacity,
            max_concurrent_batches: defaults.max_concurrent_batches,
        }
    }

    /// Reject values the dispatchers cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let defaults = &self.dispatcher;
        if defaults.intake_capacity == 0 {
            return Err(ConfigError::invalid_value(
                "dispatcher.intake_capacity",
                0,
                "must be greater than zero",
            ));
        }
        if defaults.max_concurrent_batches == 0 {
            return Err(ConfigError::invalid_value(
                "dispatcher.max_concurrent_batches",
                0,
                "must be greater than zero",
            ));
        }
        if defaults.retry.max_attempts == 0 {
            return Err(ConfigError::invalid_value(
                "dispatcher.retry.max_attempts",
                0,
                "must be at least 1",
            ));
        }
        if self.aggregator.max_concurrent_addresses == 0 {
            return Err(ConfigError::invalid_value(
                "aggregator.max_concurrent_addresses",
                0,
                "must be greater than zero",
            ));
        }

        let mut names = std::collections::HashSet::new();
        for (index, provider) in self.enabled_providers().enumerate() {
            if !names.insert(provider.name()) {
                return Err(ConfigError::invalid_value(
                    format!("providers[{index}].name"),
                    provider.name(),
                    "provider names must be unique",
                ));
            }
            if provider.batch_limit() == 0 {
                return Err(ConfigError::invalid_value(
                    format!("providers[{index}].batch_limit"),
                    0,
                    "must be greater than zero",
                ));
            }
            if let Some(limit) = provider.rate_limit() {
                if limit.quota == 0 || limit.period_secs == 0 {
                    return Err(ConfigError::invalid_value(
                        format!("providers[{index}].rate_limit"),
                        format!("{}/{}s", limit.quota, limit.period_secs),
                        "quota and period must be greater than zero",
                    ));
                }
            }
            if provider.kind == ProviderKind::Electrumx && self.electrum.nodes.is_empty() {
                return Err(ConfigError::MissingRequired {
                    key: "electrum.nodes".to_string(),
                });
            }
        }

        Ok(())
    }
}

impl ConfigLoader<Config> for Config {
    fn load(path: Option<PathBuf>) -> Result<Config, ConfigError> {
        let options = match path {
            Some(path) => LoadOptions::new(path, ENV_PREFIX),
            None => LoadOptions::new(DEFAULT_CONFIG_FILE, ENV_PREFIX),
        };
        load_config_with_options(&options)
    }

    fn load_from_file(path: &Path) -> Result<Config, ConfigError> {
        load_config_with_options(&LoadOptions::new(path, ENV_PREFIX).required())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.bind_address.port(), 8000);
        assert_eq!(config.providers.len(), 3);
        assert_eq!(config.dispatcher.flush_interval_secs, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let example = Config::generate_example().unwrap();
        let deserialized: Config = toml::from_str(&example).unwrap();

        assert_eq!(
            Config::default().server.bind_address,
            deserialized.server.bind_address
        );
        assert_eq!(deserialized.providers[1].kind, ProviderKind::Blockcypher);
        assert_eq!(deserialized.electrum.nodes.len(), 5);
    }

    #[test]
    fn test_dispatcher_config_for_provider() {
        let mut config = Config::default();
        config.providers[1].flush_interval_secs = Some(2);

        let blockcypher = config.dispatcher_config(&config.providers[1]);
        assert_eq!(blockcypher.batch_limit, 3);
        assert_eq!(blockcypher.flush_interval, Duration::from_secs(2));
        let limit = blockcypher.rate_limit.unwrap();
        assert_eq!(limit.quota, 200);
        assert_eq!(limit.period, Duration::from_secs(3600));

        let blockonomics = config.dispatcher_config(&config.providers[0]);
        assert_eq!(blockonomics.flush_interval, Duration::from_secs(5));
        assert!(blockonomics.rate_limit.is_none());
    }

    #[test]
    fn test_validation_rejects_zero_batch_limit() {
        let mut config = Config::default();
        config.providers[0].batch_limit = Some(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validation_requires_electrum_nodes() {
        let mut config = Config::default();
        config.electrum.nodes.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired { .. })
        ));

        config.providers.retain(|p| p.kind != ProviderKind::Electrumx);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_duplicate_names() {
        let mut config = Config::default();
        config
            .providers
            .push(ProviderConfig::new(ProviderKind::Blockonomics));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        let config =
            <Config as ConfigLoader<Config>>::load(Some(PathBuf::from("/nonexistent/ba.toml")))
                .unwrap();
        assert_eq!(config.providers.len(), 3);

        assert!(Config::load(Some(Path::new("/nonexistent/ba.toml"))).is_err());
    }
}
