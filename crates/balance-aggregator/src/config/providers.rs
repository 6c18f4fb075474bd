//! Provider selection

use serde::{Deserialize, Serialize};

/// Provider implementations available at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Blockonomics,
    Blockcypher,
    Electrumx,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Blockonomics => "blockonomics",
            ProviderKind::Blockcypher => "blockcypher",
            ProviderKind::Electrumx => "electrumx",
        }
    }

    /// Most addresses the provider accepts in one call
    pub fn default_batch_limit(&self) -> usize {
        match self {
            ProviderKind::Blockonomics => 25,
            ProviderKind::Blockcypher => 3,
            ProviderKind::Electrumx => 5,
        }
    }

    /// Published quota, if the provider has one
    pub fn default_rate_limit(&self) -> Option<RateLimitConfig> {
        match self {
            ProviderKind::Blockcypher => Some(RateLimitConfig {
                quota: 200,
                period_secs: 3600,
            }),
            ProviderKind::Blockonomics | ProviderKind::Electrumx => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Addresses allowed per window; windows are aligned to the Unix epoch in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub quota: u32,
    pub period_secs: u64,
}

/// One configured provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Name used as the result source; defaults to the kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_limit: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flush_interval_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override the provider's public endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
}

fn default_enabled() -> bool {
    true
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            enabled: true,
            name: None,
            batch_limit: None,
            flush_interval_secs: None,
            rate_limit: None,
            api_key: None,
            base_url: None,
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.kind.as_str())
    }

    pub fn batch_limit(&self) -> usize {
        self.batch_limit
            .unwrap_or_else(|| self.kind.default_batch_limit())
    }

    pub fn rate_limit(&self) -> Option<RateLimitConfig> {
        self.rate_limit.or_else(|| self.kind.default_rate_limit())
    }
}

pub(crate) fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::new(ProviderKind::Blockonomics),
        ProviderConfig::new(ProviderKind::Blockcypher),
        ProviderConfig::new(ProviderKind::Electrumx),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_defaults() {
        let blockcypher = ProviderConfig::new(ProviderKind::Blockcypher);
        assert_eq!(blockcypher.name(), "blockcypher");
        assert_eq!(blockcypher.batch_limit(), 3);
        assert_eq!(
            blockcypher.rate_limit(),
            Some(RateLimitConfig {
                quota: 200,
                period_secs: 3600
            })
        );

        assert_eq!(ProviderConfig::new(ProviderKind::Electrumx).rate_limit(), None);
    }

    #[test]
    fn test_overrides() {
        let provider: ProviderConfig = toml::from_str(
            r#"
            kind = "blockonomics"
            name = "blockonomics-eu"
            batch_limit = 10
            "#,
        )
        .unwrap();

        assert!(provider.enabled);
        assert_eq!(provider.name(), "blockonomics-eu");
        assert_eq!(provider.batch_limit(), 10);
    }
}
