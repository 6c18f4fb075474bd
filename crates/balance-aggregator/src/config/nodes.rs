//! Electrum node configuration

use electrum::SessionConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Nodes the `electrumx` provider may connect to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectrumConfig {
    /// `host:port` pairs; one is picked at random per connection
    pub nodes: Vec<String>,

    /// Wrap connections in TLS
    pub use_tls: bool,

    /// Per-call deadline in seconds
    pub request_timeout_secs: u64,

    /// Keep-alive interval in seconds, 0 disables pings
    pub ping_interval_secs: u64,
}

impl Default for ElectrumConfig {
    fn default() -> Self {
        Self {
            nodes: vec![
                "electrum.emzy.de:50001".to_string(),
                "electrum.blockstream.info:50001".to_string(),
                "korea.electrum-server.com:50001".to_string(),
                "de.poiuty.com:50001".to_string(),
                "stavver.dyshek.org:50001".to_string(),
            ],
            use_tls: false,
            request_timeout_secs: 30,
            ping_interval_secs: 5,
        }
    }
}

impl ElectrumConfig {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ping_interval: (self.ping_interval_secs > 0)
                .then(|| Duration::from_secs(self.ping_interval_secs)),
            ..SessionConfig::default()
        }
    }
}
