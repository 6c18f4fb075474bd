//! Telemetry configuration

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Enable the Prometheus exporter
    pub enable_metrics: bool,

    /// Address the exporter listens on
    pub metrics_address: SocketAddr,

    /// Emit logs as JSON lines instead of human-readable text
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            metrics_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9090)),
            json_logs: true,
        }
    }
}
