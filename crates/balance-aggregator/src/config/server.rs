//! Server configuration

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Request timeout in seconds
    pub request_timeout: u64,

    /// Largest address list accepted by the batch endpoint
    pub max_addresses_per_request: usize,

    /// CORS allowed origins
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8000)),
            request_timeout: 60,
            max_addresses_per_request: 100,
            cors_origins: vec!["*".to_string()],
        }
    }
}
