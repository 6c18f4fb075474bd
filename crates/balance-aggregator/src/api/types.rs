//! API types for the balance gateway

use crate::balance::BalanceResult;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Every provider's answer for one address
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddressBalanceResponse {
    /// Queried address
    pub address: String,

    /// One record per provider
    pub results: Vec<BalanceResult>,

    /// Successful record with the highest total, if any provider answered
    pub best: Option<BalanceResult>,
}

impl AddressBalanceResponse {
    pub fn new(address: impl Into<String>, results: Vec<BalanceResult>) -> Self {
        let best = results
            .iter()
            .filter(|r| !r.is_failure())
            .max_by(|a, b| a.total.total_cmp(&b.total))
            .cloned();

        Self {
            address: address.into(),
            results,
            best,
        }
    }
}

/// Request to look up several addresses at once
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct BatchBalanceRequest {
    /// Addresses to look up
    pub addresses: Vec<String>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthCheckResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,

    /// Timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Number of running provider workers
    pub workers: usize,
}

/// A configured provider
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderInfo {
    /// Name recorded as the result source
    pub name: String,

    /// Adapter kind
    pub kind: String,

    /// Whether a worker runs for it
    pub enabled: bool,

    /// Most addresses per provider call
    pub batch_limit: usize,

    /// Addresses allowed per rate window, if limited
    pub rate_limit_quota: Option<u32>,

    /// Rate window length in seconds, if limited
    pub rate_limit_period_secs: Option<u64>,
}

/// Providers listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProvidersResponse {
    pub providers: Vec<ProviderInfo>,
}
