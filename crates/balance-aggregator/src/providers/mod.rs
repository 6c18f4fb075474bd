//! # Balance Providers
//!
//! Thin adapters over third-party balance APIs. Each one answers a single
//! question: given a set of addresses, return their balances or fail. A
//! non-success status or an unreadable body is an error, never a partial
//! answer. Addresses missing from a successful answer are the dispatcher's
//! concern.

mod blockcypher;
mod blockonomics;
mod electrumx;

pub use blockcypher::Blockcypher;
pub use blockonomics::Blockonomics;
pub use electrumx::{address_to_scripthash, ElectrumX};

use crate::balance::AddressBalance;
use crate::config::{Config, ProviderConfig, ProviderKind};
use async_trait::async_trait;
use common::ServiceError;
use std::sync::Arc;
use thiserror::Error;

/// A balance data source queried in batches
#[async_trait]
pub trait BalanceProvider: Send + Sync {
    /// Name recorded as the source of every result
    fn name(&self) -> &str;

    /// Look up every address in one call
    async fn fetch_balances(&self, addresses: &[String]) -> Result<Vec<AddressBalance>, ProviderError>;
}

/// Errors a provider call can end with
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Request to {provider} failed: {source}")]
    Http {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} answered with HTTP status {status}")]
    Status { provider: String, status: u16 },

    #[error("Rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("Malformed response from {provider}: {message}")]
    Decode { provider: String, message: String },

    #[error("Electrum error: {0}")]
    Electrum(#[from] electrum::ElectrumError),

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },
}

impl ServiceError for ProviderError {}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }

    /// Whether asking again later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http { .. } | ProviderError::RateLimited { .. } => true,
            ProviderError::Status { status, .. } => *status >= 500,
            ProviderError::Electrum(e) => e.is_retryable(),
            ProviderError::Decode { .. } | ProviderError::InvalidAddress { .. } => false,
        }
    }
}

/// Map a response status onto the provider error taxonomy
pub(crate) fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited {
            provider: provider.to_string(),
        });
    }
    if !status.is_success() {
        return Err(ProviderError::Status {
            provider: provider.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response)
}

/// Read the body and decode it as JSON
pub(crate) async fn decode_json<T: serde::de::DeserializeOwned>(
    provider: &str,
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let body = response.bytes().await.map_err(|source| ProviderError::Http {
        provider: provider.to_string(),
        source,
    })?;
    serde_json::from_slice(&body).map_err(|e| ProviderError::Decode {
        provider: provider.to_string(),
        message: e.to_string(),
    })
}

/// Instantiate the adapter a provider entry asks for
pub fn build_provider(
    provider: &ProviderConfig,
    config: &Config,
    http: &reqwest::Client,
) -> Arc<dyn BalanceProvider> {
    let name = provider.name().to_string();
    match provider.kind {
        ProviderKind::Blockonomics => {
            let mut adapter = Blockonomics::new(name, http.clone());
            if let Some(url) = &provider.base_url {
                adapter = adapter.with_base_url(url);
            }
            if let Some(key) = &provider.api_key {
                adapter = adapter.with_api_key(key);
            }
            Arc::new(adapter)
        }
        ProviderKind::Blockcypher => {
            let mut adapter = Blockcypher::new(name, http.clone());
            if let Some(url) = &provider.base_url {
                adapter = adapter.with_base_url(url);
            }
            if let Some(token) = &provider.api_key {
                adapter = adapter.with_token(token);
            }
            Arc::new(adapter)
        }
        ProviderKind::Electrumx => {
            let tls = config
                .electrum
                .use_tls
                .then(electrum::default_tls_config);
            Arc::new(ElectrumX::new(
                name,
                config.electrum.nodes.clone(),
                tls,
                config.electrum.session_config(),
            ))
        }
    }
}
