//! blockonomics.co adapter: one POST with space-separated addresses.

use super::{check_status, decode_json, BalanceProvider, ProviderError};
use crate::balance::AddressBalance;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::trace;

pub const DEFAULT_BASE_URL: &str = "https://www.blockonomics.co";

#[derive(Debug, Serialize)]
struct BalanceQuery {
    addr: String,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    #[serde(default)]
    response: Vec<BalanceEntry>,
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    addr: String,
    #[serde(default)]
    confirmed: f64,
    #[serde(default)]
    unconfirmed: f64,
}

pub struct Blockonomics {
    name: String,
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl Blockonomics {
    pub fn new(name: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[async_trait]
impl BalanceProvider for Blockonomics {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_balances(&self, addresses: &[String]) -> Result<Vec<AddressBalance>, ProviderError> {
        let url = format!("{}/api/balance", self.base_url);
        let query = BalanceQuery {
            addr: addresses.join(" "),
        };

        let mut request = self.client.post(&url).json(&query);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        trace!(provider = %self.name, url = %url, "Sending balance query");
        let response = request.send().await.map_err(|source| ProviderError::Http {
            provider: self.name.clone(),
            source,
        })?;
        let response = check_status(&self.name, response)?;
        let body: BalanceResponse = decode_json(&self.name, response).await?;

        Ok(body
            .response
            .into_iter()
            .map(|entry| AddressBalance::new(entry.addr, entry.confirmed, entry.unconfirmed))
            .collect())
    }
}
