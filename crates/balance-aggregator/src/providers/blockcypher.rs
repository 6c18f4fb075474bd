//! api.blockcypher.com adapter: one GET with `;`-joined addresses.
//!
//! The service answers a single object for one address and an array for
//! several. HTTP 429 means the hourly quota is spent.

use super::{check_status, decode_json, BalanceProvider, ProviderError};
use crate::balance::AddressBalance;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, trace};

pub const DEFAULT_BASE_URL: &str = "https://api.blockcypher.com";

#[derive(Debug, Deserialize)]
struct AddressEntry {
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    balance: i64,
    #[serde(default)]
    unconfirmed_balance: i64,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<AddressEntry>),
    One(AddressEntry),
}

pub struct Blockcypher {
    name: String,
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl Blockcypher {
    pub fn new(name: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

#[async_trait]
impl BalanceProvider for Blockcypher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_balances(&self, addresses: &[String]) -> Result<Vec<AddressBalance>, ProviderError> {
        let url = format!(
            "{}/v1/btc/main/addrs/{}/balance",
            self.base_url,
            addresses.join(";")
        );

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.query(&[("token", token)]);
        }

        trace!(provider = %self.name, url = %url, "Sending balance query");
        let response = request.send().await.map_err(|source| ProviderError::Http {
            provider: self.name.clone(),
            source,
        })?;
        let response = check_status(&self.name, response)?;
        let entries = match decode_json::<OneOrMany>(&self.name, response).await? {
            OneOrMany::Many(entries) => entries,
            OneOrMany::One(entry) => vec![entry],
        };

        let mut balances = Vec::with_capacity(entries.len());
        for entry in entries {
            match (entry.address, entry.error) {
                (Some(address), None) => balances.push(AddressBalance::new(
                    address,
                    entry.balance as f64,
                    entry.unconfirmed_balance as f64,
                )),
                (address, error) => debug!(
                    provider = %self.name,
                    address = address.as_deref().unwrap_or("?"),
                    error = error.as_deref().unwrap_or("missing address"),
                    "Skipping unusable entry"
                ),
            }
        }
        Ok(balances)
    }
}
