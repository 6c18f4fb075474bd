//! Balance records exchanged between providers, dispatchers and callers.
//!
//! All amounts are in satoshis.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One address balance as reported by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressBalance {
    pub address: String,
    pub confirmed: f64,
    pub unconfirmed: f64,
}

impl AddressBalance {
    pub fn new(address: impl Into<String>, confirmed: f64, unconfirmed: f64) -> Self {
        Self {
            address: address.into(),
            confirmed,
            unconfirmed,
        }
    }
}

/// The answer one provider gives for one address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BalanceResult {
    /// Provider that produced this record
    pub source: String,

    /// Queried address
    pub address: String,

    /// Confirmed balance
    pub confirmed: f64,

    /// Unconfirmed balance, may be negative
    pub unconfirmed: f64,

    /// Confirmed plus unconfirmed
    pub total: f64,

    /// Why the provider could not answer; balances are zero when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BalanceResult {
    pub fn new(
        source: impl Into<String>,
        address: impl Into<String>,
        confirmed: f64,
        unconfirmed: f64,
    ) -> Self {
        Self {
            source: source.into(),
            address: address.into(),
            confirmed,
            unconfirmed,
            total: confirmed + unconfirmed,
            error: None,
        }
    }

    /// Record for an address the provider did not mention
    pub fn zero(source: impl Into<String>, address: impl Into<String>) -> Self {
        Self::new(source, address, 0.0, 0.0)
    }

    /// Record for an address the provider could not be asked about
    pub fn failed(
        source: impl Into<String>,
        address: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::zero(source, address)
        }
    }

    pub fn from_record(source: impl Into<String>, record: &AddressBalance) -> Self {
        Self::new(
            source,
            record.address.clone(),
            record.confirmed,
            record.unconfirmed,
        )
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    pub fn has_funds(&self) -> bool {
        self.total > 0.0
    }
}
