//! Typed wrappers for the Electrum methods this workspace uses.

use crate::envelope::Notification;
use crate::error::Result;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// Client name sent in `server.version`
pub const CLIENT_NAME: &str = concat!("balance-aggregator/", env!("CARGO_PKG_VERSION"));

/// Protocol version requested in `server.version`
pub const PROTOCOL_VERSION: &str = "1.4";

/// Push method for new chain tips
pub const HEADERS_SUBSCRIBE: &str = "blockchain.headers.subscribe";

/// Confirmed and unconfirmed balance of a script hash, in satoshis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScripthashBalance {
    pub confirmed: i64,
    pub unconfirmed: i64,
}

/// Chain tip announced by `blockchain.headers.subscribe`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: u64,
    pub hex: String,
}

/// Server description returned by `server.features`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerFeatures {
    #[serde(default)]
    pub genesis_hash: String,
    #[serde(default)]
    pub hash_function: String,
    #[serde(default)]
    pub server_version: String,
    #[serde(default)]
    pub protocol_min: String,
    #[serde(default)]
    pub protocol_max: String,
    #[serde(default)]
    pub pruning: Option<u64>,
    #[serde(default)]
    pub hosts: Value,
}

impl Session {
    pub async fn ping(&self) -> Result<()> {
        self.call_raw("server.ping", vec![]).await.map(|_| ())
    }

    /// Negotiate the protocol version; returns `(server software, protocol)`
    pub async fn server_version(&self, client_name: &str, protocol: &str) -> Result<(String, String)> {
        self.call("server.version", vec![json!(client_name), json!(protocol)])
            .await
    }

    pub async fn server_banner(&self) -> Result<String> {
        self.call("server.banner", vec![]).await
    }

    pub async fn server_donation_address(&self) -> Result<String> {
        self.call("server.donation_address", vec![]).await
    }

    pub async fn server_features(&self) -> Result<ServerFeatures> {
        self.call("server.features", vec![]).await
    }

    /// Peers known to the server, as returned on the wire
    pub async fn server_peers(&self) -> Result<Vec<Value>> {
        self.call("server.peers.subscribe", vec![]).await
    }

    /// Fee rate in BTC/kB for confirmation within `target_blocks`
    ///
    /// Servers answer `-1` when they cannot estimate.
    pub async fn estimate_fee(&self, target_blocks: u32) -> Result<f64> {
        self.call("blockchain.estimatefee", vec![json!(target_blocks)])
            .await
    }

    /// Minimum fee rate in BTC/kB the server relays
    pub async fn relay_fee(&self) -> Result<f64> {
        self.call("blockchain.relayfee", vec![]).await
    }

    /// Mempool fee histogram as `(fee rate, virtual size)` pairs
    pub async fn fee_histogram(&self) -> Result<Vec<(f64, u64)>> {
        self.call("mempool.get_fee_histogram", vec![]).await
    }

    pub async fn scripthash_get_balance(&self, scripthash: &str) -> Result<ScripthashBalance> {
        self.call("blockchain.scripthash.get_balance", vec![json!(scripthash)])
            .await
    }

    /// Subscribe to new chain tips and return the current one
    ///
    /// The subscriber is registered before the request goes out, so no tip
    /// announced after the reply can be missed.
    pub async fn headers_subscribe(&self) -> Result<(BlockHeader, mpsc::Receiver<Notification>)> {
        let notifications = self.subscribe(HEADERS_SUBSCRIBE)?;
        let tip = self.call(HEADERS_SUBSCRIBE, vec![]).await?;
        Ok((tip, notifications))
    }
}

/// Decode the header carried by a `blockchain.headers.subscribe` push
pub fn header_from_notification(notification: &Notification) -> Option<BlockHeader> {
    let payload = match &notification.params {
        Value::Array(items) => items.first()?.clone(),
        other => other.clone(),
    };
    serde_json::from_value(payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_from_notification() {
        let notification = Notification {
            method: HEADERS_SUBSCRIBE.to_string(),
            params: json!([{"height": 840000, "hex": "00"}]),
        };
        assert_eq!(
            header_from_notification(&notification),
            Some(BlockHeader {
                height: 840000,
                hex: "00".to_string()
            })
        );

        let malformed = Notification {
            method: HEADERS_SUBSCRIBE.to_string(),
            params: json!(["nope"]),
        };
        assert_eq!(header_from_notification(&malformed), None);
    }

    #[test]
    fn test_client_name() {
        assert!(CLIENT_NAME.starts_with("balance-aggregator/"));
    }
}
