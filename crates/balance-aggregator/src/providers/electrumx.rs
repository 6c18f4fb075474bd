//! Electrum node adapter.
//!
//! Keeps one session to a node picked at random from the configured list
//! and asks for each address's script-hash balance over it. The session is
//! dropped when it fails, so the next batch reconnects, possibly elsewhere.

use super::{BalanceProvider, ProviderError};
use crate::balance::AddressBalance;
use async_trait::async_trait;
use electrum::{Session, SessionConfig, CLIENT_NAME, PROTOCOL_VERSION};
use futures::future::join_all;
use rand::seq::SliceRandom;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const P2PKH_VERSION: u8 = 0x00;
const P2SH_VERSION: u8 = 0x05;

/// Electrum script hash of a base58check address
///
/// The hash is SHA-256 of the output script, byte-reversed and hex encoded.
/// Mainnet pay-to-pubkey-hash and pay-to-script-hash addresses are accepted.
pub fn address_to_scripthash(address: &str) -> Result<String, ProviderError> {
    let invalid = |reason: String| ProviderError::InvalidAddress {
        address: address.to_string(),
        reason,
    };

    let decoded = bs58::decode(address)
        .with_check(None)
        .into_vec()
        .map_err(|e| invalid(e.to_string()))?;

    let (version, hash) = match decoded.split_first() {
        Some((version, hash)) if hash.len() == 20 => (*version, hash),
        _ => return Err(invalid(format!("unexpected payload length {}", decoded.len()))),
    };

    let script = match version {
        // OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG
        P2PKH_VERSION => [&[0x76, 0xa9, 0x14][..], hash, &[0x88, 0xac]].concat(),
        // OP_HASH160 <20> OP_EQUAL
        P2SH_VERSION => [&[0xa9, 0x14][..], hash, &[0x87]].concat(),
        other => return Err(invalid(format!("unsupported version byte {other:#04x}"))),
    };

    let mut digest = Sha256::digest(&script).to_vec();
    digest.reverse();
    Ok(hex::encode(digest))
}

pub struct ElectrumX {
    name: String,
    nodes: Vec<String>,
    tls: Option<Arc<rustls::ClientConfig>>,
    session_config: SessionConfig,
    session: Mutex<Option<(String, Session)>>,
}

impl ElectrumX {
    pub fn new(
        name: impl Into<String>,
        nodes: Vec<String>,
        tls: Option<Arc<rustls::ClientConfig>>,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            name: name.into(),
            nodes,
            tls,
            session_config,
            session: Mutex::new(None),
        }
    }

    fn pick_node(&self) -> Result<String, ProviderError> {
        self.nodes
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| {
                ProviderError::from(electrum::ElectrumError::Connect {
                    addr: String::new(),
                    message: "no electrum nodes configured".to_string(),
                })
            })
    }

    /// The live session, connecting to a random node first if there is none
    async fn session(&self) -> Result<(String, Session), ProviderError> {
        let mut slot = self.session.lock().await;
        if let Some((node, session)) = slot.as_ref() {
            if session.state() == electrum::SessionState::Open {
                return Ok((node.clone(), session.clone()));
            }
        }

        let node = self.pick_node()?;
        let session = Session::new(self.session_config.clone());
        session.connect(&node, self.tls.clone()).await?;
        let (software, protocol) = session.server_version(CLIENT_NAME, PROTOCOL_VERSION).await?;
        info!(
            provider = %self.name,
            node = %node,
            software = %software,
            protocol = %protocol,
            "Connected to electrum node"
        );

        *slot = Some((node.clone(), session.clone()));
        Ok((node, session))
    }

    async fn forget(&self, session: &Session) {
        let mut slot = self.session.lock().await;
        let stale = matches!(slot.as_ref(), Some((_, current)) if current.state() != electrum::SessionState::Open);
        if stale {
            *slot = None;
        }
        drop(slot);
        session.close().await;
    }
}

#[async_trait]
impl BalanceProvider for ElectrumX {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_balances(&self, addresses: &[String]) -> Result<Vec<AddressBalance>, ProviderError> {
        let mut queries = Vec::with_capacity(addresses.len());
        for address in addresses {
            match address_to_scripthash(address) {
                Ok(scripthash) => queries.push((address, scripthash)),
                Err(e) => warn!(provider = %self.name, error = %e, "Skipping address"),
            }
        }
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        let (node, session) = self.session().await?;
        debug!(provider = %self.name, node = %node, count = queries.len(), "Querying balances");

        let lookups = queries
            .iter()
            .map(|(_, scripthash)| session.scripthash_get_balance(scripthash));
        let answers = join_all(lookups).await;

        let mut balances = Vec::with_capacity(answers.len());
        for ((address, _), answer) in queries.iter().zip(answers) {
            match answer {
                Ok(balance) => balances.push(AddressBalance::new(
                    address.as_str(),
                    balance.confirmed as f64,
                    balance.unconfirmed as f64,
                )),
                Err(e) => {
                    if e.is_fatal_to_session() {
                        warn!(provider = %self.name, node = %node, error = %e, "Dropping electrum session");
                        self.forget(&session).await;
                    }
                    return Err(e.into());
                }
            }
        }
        Ok(balances)
    }
}
