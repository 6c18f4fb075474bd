//! TCP and TLS stream establishment.

use crate::error::{ElectrumError, Result};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// TLS client configuration trusting the Mozilla root set
pub fn default_tls_config() -> Arc<ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    Arc::new(
        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}

pub(crate) async fn connect_tcp(addr: &str, timeout: Duration) -> Result<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| connect_error(addr, format!("timed out after {timeout:?}")))?
        .map_err(|e| connect_error(addr, e.to_string()))?;

    if let Err(e) = stream.set_nodelay(true) {
        debug!("Failed to set TCP_NODELAY on {}: {}", addr, e);
    }

    Ok(stream)
}

pub(crate) async fn connect_tls(
    addr: &str,
    config: Arc<ClientConfig>,
    timeout: Duration,
) -> Result<TlsStream<TcpStream>> {
    let server_name = ServerName::try_from(host_of(addr).to_string())
        .map_err(|e| connect_error(addr, format!("invalid server name: {e}")))?;

    let tcp = connect_tcp(addr, timeout).await?;
    let connector = TlsConnector::from(config);

    tokio::time::timeout(timeout, connector.connect(server_name, tcp))
        .await
        .map_err(|_| connect_error(addr, format!("TLS handshake timed out after {timeout:?}")))?
        .map_err(|e| connect_error(addr, format!("TLS handshake failed: {e}")))
}

/// Host part of a `host:port` address, without IPv6 brackets
pub(crate) fn host_of(addr: &str) -> &str {
    let host = match addr.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => host,
        _ => addr,
    };
    host.trim_start_matches('[').trim_end_matches(']')
}

fn connect_error(addr: &str, message: String) -> ElectrumError {
    ElectrumError::Connect {
        addr: addr.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("electrum.example.org:50002"), "electrum.example.org");
        assert_eq!(host_of("127.0.0.1:50001"), "127.0.0.1");
        assert_eq!(host_of("[::1]:50002"), "::1");
        assert_eq!(host_of("electrum.example.org"), "electrum.example.org");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = connect_tcp(&addr, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ElectrumError::Connect { .. })));
    }

    #[test]
    fn test_default_tls_config_has_roots() {
        let config = default_tls_config();
        assert!(config.alpn_protocols.is_empty());
    }
}
