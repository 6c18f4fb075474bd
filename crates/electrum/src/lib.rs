//! # Electrum
//!
//! Client side of the Electrum protocol: one long-lived TCP or TLS
//! connection carrying newline-delimited JSON-RPC, shared by many concurrent
//! callers and server-push subscribers.
//!
//! ```no_run
//! # async fn demo() -> electrum::Result<()> {
//! use electrum::{default_tls_config, Session, SessionConfig};
//!
//! let session = Session::new(SessionConfig::default());
//! session
//!     .connect("electrum.blockstream.info:50002", Some(default_tls_config()))
//!     .await?;
//! let balance = session.scripthash_get_balance("8b01df4e...").await?;
//! println!("{} sat confirmed", balance.confirmed);
//! # Ok(())
//! # }
//! ```

pub mod envelope;
pub mod error;
pub mod methods;
pub mod session;
pub mod transport;

pub use envelope::{Notification, RemoteErrorBody};
pub use error::{ElectrumError, ErrorCategory, Result};
pub use methods::{
    header_from_notification, BlockHeader, ScripthashBalance, ServerFeatures, CLIENT_NAME,
    HEADERS_SUBSCRIBE, PROTOCOL_VERSION,
};
pub use session::{Session, SessionConfig, SessionState};
pub use transport::default_tls_config;
