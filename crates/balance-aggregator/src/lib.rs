//! # Balance Aggregator
//!
//! Best-effort address balances gathered from several unreliable providers.
//!
//! ## Features
//!
//! - **Batch Dispatchers**: per-provider request batching with size and time flushes
//! - **Rate Windows**: quota tracking aligned to UTC period boundaries
//! - **Retries**: failed batches are resubmitted with exponential backoff
//! - **Electrum Provider**: balances over a persistent Electrum session
//! - **HTTP Gateway**: axum routes with OpenAPI documentation
//! - **Monitoring**: Prometheus metrics and structured logging

pub mod aggregator;
pub mod api;
pub mod balance;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod providers;
pub mod server;
pub mod telemetry;

// Re-export commonly used types
pub use aggregator::{Aggregator, Worker};
pub use balance::{AddressBalance, BalanceResult};
pub use config::Config;
pub use error::{Error, Result};
pub use server::Server;

/// Version of the balance-aggregator crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol version for API compatibility
pub const API_VERSION: &str = "v1";
