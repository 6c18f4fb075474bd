//! # Common
//!
//! Shared error definitions and configuration loading used by every crate in
//! the balance aggregation workspace.
//!
//! ## Key Features
//! - `ServiceError` marker trait for errors that cross crate boundaries
//! - `ConfigurationError` for layered configuration loading
//! - `ConfigLoader` trait plus a figment-based loader (defaults -> file -> env)

pub mod config;
pub mod error;

pub use config::*;
pub use error::*;

/// Version of the common crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
