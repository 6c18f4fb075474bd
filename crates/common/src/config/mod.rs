//! # Configuration Abstractions
//!
//! Layered configuration loading shared by all binaries.

pub mod loader;
pub mod traits;

pub use loader::*;
pub use traits::*;
