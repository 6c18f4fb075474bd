//! # Configuration Traits

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

use crate::error::ConfigurationError;

/// Configuration loader trait
///
/// Standardized interface for loading configuration with layered support
/// (defaults, files, environment variables).
pub trait ConfigLoader<C: DeserializeOwned + Send + Sync> {
    /// Load configuration with optional path override
    ///
    /// Falls back to the default file name in the working directory when no
    /// path is given. A missing default file is not an error.
    fn load(path_override: Option<PathBuf>) -> Result<C, ConfigurationError>;

    /// Load configuration from a specific file, which must exist
    fn load_from_file(path: &Path) -> Result<C, ConfigurationError>;
}
