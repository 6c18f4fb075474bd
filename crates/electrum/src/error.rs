//! # Electrum Error Types
//!
//! Error handling for Electrum session interactions, with categorization so
//! callers can decide whether a failed call is worth retrying.

use common::ServiceError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during Electrum session operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ElectrumError {
    // === Lifecycle Errors ===
    #[error("Session is already connected")]
    AlreadyConnected,

    #[error("Session is not connected")]
    NotConnected,

    #[error("Session has shut down")]
    Shutdown,

    // === Transport Errors ===
    #[error("Failed to connect to {addr}: {message}")]
    Connect { addr: String, message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Request {method} timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    // === Protocol Errors ===
    #[error("Remote error {code}: {message}")]
    RemoteError { code: i64, message: String },

    #[error("Failed to decode {context}: {message}")]
    Decode { context: String, message: String },

    #[error("Failed to encode request {method}: {message}")]
    Encode { method: String, message: String },
}

impl ServiceError for ElectrumError {}

/// Classification of errors for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The call may succeed if repeated on the same session
    Transient,
    /// The connection is gone; a new session is needed
    Network,
    /// The server understood the request and refused it
    Remote,
    /// Malformed payloads in either direction
    Protocol,
    /// The session was used in the wrong state
    Usage,
}

impl ElectrumError {
    /// Get the error category for retry logic
    pub fn category(&self) -> ErrorCategory {
        match self {
            ElectrumError::Timeout { .. } => ErrorCategory::Transient,
            ElectrumError::Connect { .. }
            | ElectrumError::Transport { .. }
            | ElectrumError::Shutdown => ErrorCategory::Network,
            ElectrumError::RemoteError { .. } => ErrorCategory::Remote,
            ElectrumError::Decode { .. } | ElectrumError::Encode { .. } => ErrorCategory::Protocol,
            ElectrumError::AlreadyConnected | ElectrumError::NotConnected => ErrorCategory::Usage,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transient | ErrorCategory::Network
        )
    }

    /// Whether the session that produced this error is no longer usable
    pub fn is_fatal_to_session(&self) -> bool {
        self.category() == ErrorCategory::Network
    }
}

/// Result type alias for Electrum operations
pub type Result<T> = std::result::Result<T, ElectrumError>;
