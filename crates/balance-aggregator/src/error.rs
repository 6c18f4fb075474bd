//! Error types for the balance aggregator

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::ServiceError;
use serde_json::json;
use thiserror::Error;

/// Main error type for the balance aggregator
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] common::ConfigurationError),

    /// Electrum session error
    #[error("Electrum error: {0}")]
    Electrum(#[from] electrum::ElectrumError),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Provider call error
    #[error("Provider error: {0}")]
    Provider(#[from] crate::providers::ProviderError),

    /// Dispatcher error
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] crate::dispatcher::DispatchError),

    /// Invalid request
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// No providers enabled
    #[error("No balance providers configured")]
    NoProvidersConfigured,

    /// Timeout error
    #[error("Request timeout")]
    Timeout,

    /// Internal server error
    #[error("Internal server error: {message}")]
    Internal { message: String },

    /// Service unavailable
    #[error("Service temporarily unavailable")]
    ServiceUnavailable,

    /// Not found
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl ServiceError for Error {}

impl Error {
    /// Get error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config(_) => "BALANCE_AGGREGATOR_CONFIG_ERROR",
            Error::Electrum(_) => "BALANCE_AGGREGATOR_ELECTRUM_ERROR",
            Error::HttpClient(_) => "BALANCE_AGGREGATOR_HTTP_CLIENT_ERROR",
            Error::Provider(_) => "BALANCE_AGGREGATOR_PROVIDER_ERROR",
            Error::Dispatch(_) => "BALANCE_AGGREGATOR_DISPATCH_ERROR",
            Error::InvalidRequest { .. } => "BALANCE_AGGREGATOR_INVALID_REQUEST",
            Error::NoProvidersConfigured => "BALANCE_AGGREGATOR_NO_PROVIDERS",
            Error::Timeout => "BALANCE_AGGREGATOR_TIMEOUT",
            Error::Internal { .. } => "BALANCE_AGGREGATOR_INTERNAL_ERROR",
            Error::ServiceUnavailable => "BALANCE_AGGREGATOR_SERVICE_UNAVAILABLE",
            Error::NotFound { .. } => "BALANCE_AGGREGATOR_NOT_FOUND",
            Error::Serialization(_) => "BALANCE_AGGREGATOR_SERIALIZATION_ERROR",
            Error::Other(_) => "BALANCE_AGGREGATOR_OTHER_ERROR",
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Electrum(e) => e.is_retryable(),
            Error::Provider(e) => e.is_retryable(),
            Error::HttpClient(_)
            | Error::Dispatch(_)
            | Error::Timeout
            | Error::ServiceUnavailable => true,
            _ => false,
        }
    }

    /// Check if error is a client error
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidRequest { .. } | Error::NotFound { .. }
        )
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Electrum(_) => StatusCode::BAD_GATEWAY,
            Error::HttpClient(_) => StatusCode::BAD_GATEWAY,
            Error::Provider(_) => StatusCode::BAD_GATEWAY,
            Error::Dispatch(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NoProvidersConfigured => StatusCode::SERVICE_UNAVAILABLE,
            Error::Timeout => StatusCode::REQUEST_TIMEOUT,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
                "timestamp": chrono::Utc::now(),
                "retryable": self.is_retryable(),
            }
        }));

        (status, body).into_response()
    }
}

/// Error response structure for API documentation
#[derive(Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Error details
    pub error: ErrorDetails,
}

/// Error details structure
#[derive(Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct ErrorDetails {
    /// Error code
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// ISO 8601 timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Whether the error is retryable
    pub retryable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::NoProvidersConfigured.error_code(),
            "BALANCE_AGGREGATOR_NO_PROVIDERS"
        );
        assert_eq!(
            Error::InvalidRequest {
                message: "empty".to_string()
            }
            .error_code(),
            "BALANCE_AGGREGATOR_INVALID_REQUEST"
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(Error::Timeout.is_retryable());
        assert!(Error::ServiceUnavailable.is_retryable());
        assert!(Error::Electrum(electrum::ElectrumError::Shutdown).is_retryable());
        assert!(!Error::Electrum(electrum::ElectrumError::RemoteError {
            code: -32600,
            message: "bad".to_string()
        })
        .is_retryable());
        assert!(!Error::InvalidRequest {
            message: "test".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_client_errors() {
        assert!(Error::InvalidRequest {
            message: "test".to_string()
        }
        .is_client_error());
        assert!(Error::NotFound {
            resource: "x".to_string()
        }
        .is_client_error());
        assert!(!Error::Timeout.is_client_error());
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = Error::InvalidRequest {
            message: "no addresses".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error.code, "BALANCE_AGGREGATOR_INVALID_REQUEST");
        assert!(!body.error.retryable);
    }
}
