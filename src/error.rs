//! Error types for the SocialRank engine
//!
//! The ranking operations themselves are total: unknown ids return defaults and
//! bad records are logged and skipped. Errors only surface at the edges:
//! - configuration loading and validation
//! - snapshot persistence (I/O, encoding, validation)
//! - the HTTP boundary (bad requests, missing content)

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::borrow::Cow;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the SocialRank engine
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    #[error("Configuration error: {message}")]
    Config {
        message: Cow<'static, str>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidConfig {
        key: &'static str,
        message: Cow<'static, str>,
    },

    // ========================================================================
    // Persistence Errors
    // ========================================================================
    #[error("Persistence error: {message}")]
    Persistence {
        message: Cow<'static, str>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid snapshot: {message}")]
    InvalidSnapshot { message: Cow<'static, str> },

    // ========================================================================
    // Metric Errors
    // ========================================================================
    #[error("Derived metric {field} for content {content_id} is not finite")]
    InvalidMetric {
        content_id: String,
        field: &'static str,
    },

    // ========================================================================
    // API Errors
    // ========================================================================
    #[error("Bad request: {message}")]
    BadRequest { message: Cow<'static, str> },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    // ========================================================================
    // Serialization Errors
    // ========================================================================
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    #[error("Internal server error")]
    Internal {
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Create a configuration error with source
    pub fn config_with_source(
        message: impl Into<Cow<'static, str>>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a persistence error with source
    pub fn persistence_with_source(
        message: impl Into<Cow<'static, str>>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Persistence {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid snapshot error
    pub fn invalid_snapshot(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidSnapshot {
            message: message.into(),
        }
    }

    /// Create a bad request error
    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Create an internal error
    pub fn internal(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal {
            source: Some(Box::new(source)),
        }
    }

    // ========================================================================
    // Error Classification
    // ========================================================================

    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Persistence { .. } | Error::Io(_))
    }

    /// Returns true if the snapshot was readable but its contents are unusable
    pub fn is_malformed_snapshot(&self) -> bool {
        matches!(self, Error::InvalidSnapshot { .. } | Error::Json(_))
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } | Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Persistence { .. } | Error::Io(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } | Error::InvalidConfig { .. } => "CONFIG_ERROR",
            Error::Persistence { .. } | Error::Io(_) | Error::InvalidSnapshot { .. } => {
                "PERSISTENCE_ERROR"
            }
            Error::InvalidMetric { .. } => "METRIC_ERROR",
            Error::BadRequest { .. } => "BAD_REQUEST",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Json(_) => "SERIALIZATION_ERROR",
            Error::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

// ============================================================================
// Error Response for API
// ============================================================================

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        // Don't expose internal error details
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_error() -> Error {
        Error::persistence_with_source(
            "disk full",
            std::io::Error::new(std::io::ErrorKind::Other, "no space left"),
        )
    }

    #[test]
    fn test_error_retryable() {
        assert!(io_error().is_retryable());
        assert!(!Error::not_found("content", "c1").is_retryable());
        assert!(!Error::invalid_snapshot("bad version").is_retryable());
    }

    #[test]
    fn test_malformed_snapshot_classification() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(Error::from(json_err).is_malformed_snapshot());
        assert!(Error::invalid_snapshot("version 9").is_malformed_snapshot());
        assert!(!io_error().is_malformed_snapshot());
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            Error::not_found("content", "c1").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::bad_request("unknown kind").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Internal { source: None }.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(Error::not_found("content", "c1").error_code(), "NOT_FOUND");
    }
}
