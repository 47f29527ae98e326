//! Error types for catalog-mirror
//!
//! This module provides error handling for the library, including:
//! - The fetch/parse/persist taxonomy used by every pipeline stage
//! - A flat [`ErrorKind`] recorded in per-item and per-key results
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for catalog-mirror operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for catalog-mirror
///
/// Pipeline stages only ever produce the first four variants; the rest come
/// from configuration, the API server and conversions from library errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The remote side could not be reached or answered with a non-success status
    #[error("fetch failed for {url}: {message}")]
    Fetch {
        /// URL that was requested
        url: String,
        /// Transport or status description
        message: String,
    },

    /// The remote side answered, but with an empty document
    #[error("empty response from {url}")]
    EmptyResponse {
        /// URL that was requested
        url: String,
    },

    /// A document did not have the expected shape
    #[error("parse error: {0}")]
    Parse(String),

    /// A local write (or delete) failed
    #[error("persistence error at {}: {message}", path.display())]
    Persistence {
        /// File that could not be written
        path: PathBuf,
        /// Underlying failure
        message: String,
    },

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "remote.base_url")
        key: Option<String>,
    },

    /// Caller supplied an invalid argument (unknown content kind, bad interval, ...)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a [`Error::Fetch`] from any displayable transport error
    pub fn fetch(url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Error::Fetch {
            url: url.into(),
            message: err.to_string(),
        }
    }

    /// Build a [`Error::Persistence`] from any displayable I/O error
    pub fn persistence(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Error::Persistence {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Coarse classification used in per-item and per-key results
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Fetch { .. } => ErrorKind::Fetch,
            Error::EmptyResponse { .. } => ErrorKind::EmptyResponse,
            Error::Parse(_) | Error::Serialization(_) => ErrorKind::Parse,
            Error::Persistence { .. } | Error::Io(_) => ErrorKind::Persistence,
            Error::Config { .. }
            | Error::InvalidInput(_)
            | Error::ApiServerError(_)
            | Error::Other(_) => ErrorKind::Other,
        }
    }
}

/// Flat error classification stored alongside failed items and keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transport failure or non-success status
    Fetch,
    /// Remote answered with nothing
    EmptyResponse,
    /// Document had the wrong shape
    Parse,
    /// Local write failed
    Persistence,
    /// Anything else, including task panics
    Other,
}

/// API error response format
///
/// Standard error envelope returned by every route.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "invalid_input",
///     "message": "invalid input: unknown content kind 'video'",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "fetch_error", "invalid_input")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error (url, path, config key)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input)
            Error::Config { .. } => 400,
            Error::InvalidInput(_) => 400,

            // 502 Bad Gateway - The catalog API misbehaved
            Error::Fetch { .. } => 502,
            Error::EmptyResponse { .. } => 502,
            Error::Parse(_) => 502,

            // 500 Internal Server Error - Server-side issues
            Error::Persistence { .. } => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Fetch { .. } => "fetch_error",
            Error::EmptyResponse { .. } => "empty_response",
            Error::Parse(_) => "parse_error",
            Error::Persistence { .. } => "persistence_error",
            Error::Config { .. } => "config_error",
            Error::InvalidInput(_) => "invalid_input",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Fetch { url, .. } | Error::EmptyResponse { url } => Some(serde_json::json!({
                "url": url,
            })),
            Error::Persistence { path, .. } => Some(serde_json::json!({
                "path": path,
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn all_error_variants() -> Vec<(Error, u16, &'static str, ErrorKind)> {
        vec![
            (
                Error::fetch("http://x/classify", "connection refused"),
                502,
                "fetch_error",
                ErrorKind::Fetch,
            ),
            (
                Error::EmptyResponse {
                    url: "http://x/article/1".into(),
                },
                502,
                "empty_response",
                ErrorKind::EmptyResponse,
            ),
            (
                Error::Parse("not an object".into()),
                502,
                "parse_error",
                ErrorKind::Parse,
            ),
            (
                Error::persistence("/tmp/a.md", "read-only file system"),
                500,
                "persistence_error",
                ErrorKind::Persistence,
            ),
            (
                Error::Config {
                    message: "bad".into(),
                    key: Some("remote.base_url".into()),
                },
                400,
                "config_error",
                ErrorKind::Other,
            ),
            (
                Error::InvalidInput("unknown kind".into()),
                400,
                "invalid_input",
                ErrorKind::Other,
            ),
            (
                Error::Io(std::io::Error::other("disk")),
                500,
                "io_error",
                ErrorKind::Persistence,
            ),
            (
                Error::Serialization(serde_json::from_str::<i32>("x").unwrap_err()),
                500,
                "serialization_error",
                ErrorKind::Parse,
            ),
            (
                Error::ApiServerError("bind".into()),
                500,
                "api_server_error",
                ErrorKind::Other,
            ),
            (Error::Other("boom".into()), 500, "internal_error", ErrorKind::Other),
        ]
    }

    #[test]
    fn every_variant_maps_to_expected_status_code_code_and_kind() {
        for (err, status, code, kind) in all_error_variants() {
            assert_eq!(err.status_code(), status, "status for {err:?}");
            assert_eq!(err.error_code(), code, "code for {err:?}");
            assert_eq!(err.kind(), kind, "kind for {err:?}");
        }
    }

    #[test]
    fn api_error_from_fetch_carries_url() {
        let api: ApiError = Error::fetch("http://x/classify", "timeout").into();
        assert_eq!(api.error.code, "fetch_error");
        assert_eq!(
            api.error.details,
            Some(serde_json::json!({ "url": "http://x/classify" }))
        );
        assert!(api.error.message.contains("timeout"));
    }

    #[test]
    fn api_error_from_persistence_carries_path() {
        let api: ApiError = Error::persistence("/data/content/article_1.md", "denied").into();
        assert_eq!(
            api.error.details,
            Some(serde_json::json!({ "path": "/data/content/article_1.md" }))
        );
    }

    #[test]
    fn api_error_without_details_omits_details_in_json() {
        let api: ApiError = Error::InvalidInput("unknown kind".into()).into();
        let json = serde_json::to_value(&api).unwrap();
        assert!(json["error"].get("details").is_none());
        assert_eq!(json["error"]["message"], "invalid input: unknown kind");
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(ErrorKind::EmptyResponse).unwrap(),
            serde_json::json!("empty_response")
        );
    }
}
