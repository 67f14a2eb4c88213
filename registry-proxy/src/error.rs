//! # Error Handling and Response Types
//!
//! Every failure inside request handling is an [`AppError`]. Errors convert
//! into HTTP responses through [`IntoResponse`], so a fault in one request is
//! answered and logged there and never reaches other in-flight requests.
//!
//! ## Error Response Format
//!
//! ```json
//! {
//!   "error": "upstream request failed",
//!   "code": "upstream_error",
//!   "timestamp": "2024-01-01T12:00:00Z"
//! }
//! ```
//!
//! Network failures are logged with the full error chain but the client only
//! ever sees the generic message, so upstream hostnames and TLS details do not
//! leak through the proxy.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;

/// Standardized JSON error body
#[derive(Serialize, Debug)]
pub struct ApiErrorResponse {
    pub error: String,
    pub code: String,
    pub timestamp: String,
}

/// Machine-readable error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotFound,
    UpstreamError,
    ConfigError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "not_found",
            ErrorCode::UpstreamError => "upstream_error",
            ErrorCode::ConfigError => "config_error",
            ErrorCode::InternalError => "internal_error",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::UpstreamError | ErrorCode::ConfigError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The inbound `Host` has no route and no fallback is configured.
    #[error("no route configured for host '{0}'")]
    UnknownHost(String),

    /// Connect, TLS, timeout or body read failure while talking to an upstream.
    #[error("upstream request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal server error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl AppError {
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        AppError::Network {
            url: url.into(),
            source,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::UnknownHost(_) => ErrorCode::NotFound,
            AppError::Network { .. } => ErrorCode::UpstreamError,
            AppError::Config(_) => ErrorCode::ConfigError,
            AppError::Internal(_) | AppError::Io(_) | AppError::Json(_) | AppError::Url(_) => {
                ErrorCode::InternalError
            }
        }
    }

    /// Message safe to hand to a registry client.
    pub fn client_message(&self) -> String {
        match self.error_code() {
            ErrorCode::UpstreamError => "upstream request failed".to_string(),
            ErrorCode::InternalError | ErrorCode::ConfigError => {
                "internal server error".to_string()
            }
            ErrorCode::NotFound => self.to_string(),
        }
    }

    pub fn to_error_response(&self) -> ApiErrorResponse {
        ApiErrorResponse {
            error: self.client_message(),
            code: self.error_code().as_str().to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let status = code.http_status();

        match &self {
            AppError::Network { url, source } => {
                tracing::error!(url = %url, error = %source, detail = ?source, "Upstream request failed");
            }
            _ if status.is_server_error() => tracing::error!(error = %self, "Request failed"),
            _ => tracing::warn!(error = %self, "Request rejected"),
        }

        let body = self.to_error_response();
        tracing::debug!(status = %status, code = %body.code, "Returning error response");

        (status, axum::Json(body)).into_response()
    }
}

/// Result alias used throughout the crate.
pub type AppResult<T> = Result<T, AppError>;
