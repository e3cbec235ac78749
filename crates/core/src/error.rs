//! Error types owned by the orchestration engine
//!
//! Errors raised by a wrapped operation are returned to the caller exactly as
//! produced; nothing in this module wraps them. [`ConfigError`] covers the
//! only fallible construction path, and [`HttpStatusError`] is a ready-made
//! operation error for HTTP calls that keeps the status and headers the
//! classifier and delay calculator look at.

use callgate_common::CommonError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;
use tracing::debug;

/// Result alias for configuration and construction
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while building a [`Caller`](crate::Caller) or its options
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {message}")]
    Invalid { field: &'static str, message: String },

    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid { field, message: message.into() }
    }
}

/// HTTP response with a non-success status, kept as an operation error
///
/// `reqwest::Error` drops the response headers, so a server's `Retry-After`
/// is lost by `Response::error_for_status`. Converting through
/// [`HttpStatusError::check`] keeps them.
#[derive(Debug, Clone, Error)]
#[error("HTTP status {status}")]
pub struct HttpStatusError {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpStatusError {
    pub fn new(status: u16) -> Self {
        Self { status, headers: HeaderMap::new(), body: String::new() }
    }

    /// Attach a header, ignoring names or values that are not valid HTTP
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) =
            (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value))
        {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Consume a response into an error, reading the body
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                debug!(status, error = %err, "Failed to read error response body");
                String::new()
            }
        };
        Self { status, headers, body }
    }

    /// Pass a success response through, convert anything else into an error
    pub async fn check(response: reqwest::Response) -> Result<reqwest::Response, Self> {
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(Self::from_response(response).await);
        }
        Ok(response)
    }
}
