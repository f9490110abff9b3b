//! Onezone client error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for Onezone operations.
pub type Result<T> = std::result::Result<T, OnezoneError>;

/// Errors that can occur while talking to Onezone or handling dumps.
#[derive(Debug, Error)]
pub enum OnezoneError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing failed.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Onezone returned an error response.
    #[error("Onezone API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A create call succeeded but did not say where the new record lives.
    #[error("response to {0} carried no Location header")]
    MissingLocation(String),

    /// The workflow dump does not have the expected shape.
    #[error("unexpected workflow dump format: {0}")]
    DumpFormat(String),

    /// Reading or writing a dump file failed.
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A dump file is not valid JSON.
    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl OnezoneError {
    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, OnezoneError::Api { status: 401 | 403, .. })
    }
}
