//! Registry probe error types.

use std::time::Duration;

use thiserror::Error;

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur while probing a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The image reference could not be parsed.
    #[error("invalid image reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    /// The docker CLI could not be started.
    #[error("failed to run '{binary}': {source}")]
    Spawn {
        binary: String,
        source: std::io::Error,
    },

    /// `docker manifest inspect` exited unsuccessfully.
    #[error("docker manifest inspect failed ({}): {stderr}", describe_exit(.code))]
    CommandFailed { code: Option<i32>, stderr: String },

    /// The query did not finish in time.
    #[error("manifest query timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing failed.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The registry has no manifest for the reference.
    #[error("manifest not found for '{0}'")]
    NotFound(String),

    /// The registry refused access.
    #[error("registry denied access (HTTP {0})")]
    Unauthorized(u16),

    /// The registry answered with an unexpected status.
    #[error("registry returned HTTP {0}")]
    Status(u16),

    /// Bearer token could not be obtained.
    #[error("failed to obtain registry token: {0}")]
    Token(String),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

impl RegistryError {
    /// Whether the registry positively reported the manifest as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound(_))
    }
}
