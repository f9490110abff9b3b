//! Error types for workflow auditing.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Result type for audit operations.
pub type Result<T> = std::result::Result<T, AuditError>;

/// A reference that failed the public-namespace check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Offender {
    /// The offending image reference.
    pub reference: String,
    /// Documents the reference was found in.
    pub sources: Vec<PathBuf>,
}

/// A reference whose manifest could not be confirmed on its registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnpublishedImage {
    /// The image reference.
    pub reference: String,
    /// Why the probe did not confirm it.
    pub reason: String,
    /// Documents the reference was found in.
    pub sources: Vec<PathBuf>,
}

/// Errors that can occur while scanning, rewriting or asserting.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Document is not valid JSON.
    #[error("failed to parse '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// File could not be read or written.
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Directory traversal failed.
    #[error("failed to walk workflow directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// Some references are outside the public namespace.
    #[error(
        "{} image reference(s) outside the public namespace '{prefix}':\n{}",
        .offenders.len(),
        format_offenders(.offenders)
    )]
    PolicyViolation {
        prefix: String,
        offenders: Vec<Offender>,
    },

    /// Some references could not be confirmed on their registry.
    #[error(
        "{} image reference(s) not confirmed as published:\n{}",
        .offenders.len(),
        format_unpublished(.offenders)
    )]
    Unpublished { offenders: Vec<UnpublishedImage> },

    /// A rewrite would leave dev references behind or produce invalid JSON.
    #[error(
        "rewrite of '{}' is incomplete, left untouched: {reason}",
        .path.display()
    )]
    IncompleteRewrite { path: PathBuf, reason: String },

    /// A registry prefix is unusable.
    #[error("invalid registry prefix: {0}")]
    InvalidPrefix(String),
}

impl AuditError {
    /// Path of the document this error concerns, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            AuditError::Parse { path, .. }
            | AuditError::Io { path, .. }
            | AuditError::IncompleteRewrite { path, .. } => Some(path),
            _ => None,
        }
    }
}

fn format_sources(sources: &[PathBuf]) -> String {
    sources
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_offenders(offenders: &[Offender]) -> String {
    offenders
        .iter()
        .map(|o| format!("  {} (in {})", o.reference, format_sources(&o.sources)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_unpublished(offenders: &[UnpublishedImage]) -> String {
    offenders
        .iter()
        .map(|o| {
            format!(
                "  {}: {} (in {})",
                o.reference,
                o.reason,
                format_sources(&o.sources)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
