//! CLI command handlers.

pub mod assert_public;
pub mod assert_published;
pub mod checksums;
pub mod config;
pub mod list;
pub mod rewrite;

use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use imgaudit_config::ImgauditConfig;
use imgaudit_core::{DocumentFailure, ScanOptions, ScanReport, scan_tree};
use serde::Serialize;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Workflow directory being audited.
    pub root: PathBuf,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Explicit user config directory, if given.
    pub config_dir: Option<PathBuf>,
    /// Merged configuration.
    pub config: ImgauditConfig,
}

impl Context {
    /// Scan options derived from the `[scan]` section.
    pub fn scan_options(&self) -> ScanOptions {
        let scan = self.config.scan();
        ScanOptions::new()
            .with_extension(scan.extension)
            .with_image_key(scan.image_key)
    }

    /// Scan the workflow directory.
    pub fn scan(&self) -> Result<ScanReport> {
        scan_tree(&self.root, &self.scan_options())
            .with_context(|| format!("failed to scan {}", self.root.display()))
    }
}

/// A skipped document, for JSON output.
#[derive(Debug, Serialize)]
pub struct FailureOutput {
    pub path: String,
    pub error: String,
}

/// Convert skipped documents for JSON output.
pub fn failure_output(failures: &[DocumentFailure]) -> Vec<FailureOutput> {
    failures
        .iter()
        .map(|f| FailureOutput {
            path: f.path.display().to_string(),
            error: f.error.to_string(),
        })
        .collect()
}

/// Fail if any document was skipped.
///
/// Called after the command has done its work on the readable documents.
pub fn ensure_complete(failures: &[DocumentFailure]) -> Result<()> {
    if failures.is_empty() {
        return Ok(());
    }

    let details = failures
        .iter()
        .map(|f| format!("  {}", f.error))
        .collect::<Vec<_>>()
        .join("\n");
    bail!(
        "{} workflow document(s) could not be processed:\n{}",
        failures.len(),
        details
    )
}
