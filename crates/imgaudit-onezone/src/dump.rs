//! Workflow dump files.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{OnezoneError, Result};

/// Path of the dump for `workflow_name` under `root`.
pub fn workflow_dump_path(root: &Path, workflow_name: &str) -> PathBuf {
    root.join(format!("{}.json", workflow_name))
}

/// Load a workflow dump.
pub fn load_dump(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).map_err(|source| OnezoneError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| OnezoneError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a workflow dump as two-space indented JSON, keeping key order.
pub fn save_dump(path: &Path, dump: &Value) -> Result<()> {
    let mut content = serde_json::to_string_pretty(dump).map_err(|source| OnezoneError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    content.push('\n');

    write_replacing(path, &content).map_err(|source| OnezoneError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "saved workflow dump");
    Ok(())
}

/// Write through a temporary file in the target directory, then rename it
/// over `path`.
fn write_replacing(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(contents.as_bytes())?;
    file.as_file().sync_all()?;
    if let Ok(metadata) = fs::metadata(path) {
        file.as_file().set_permissions(metadata.permissions())?;
    }
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
