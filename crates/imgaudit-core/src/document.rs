//! Workflow documents and image extraction.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::error::{AuditError, Result};

/// A workflow dump loaded from disk.
///
/// Keeps the raw text next to the parsed tree so that rewrites can operate on
/// the exact bytes the repository stores.
#[derive(Debug, Clone)]
pub struct WorkflowDocument {
    path: PathBuf,
    raw: String,
    value: Value,
}

impl WorkflowDocument {
    /// Read and parse a document.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let raw = std::fs::read_to_string(&path).map_err(|source| AuditError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_raw(path, raw)
    }

    /// Parse a document from text already in memory.
    pub fn from_raw(path: impl Into<PathBuf>, raw: String) -> Result<Self> {
        let path = path.into();
        let value = serde_json::from_str(&raw).map_err(|source| AuditError::Parse {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path, raw, value })
    }

    /// Location of the document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw document text.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Parsed document tree.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Every image referenced under `image_key`, at any depth.
    pub fn images(&self, image_key: &str) -> BTreeSet<String> {
        let images = extract_images(&self.value, image_key);
        debug!(
            path = %self.path.display(),
            count = images.len(),
            "extracted image references"
        );
        images
    }
}

/// Collect every string stored under `key` anywhere in `value`.
///
/// Lambda definitions can sit at arbitrary depth (lanes, parallel boxes,
/// supplementary lambda maps), so the whole tree is visited. Non-string
/// values under `key` are ignored but still descended into.
pub fn extract_images(value: &Value, key: &str) -> BTreeSet<String> {
    let mut images = BTreeSet::new();
    collect(value, key, &mut images);
    images
}

fn collect(value: &Value, key: &str, images: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                if k == key
                    && let Value::String(image) = v
                {
                    images.insert(image.clone());
                }
                collect(v, key, images);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect(item, key, images);
            }
        }
        _ => {}
    }
}
