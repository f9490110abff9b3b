//! Workflow directory scanning.
//!
//! Discovers workflow dumps under a root directory, loads them, and builds
//! the [`ImageSet`] for the whole tree. A document that fails to load is
//! recorded and skipped; its siblings are still scanned.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::document::WorkflowDocument;
use crate::error::{AuditError, Result};
use crate::image_set::ImageSet;

/// What to look for while scanning.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// File extension of workflow dumps (without the dot).
    pub extension: String,
    /// Object key naming container images.
    pub image_key: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            extension: "json".to_string(),
            image_key: "dockerImage".to_string(),
        }
    }
}

impl ScanOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the workflow file extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Set the image key.
    pub fn with_image_key(mut self, key: impl Into<String>) -> Self {
        self.image_key = key.into();
        self
    }
}

/// A document that could not be processed.
#[derive(Debug)]
pub struct DocumentFailure {
    /// Document path.
    pub path: PathBuf,
    /// What went wrong.
    pub error: AuditError,
}

/// Outcome of scanning a workflow tree.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Documents that were loaded successfully.
    pub documents: Vec<PathBuf>,
    /// All image references found in those documents.
    pub images: ImageSet,
    /// Documents that failed to load.
    pub failures: Vec<DocumentFailure>,
}

impl ScanReport {
    /// Whether every discovered document was loaded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// List workflow files under `root` with the given extension, sorted.
pub fn discover_documents(root: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(AuditError::Io {
            path: root.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "workflow directory not found",
            ),
        });
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == extension) {
            documents.push(path.to_path_buf());
        }
    }

    debug!(
        root = %root.display(),
        count = documents.len(),
        "discovered workflow documents"
    );
    Ok(documents)
}

/// Scan every workflow document under `root`.
pub fn scan_tree(root: &Path, options: &ScanOptions) -> Result<ScanReport> {
    let mut report = ScanReport::default();

    for path in discover_documents(root, &options.extension)? {
        match WorkflowDocument::load(&path) {
            Ok(doc) => {
                report
                    .images
                    .extend_from_document(doc.images(&options.image_key), &path);
                report.documents.push(path);
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping workflow document");
                report.failures.push(DocumentFailure { path, error });
            }
        }
    }

    info!(
        documents = report.documents.len(),
        images = report.images.len(),
        failures = report.failures.len(),
        "scanned {}",
        root.display()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_discovers_recursively_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.json", "{}");
        write(dir.path(), "a.json", "{}");
        write(dir.path(), "nested/deep/c.json", "{}");
        write(dir.path(), "readme.md", "# not a workflow");

        let docs = discover_documents(dir.path(), "json").unwrap();
        let names: Vec<_> = docs
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.json"),
                PathBuf::from("b.json"),
                PathBuf::from("nested/deep/c.json"),
            ]
        );
    }

    #[test]
    fn test_missing_root_is_io_error() {
        let err = discover_documents(Path::new("/nonexistent/workflows"), "json").unwrap_err();
        assert!(matches!(err, AuditError::Io { .. }));
    }

    #[test]
    fn test_same_image_in_two_documents() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "one.json",
            r#"{"lambda": {"dockerImage": "docker.onedata.org/foo:v1"}}"#,
        );
        write(
            dir.path(),
            "two.json",
            r#"[{"dockerImage": "docker.onedata.org/foo:v1"}]"#,
        );

        let report = scan_tree(dir.path(), &ScanOptions::default()).unwrap();
        assert_eq!(report.images.len(), 1);
        assert_eq!(report.images.sources("docker.onedata.org/foo:v1").len(), 2);
        assert_eq!(report.documents.len(), 2);
        assert!(report.is_complete());
    }

    #[test]
    fn test_invalid_document_does_not_stop_scan() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.json", r#"{"dockerImage": "onedata/ok:1"}"#);
        let bad = write(dir.path(), "bad.json", "{ broken");

        let report = scan_tree(dir.path(), &ScanOptions::default()).unwrap();
        assert!(report.images.contains("onedata/ok:1"));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, bad);
        assert!(matches!(report.failures[0].error, AuditError::Parse { .. }));
    }

    #[test]
    fn test_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let report = scan_tree(dir.path(), &ScanOptions::default()).unwrap();
        assert!(report.images.is_empty());
        assert!(report.documents.is_empty());
    }

    #[test]
    fn test_custom_extension() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "wf.dump", r#"{"dockerImage": "onedata/x:1"}"#);
        write(dir.path(), "wf.json", r#"{"dockerImage": "onedata/y:1"}"#);

        let options = ScanOptions::new().with_extension("dump");
        let report = scan_tree(dir.path(), &options).unwrap();
        assert_eq!(report.images.references().collect::<Vec<_>>(), vec!["onedata/x:1"]);
    }
}
