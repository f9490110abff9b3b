//! Dev-to-public image reference rewriting.
//!
//! References are replaced textually in the raw document so that the rest of
//! the file (key order, indentation, escapes) stays byte-for-byte identical.
//! The rewritten text is re-parsed before anything is written; a document
//! that would end up invalid or holding anything other than the expected
//! references is left alone. Files are replaced through a temporary file.

use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::document::WorkflowDocument;
use crate::error::{AuditError, Result};
use crate::scan::{DocumentFailure, ScanOptions, discover_documents};

/// The registry prefix pair used for rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryPrefixes {
    dev: String,
    public: String,
}

impl RegistryPrefixes {
    /// Create a prefix pair.
    ///
    /// The dev prefix must be non-empty and the public prefix must not itself
    /// start with the dev prefix, otherwise a rewritten reference would still
    /// count as a dev reference.
    pub fn new(dev: impl Into<String>, public: impl Into<String>) -> Result<Self> {
        let dev = dev.into();
        let public = public.into();

        if dev.is_empty() {
            return Err(AuditError::InvalidPrefix(
                "dev prefix must not be empty".to_string(),
            ));
        }
        if public.starts_with(&dev) {
            return Err(AuditError::InvalidPrefix(format!(
                "public prefix '{}' starts with dev prefix '{}'",
                public, dev
            )));
        }

        Ok(Self { dev, public })
    }

    /// Dev registry prefix.
    pub fn dev(&self) -> &str {
        &self.dev
    }

    /// Public namespace prefix.
    pub fn public(&self) -> &str {
        &self.public
    }

    /// Whether `reference` belongs to the dev registry.
    pub fn is_dev(&self, reference: &str) -> bool {
        reference.starts_with(&self.dev)
    }

    /// Public counterpart of a dev reference, `None` for anything else.
    pub fn public_reference(&self, reference: &str) -> Option<String> {
        reference
            .strip_prefix(&self.dev)
            .map(|rest| format!("{}{}", self.public, rest))
    }
}

/// One reference substitution applied to a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Replacement {
    /// Original reference.
    pub from: String,
    /// Replacement reference.
    pub to: String,
    /// How many times it occurred in the raw text.
    pub occurrences: usize,
}

/// Outcome of rewriting one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRewrite {
    /// Document path.
    pub path: PathBuf,
    /// Substitutions, in reference order.
    pub replacements: Vec<Replacement>,
    /// Whether the file on disk was overwritten.
    pub written: bool,
}

impl DocumentRewrite {
    /// Whether any reference needed rewriting.
    pub fn changed(&self) -> bool {
        !self.replacements.is_empty()
    }
}

/// Outcome of rewriting a workflow tree.
#[derive(Debug, Default)]
pub struct RewriteReport {
    /// Per-document results, including unchanged documents.
    pub documents: Vec<DocumentRewrite>,
    /// Documents that could not be rewritten.
    pub failures: Vec<DocumentFailure>,
}

impl RewriteReport {
    /// Documents with at least one substitution.
    pub fn changed(&self) -> impl Iterator<Item = &DocumentRewrite> {
        self.documents.iter().filter(|d| d.changed())
    }

    /// Total number of substituted occurrences.
    pub fn occurrences(&self) -> usize {
        self.changed()
            .flat_map(|d| d.replacements.iter())
            .map(|r| r.occurrences)
            .sum()
    }
}

/// Rewrite dev references in one document.
///
/// With `dry_run` the substitutions are computed and verified but the file is
/// not written.
pub fn rewrite_document(
    path: &Path,
    prefixes: &RegistryPrefixes,
    image_key: &str,
    dry_run: bool,
) -> Result<DocumentRewrite> {
    let doc = WorkflowDocument::load(path)?;

    let plan: Vec<(String, String)> = doc
        .images(image_key)
        .into_iter()
        .filter_map(|from| prefixes.public_reference(&from).map(|to| (from, to)))
        .collect();

    if plan.is_empty() {
        return Ok(DocumentRewrite {
            path: path.to_path_buf(),
            replacements: Vec::new(),
            written: false,
        });
    }

    let (text, counts) = substitute(doc.raw(), prefixes.dev(), &plan);
    let replacements: Vec<Replacement> = plan
        .into_iter()
        .zip(counts)
        .map(|((from, to), occurrences)| {
            debug!(path = %path.display(), %from, %to, occurrences, "replacing reference");
            Replacement {
                from,
                to,
                occurrences,
            }
        })
        .collect();

    let expected: BTreeSet<String> = doc
        .images(image_key)
        .into_iter()
        .map(|reference| prefixes.public_reference(&reference).unwrap_or(reference))
        .collect();
    verify_rewrite(path, text.clone(), &expected, image_key)?;

    if !dry_run {
        write_replacing(path, &text).map_err(|source| AuditError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            path = %path.display(),
            references = replacements.len(),
            "rewrote dev references"
        );
    }

    Ok(DocumentRewrite {
        path: path.to_path_buf(),
        replacements,
        written: !dry_run,
    })
}

/// Replace every planned reference in a single left-to-right pass.
///
/// At each position the longest matching `from` wins and the inserted text is
/// never scanned again, so one reference being a prefix of another (or of a
/// replacement) cannot cause a double rewrite. Returns the new text and the
/// number of substitutions per plan entry.
fn substitute(text: &str, dev_prefix: &str, plan: &[(String, String)]) -> (String, Vec<usize>) {
    let mut longest_first: Vec<usize> = (0..plan.len()).collect();
    longest_first.sort_by_key(|&i| Reverse(plan[i].0.len()));

    let mut counts = vec![0; plan.len()];
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    // Every planned reference starts with the dev prefix.
    while let Some(pos) = rest.find(dev_prefix) {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        match longest_first
            .iter()
            .find(|&&i| rest.starts_with(plan[i].0.as_str()))
        {
            Some(&i) => {
                out.push_str(&plan[i].1);
                counts[i] += 1;
                rest = &rest[plan[i].0.len()..];
            }
            None => {
                out.push_str(dev_prefix);
                rest = &rest[dev_prefix.len()..];
            }
        }
    }
    out.push_str(rest);

    (out, counts)
}

/// Check that rewritten text still parses and holds exactly the expected
/// references: the untouched ones plus the public counterparts.
fn verify_rewrite(
    path: &Path,
    text: String,
    expected: &BTreeSet<String>,
    image_key: &str,
) -> Result<()> {
    let rewritten = WorkflowDocument::from_raw(path, text).map_err(|e| {
        AuditError::IncompleteRewrite {
            path: path.to_path_buf(),
            reason: format!("result is not valid JSON ({})", e),
        }
    })?;

    let actual = rewritten.images(image_key);
    if &actual == expected {
        return Ok(());
    }

    let unexpected: Vec<&str> = actual.difference(expected).map(String::as_str).collect();
    let missing: Vec<&str> = expected.difference(&actual).map(String::as_str).collect();
    Err(AuditError::IncompleteRewrite {
        path: path.to_path_buf(),
        reason: format!(
            "unexpected references: [{}]; missing references: [{}]",
            unexpected.join(", "),
            missing.join(", ")
        ),
    })
}

/// Replace the contents of `path` through a temporary file in the same
/// directory, so a failed write never leaves a truncated document behind.
fn write_replacing(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(contents.as_bytes())?;
    file.as_file().sync_all()?;
    if let Ok(metadata) = std::fs::metadata(path) {
        file.as_file().set_permissions(metadata.permissions())?;
    }
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Rewrite every workflow document under `root`.
///
/// Documents are processed one at a time; a failing document is recorded and
/// the remaining ones are still rewritten.
pub fn rewrite_tree(
    root: &Path,
    prefixes: &RegistryPrefixes,
    options: &ScanOptions,
    dry_run: bool,
) -> Result<RewriteReport> {
    let mut report = RewriteReport::default();

    for path in discover_documents(root, &options.extension)? {
        match rewrite_document(&path, prefixes, &options.image_key, dry_run) {
            Ok(outcome) => report.documents.push(outcome),
            Err(error) => {
                warn!(path = %path.display(), %error, "document not rewritten");
                report.failures.push(DocumentFailure { path, error });
            }
        }
    }

    info!(
        documents = report.documents.len(),
        changed = report.changed().count(),
        occurrences = report.occurrences(),
        failures = report.failures.len(),
        dry_run,
        "rewrite finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::extract_images;
    use std::fs;

    fn defaults() -> RegistryPrefixes {
        RegistryPrefixes::new("docker.onedata.org", "onedata").unwrap()
    }

    #[test]
    fn test_prefix_validation() {
        assert!(matches!(
            RegistryPrefixes::new("", "onedata"),
            Err(AuditError::InvalidPrefix(_))
        ));
        assert!(matches!(
            RegistryPrefixes::new("onedata", "onedata/public"),
            Err(AuditError::InvalidPrefix(_))
        ));
        assert!(RegistryPrefixes::new("docker.onedata.org", "").is_ok());
    }

    #[test]
    fn test_public_reference() {
        let prefixes = defaults();
        assert_eq!(
            prefixes.public_reference("docker.onedata.org/foo:v1").as_deref(),
            Some("onedata/foo:v1")
        );
        assert_eq!(prefixes.public_reference("onedata/foo:v1"), None);
    }

    #[test]
    fn test_nested_reference_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.json");
        fs::write(
            &path,
            r#"{"a": [{"b": {"c": [{"dockerImage": "docker.onedata.org/foo:v1"}]}}]}"#,
        )
        .unwrap();

        let outcome = rewrite_document(&path, &defaults(), "dockerImage", false).unwrap();
        assert!(outcome.written);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            r#"{"a": [{"b": {"c": [{"dockerImage": "onedata/foo:v1"}]}}]}"#
        );
    }

    #[test]
    fn test_every_occurrence_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.json");
        fs::write(
            &path,
            r#"{"steps": [
  {"dockerImage": "docker.onedata.org/foo:v1"},
  {"dockerImage": "docker.onedata.org/foo:v1"}
]}"#,
        )
        .unwrap();

        let outcome = rewrite_document(&path, &defaults(), "dockerImage", false).unwrap();
        assert_eq!(outcome.replacements.len(), 1);
        assert_eq!(outcome.replacements[0].occurrences, 2);

        let text = fs::read_to_string(&path).unwrap();
        assert!(!text.contains("docker.onedata.org"));
        assert_eq!(text.matches("onedata/foo:v1").count(), 2);
    }

    #[test]
    fn test_formatting_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.json");
        let original = "{\n    \"zeta\": 1,\n    \"dockerImage\":   \"docker.onedata.org/x:2\",\n    \"alpha\": [ ]\n}\n";
        fs::write(&path, original).unwrap();

        rewrite_document(&path, &defaults(), "dockerImage", false).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            original.replace("docker.onedata.org/x:2", "onedata/x:2")
        );
    }

    #[test]
    fn test_round_trip_keeps_remainder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.json");
        fs::write(
            &path,
            r#"{"x": {"dockerImage": "docker.onedata.org/a/b:1.2"}, "y": {"dockerImage": "onedata/c:3"}}"#,
        )
        .unwrap();

        let before = extract_images(
            &serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap(),
            "dockerImage",
        );
        rewrite_document(&path, &defaults(), "dockerImage", false).unwrap();
        let after = extract_images(
            &serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap(),
            "dockerImage",
        );

        assert!(after.iter().all(|r| !r.starts_with("docker.onedata.org")));
        for reference in before.iter().filter(|r| r.starts_with("docker.onedata.org")) {
            let rest = &reference["docker.onedata.org".len()..];
            assert!(after.contains(&format!("onedata{}", rest)));
        }
        assert!(after.contains("onedata/c:3"));
    }

    #[test]
    fn test_overlapping_references_rewritten_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.json");
        fs::write(
            &path,
            r#"{"a": {"dockerImage": "docker.onedata.org/a"}, "b": {"dockerImage": "docker.onedata.org/a/b:1"}}"#,
        )
        .unwrap();

        let prefixes =
            RegistryPrefixes::new("docker.onedata.org", "mirror.io/docker.onedata.org").unwrap();
        let outcome = rewrite_document(&path, &prefixes, "dockerImage", false).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            r#"{"a": {"dockerImage": "mirror.io/docker.onedata.org/a"}, "b": {"dockerImage": "mirror.io/docker.onedata.org/a/b:1"}}"#
        );
        assert!(outcome.replacements.iter().all(|r| r.occurrences == 1));
    }

    #[test]
    fn test_prefix_sharing_references_counted_separately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.json");
        fs::write(
            &path,
            r#"[{"dockerImage": "docker.onedata.org/foo:v1"}, {"dockerImage": "docker.onedata.org/foo:v1.1"}]"#,
        )
        .unwrap();

        let outcome = rewrite_document(&path, &defaults(), "dockerImage", false).unwrap();
        let counts: Vec<(&str, usize)> = outcome
            .replacements
            .iter()
            .map(|r| (r.from.as_str(), r.occurrences))
            .collect();
        assert_eq!(
            counts,
            vec![
                ("docker.onedata.org/foo:v1", 1),
                ("docker.onedata.org/foo:v1.1", 1),
            ]
        );
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            r#"[{"dockerImage": "onedata/foo:v1"}, {"dockerImage": "onedata/foo:v1.1"}]"#
        );
    }

    #[test]
    fn test_substitute_prefers_longest_match() {
        let plan = vec![
            ("dev/a".to_string(), "pub/a".to_string()),
            ("dev/a/b".to_string(), "pub/a/b".to_string()),
        ];
        let (text, counts) = substitute(r#""dev/a/b" "dev/a" "dev/x""#, "dev", &plan);
        assert_eq!(text, r#""pub/a/b" "pub/a" "dev/x""#);
        assert_eq!(counts, vec![1, 1]);
    }

    #[test]
    fn test_rewrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.json");
        fs::write(&path, r#"{"dockerImage": "docker.onedata.org/foo:v1"}"#).unwrap();

        rewrite_document(&path, &defaults(), "dockerImage", false).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_rewrite_keeps_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.json");
        fs::write(&path, r#"{"dockerImage": "docker.onedata.org/foo:v1"}"#).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        rewrite_document(&path, &defaults(), "dockerImage", false).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_unchanged_document_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.json");
        fs::write(&path, r#"{"dockerImage": "onedata/foo:v1"}"#).unwrap();

        let outcome = rewrite_document(&path, &defaults(), "dockerImage", false).unwrap();
        assert!(!outcome.changed());
        assert!(!outcome.written);
    }

    #[test]
    fn test_dry_run_leaves_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.json");
        let original = r#"{"dockerImage": "docker.onedata.org/foo:v1"}"#;
        fs::write(&path, original).unwrap();

        let outcome = rewrite_document(&path, &defaults(), "dockerImage", true).unwrap();
        assert!(outcome.changed());
        assert!(!outcome.written);
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_invalid_document_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.json");
        let original = r#"{"dockerImage": "docker.onedata.org/foo:v1""#;
        fs::write(&path, original).unwrap();

        let err = rewrite_document(&path, &defaults(), "dockerImage", false).unwrap_err();
        assert!(matches!(err, AuditError::Parse { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_escaped_reference_is_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.json");
        let original = r#"{"dockerImage": "docker.onedata.org\/foo:v1"}"#;
        fs::write(&path, original).unwrap();

        let err = rewrite_document(&path, &defaults(), "dockerImage", false).unwrap_err();
        assert!(matches!(err, AuditError::IncompleteRewrite { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_two_documents_rewritten_independently() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("sub").join("b.json");
        fs::create_dir_all(b.parent().unwrap()).unwrap();
        fs::write(&a, r#"{"dockerImage": "docker.onedata.org/foo:v1"}"#).unwrap();
        fs::write(&b, r#"[{"dockerImage": "docker.onedata.org/foo:v1"}]"#).unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();

        let report = rewrite_tree(dir.path(), &defaults(), &ScanOptions::default(), false).unwrap();
        assert_eq!(report.changed().count(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.occurrences(), 2);
        assert_eq!(
            fs::read_to_string(&a).unwrap(),
            r#"{"dockerImage": "onedata/foo:v1"}"#
        );
        assert_eq!(
            fs::read_to_string(&b).unwrap(),
            r#"[{"dockerImage": "onedata/foo:v1"}]"#
        );
    }
}
