//! End-to-end tests over a realistic workflow dump tree.

use std::fs;
use std::path::Path;

use imgaudit_core::{
    AuditError, RegistryPrefixes, ScanOptions, assert_public_only, rewrite_tree, scan_tree,
};

/// A trimmed-down workflow schema dump with lambdas in both the lane tree
/// and the supplementary lambda map.
fn workflow_dump(image_a: &str, image_b: &str) -> String {
    format!(
        r#"{{
  "schemaFormatVersion": 3,
  "name": "detect-file-formats",
  "revision": {{
    "originalRevisionNumber": 1,
    "atmWorkflowSchemaRevision": {{
      "lanes": [
        {{
          "parallelBoxes": [
            {{ "tasks": [ {{ "lambdaId": "l1", "lambdaRevisionNumber": 1 }} ] }}
          ]
        }}
      ]
    }},
    "supplementaryAtmLambdas": {{
      "l1": {{
        "1": {{
          "revision": {{
            "atmLambdaRevision": {{
              "name": "detect-file-format",
              "operationSpec": {{ "engine": "openfaas", "dockerImage": "{image_a}" }},
              "checksum": "abc"
            }}
          }}
        }}
      }},
      "l2": {{
        "1": {{
          "revision": {{
            "atmLambdaRevision": {{
              "operationSpec": {{ "engine": "openfaas", "dockerImage": "{image_b}" }}
            }}
          }}
        }}
      }}
    }}
  }}
}}
"#
    )
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[test]
fn test_rewrite_then_public_only_passes() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(
        &root.join("detect-file-formats.json"),
        &workflow_dump(
            "docker.onedata.org/detect-file-format:v1",
            "onedata/echo:v2",
        ),
    );
    write(
        &root.join("bagit/bagit-uploader.json"),
        &workflow_dump(
            "docker.onedata.org/detect-file-format:v1",
            "docker.onedata.org/bagit-validate:v3",
        ),
    );

    let options = ScanOptions::default();
    let before = scan_tree(root, &options).unwrap();
    assert_eq!(
        before.images.references().collect::<Vec<_>>(),
        vec![
            "docker.onedata.org/bagit-validate:v3",
            "docker.onedata.org/detect-file-format:v1",
            "onedata/echo:v2",
        ]
    );
    assert!(matches!(
        assert_public_only(&before.images, "onedata"),
        Err(AuditError::PolicyViolation { .. })
    ));

    let prefixes = RegistryPrefixes::new("docker.onedata.org", "onedata").unwrap();
    let report = rewrite_tree(root, &prefixes, &options, false).unwrap();
    assert_eq!(report.changed().count(), 2);
    assert!(report.failures.is_empty());

    let after = scan_tree(root, &options).unwrap();
    assert_eq!(
        after.images.references().collect::<Vec<_>>(),
        vec![
            "onedata/bagit-validate:v3",
            "onedata/detect-file-format:v1",
            "onedata/echo:v2",
        ]
    );
    assert!(assert_public_only(&after.images, "onedata").is_ok());

    // Everything except the references is untouched.
    let text = fs::read_to_string(root.join("detect-file-formats.json")).unwrap();
    assert_eq!(
        text,
        workflow_dump("onedata/detect-file-format:v1", "onedata/echo:v2")
    );
}

#[test]
fn test_scan_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("wf.json"),
        &workflow_dump("onedata/a:1", "docker.onedata.org/b:1"),
    );

    let options = ScanOptions::default();
    let first = scan_tree(dir.path(), &options).unwrap();
    let second = scan_tree(dir.path(), &options).unwrap();
    assert_eq!(first.images, second.images);
}

#[test]
fn test_custom_prefixes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wf.json");
    write(
        &path,
        &workflow_dump("registry.internal:5000/tools/x:1", "onedata/y:1"),
    );

    let prefixes = RegistryPrefixes::new("registry.internal:5000/tools", "acme").unwrap();
    rewrite_tree(dir.path(), &prefixes, &ScanOptions::default(), false).unwrap();

    let after = scan_tree(dir.path(), &ScanOptions::default()).unwrap();
    assert!(after.images.contains("acme/x:1"));
    assert!(after.images.contains("onedata/y:1"));
}
