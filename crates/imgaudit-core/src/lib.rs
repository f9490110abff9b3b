//! Workflow image auditing.
//!
//! Scans a directory of workflow dumps for container image references and
//! offers three operations over the resulting [`ImageSet`]:
//!
//! - [`rewrite_tree`]: substitute the dev registry prefix with the public one,
//!   in place, touching only the reference substrings
//! - [`assert_public_only`]: every reference lives in the public namespace
//! - [`assert_published`]: every reference resolves on its registry
//!
//! ```text
//! workflows/**/*.json ──scan_tree──▶ ImageSet ──┬─▶ assert_public_only
//!                                               └─▶ assert_published(ManifestProbe)
//! ```

pub mod document;
pub mod error;
pub mod image_set;
pub mod policy;
pub mod publish;
pub mod rewrite;
pub mod scan;

pub use document::{WorkflowDocument, extract_images};
pub use error::{AuditError, Offender, Result, UnpublishedImage};
pub use image_set::ImageSet;
pub use policy::{assert_public_only, find_non_public};
pub use publish::{
    ManifestProbe, ManifestStatus, assert_published, check_published, unpublished_from,
};
pub use rewrite::{
    DocumentRewrite, RegistryPrefixes, Replacement, RewriteReport, rewrite_document, rewrite_tree,
};
pub use scan::{DocumentFailure, ScanOptions, ScanReport, discover_documents, scan_tree};
