//! Publication assertion.
//!
//! Each reference gets exactly one manifest query. Every kind of failure
//! (missing manifest, network, auth, missing tooling) means "not confirmed
//! published"; nothing is retried.

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, info};

use crate::error::{AuditError, Result, UnpublishedImage};
use crate::image_set::ImageSet;

/// Result of a single manifest query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestStatus {
    /// The registry has a manifest for the reference.
    Published,
    /// The manifest could not be confirmed.
    Unconfirmed { reason: String },
}

impl ManifestStatus {
    /// Whether the manifest was found.
    pub fn is_published(&self) -> bool {
        matches!(self, ManifestStatus::Published)
    }
}

/// Something that can tell whether an image manifest exists on its registry.
#[async_trait]
pub trait ManifestProbe: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Query the registry once for `reference`.
    async fn manifest_status(&self, reference: &str) -> ManifestStatus;
}

/// Query every reference, at most `concurrency` at a time.
///
/// `on_checked` is called as results arrive; the returned list is in
/// reference order.
pub async fn check_published<F>(
    images: &ImageSet,
    probe: &dyn ManifestProbe,
    concurrency: usize,
    mut on_checked: F,
) -> Vec<(String, ManifestStatus)>
where
    F: FnMut(&str, &ManifestStatus),
{
    let mut results = Vec::with_capacity(images.len());
    let mut queries = futures::stream::iter(images.references().map(|reference| async move {
        let status = probe.manifest_status(reference).await;
        (reference.to_string(), status)
    }))
    .buffer_unordered(concurrency.max(1));

    while let Some((reference, status)) = queries.next().await {
        debug!(probe = probe.name(), %reference, ?status, "manifest checked");
        on_checked(&reference, &status);
        results.push((reference, status));
    }

    results.sort_by(|a, b| a.0.cmp(&b.0));
    results
}

/// Fail with [`AuditError::Unpublished`] unless every reference resolves.
pub async fn assert_published(
    images: &ImageSet,
    probe: &dyn ManifestProbe,
    concurrency: usize,
) -> Result<()> {
    let results = check_published(images, probe, concurrency, |_, _| {}).await;
    unpublished_from(images, results)
}

/// Turn probe results into the assertion outcome.
pub fn unpublished_from(images: &ImageSet, results: Vec<(String, ManifestStatus)>) -> Result<()> {
    let total = results.len();
    let offenders: Vec<UnpublishedImage> = results
        .into_iter()
        .filter_map(|(reference, status)| match status {
            ManifestStatus::Published => None,
            ManifestStatus::Unconfirmed { reason } => Some(UnpublishedImage {
                sources: images.sources(&reference),
                reference,
                reason,
            }),
        })
        .collect();

    if offenders.is_empty() {
        info!(images = total, "all images are published");
        Ok(())
    } else {
        Err(AuditError::Unpublished { offenders })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Probe answering from a fixed list and recording queries.
    struct FakeProbe {
        published: HashSet<String>,
        queried: Mutex<Vec<String>>,
    }

    impl FakeProbe {
        fn new(published: &[&str]) -> Self {
            Self {
                published: published.iter().map(|s| s.to_string()).collect(),
                queried: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ManifestProbe for FakeProbe {
        fn name(&self) -> &str {
            "fake"
        }

        async fn manifest_status(&self, reference: &str) -> ManifestStatus {
            self.queried.lock().unwrap().push(reference.to_string());
            if self.published.contains(reference) {
                ManifestStatus::Published
            } else {
                ManifestStatus::Unconfirmed {
                    reason: "manifest unknown".to_string(),
                }
            }
        }
    }

    #[tokio::test]
    async fn test_empty_set_succeeds_without_queries() {
        let probe = FakeProbe::new(&[]);
        assert!(assert_published(&ImageSet::new(), &probe, 4).await.is_ok());
        assert!(probe.queried.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_all_published() {
        let images: ImageSet = [("onedata/a:1", "x.json"), ("onedata/b:1", "y.json")]
            .into_iter()
            .collect();
        let probe = FakeProbe::new(&["onedata/a:1", "onedata/b:1"]);
        assert!(assert_published(&images, &probe, 2).await.is_ok());
        assert_eq!(probe.queried.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unpublished_reference_reported_with_source() {
        let images: ImageSet = [("onedata/a:1", "x.json"), ("onedata/gone:1", "y.json")]
            .into_iter()
            .collect();
        let probe = FakeProbe::new(&["onedata/a:1"]);

        let err = assert_published(&images, &probe, 1).await.unwrap_err();
        match err {
            AuditError::Unpublished { offenders } => {
                assert_eq!(offenders.len(), 1);
                assert_eq!(offenders[0].reference, "onedata/gone:1");
                assert_eq!(offenders[0].reason, "manifest unknown");
                assert_eq!(offenders[0].sources, vec![std::path::PathBuf::from("y.json")]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_each_reference_queried_once_in_order() {
        let images: ImageSet = [
            ("onedata/c:1", "x.json"),
            ("onedata/a:1", "x.json"),
            ("onedata/b:1", "y.json"),
        ]
        .into_iter()
        .collect();
        let probe = FakeProbe::new(&[]);

        let mut seen = 0;
        let results = check_published(&images, &probe, 0, |_, _| seen += 1).await;
        assert_eq!(seen, 3);
        let refs: Vec<_> = results.iter().map(|(r, _)| r.as_str()).collect();
        assert_eq!(refs, vec!["onedata/a:1", "onedata/b:1", "onedata/c:1"]);
        assert_eq!(probe.queried.lock().unwrap().len(), 3);
    }
}
