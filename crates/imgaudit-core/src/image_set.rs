//! Deduplicated collection of image references.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Image references found during a scan, each with the documents that
/// mention it.
///
/// Iteration is lexicographic by reference so reports are reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ImageSet {
    images: BTreeMap<String, BTreeSet<PathBuf>>,
}

impl ImageSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reference found in `source`.
    pub fn insert(&mut self, reference: impl Into<String>, source: impl Into<PathBuf>) {
        self.images
            .entry(reference.into())
            .or_default()
            .insert(source.into());
    }

    /// Record every reference of one document.
    pub fn extend_from_document<I>(&mut self, references: I, source: &Path)
    where
        I: IntoIterator<Item = String>,
    {
        for reference in references {
            self.insert(reference, source);
        }
    }

    /// Merge another set into this one.
    pub fn merge(&mut self, other: ImageSet) {
        for (reference, sources) in other.images {
            self.images.entry(reference).or_default().extend(sources);
        }
    }

    /// Number of distinct references.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Whether no references were found.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Whether `reference` is in the set.
    pub fn contains(&self, reference: &str) -> bool {
        self.images.contains_key(reference)
    }

    /// References in lexicographic order.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.images.keys().map(String::as_str)
    }

    /// Documents mentioning `reference`.
    pub fn sources(&self, reference: &str) -> Vec<PathBuf> {
        self.images
            .get(reference)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// References paired with their sources.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<PathBuf>)> {
        self.images.iter().map(|(r, s)| (r.as_str(), s))
    }
}

impl<R: Into<String>, P: Into<PathBuf>> FromIterator<(R, P)> for ImageSet {
    fn from_iter<T: IntoIterator<Item = (R, P)>>(iter: T) -> Self {
        let mut set = ImageSet::new();
        for (reference, source) in iter {
            set.insert(reference, source);
        }
        set
    }
}
