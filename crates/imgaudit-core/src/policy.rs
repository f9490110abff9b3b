//! Public-namespace policy.

use tracing::info;

use crate::error::{AuditError, Offender, Result};
use crate::image_set::ImageSet;

/// References that do not start with `public_prefix`, in reference order.
pub fn find_non_public(images: &ImageSet, public_prefix: &str) -> Vec<Offender> {
    images
        .iter()
        .filter(|(reference, _)| !reference.starts_with(public_prefix))
        .map(|(reference, sources)| Offender {
            reference: reference.to_string(),
            sources: sources.iter().cloned().collect(),
        })
        .collect()
}

/// Fail with [`AuditError::PolicyViolation`] unless every reference is public.
///
/// All offenders are collected, not just the first.
pub fn assert_public_only(images: &ImageSet, public_prefix: &str) -> Result<()> {
    let offenders = find_non_public(images, public_prefix);
    if offenders.is_empty() {
        info!(images = images.len(), prefix = public_prefix, "all images are public");
        return Ok(());
    }

    Err(AuditError::PolicyViolation {
        prefix: public_prefix.to_string(),
        offenders,
    })
}
