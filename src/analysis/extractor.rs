use crate::error::{Result, ResultExt};
use crate::render::{ImageRenderer, RefKind};
use std::collections::HashSet;

/// Every image a bundle references: the bundle itself, then its related images,
/// de-duplicated in first-seen order
pub async fn extract_image_references(bundle_image: &str, renderer: &dyn ImageRenderer) -> Result<Vec<String>> {
    let cfg = renderer
        .render(&[bundle_image.to_string()], RefKind::BundleOnly)
        .await
        .with_context(|| format!("rendering bundle {}", bundle_image))?;

    let mut seen = HashSet::new();
    let images: Vec<String> = cfg
        .bundles
        .iter()
        .flat_map(|bundle| bundle.image_references())
        .filter(|image| seen.insert(image.clone()))
        .collect();

    tracing::debug!(bundle = %bundle_image, images = images.len(), "Extracted image references");
    Ok(images)
}
