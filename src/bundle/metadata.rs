use crate::bundle::BundleInfo;
use crate::error::{CatalogError, Result, ResultExt};
use crate::render::{ImageRenderer, RefKind};

/// Render `bundle_image` as a bundle and return the entry rendered from exactly that
/// reference. A renderer that answers with some other image (e.g. a mirror) is an error.
pub async fn extract(bundle_image: &str, renderer: &dyn ImageRenderer) -> Result<BundleInfo> {
    let cfg = renderer
        .render(&[bundle_image.to_string()], RefKind::BundleOnly)
        .await
        .with_context(|| format!("rendering bundle {}", bundle_image))?;

    cfg.bundles
        .into_iter()
        .find(|b| b.image == bundle_image)
        .map(|b| BundleInfo {
            name: b.name,
            package: b.package,
        })
        .ok_or_else(|| CatalogError::not_found("bundle", format!("{} not in rendered config", bundle_image)))
}
