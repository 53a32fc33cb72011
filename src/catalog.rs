//! Catalog image → [`CatalogMetadata`]: digest resolution, naming heuristics and the
//! default channel read from the rendered catalog.

use crate::error::{Result, ResultExt};
use crate::image_ref::{resolve_digest, ImageReference};
use crate::manifests::CatalogMetadata;
use crate::oci::RegistryInspect;
use crate::render::{ImageRenderer, RefKind};

/// `catalog-ystream-foo` → `catalog-ystream`; empty for repositories not named as catalogs
pub fn infer_catalog_type(repository: &str) -> String {
    if !repository.contains("catalog") {
        return String::new();
    }
    let parts: Vec<&str> = repository.split('-').collect();
    if parts.len() >= 2 {
        parts[..2].join("-")
    } else {
        String::new()
    }
}

/// Best-effort version: `v4.19` / `4.20.0` tags, else an `ocp4-NN` repository segment
pub fn infer_version(repository: &str, tag: Option<&str>) -> String {
    if let Some(tag) = tag.filter(|t| !t.is_empty()) {
        if let Some(v) = tag.strip_prefix('v') {
            return v.to_string();
        }
        if tag.split('.').count() >= 2 {
            return tag.to_string();
        }
    }

    let parts: Vec<&str> = repository.split('-').collect();
    parts
        .windows(2)
        .find(|w| w[0] == "ocp4" && !w[1].is_empty() && w[1].chars().all(|c| c.is_ascii_digit()))
        .map(|w| format!("4.{}", w[1]))
        .unwrap_or_default()
}

/// Resolve, render and summarise a catalog image. Rendering failure is fatal here:
/// without the rendered catalog there is no channel to subscribe to.
pub async fn extract_metadata(
    reference: &str,
    package: &str,
    inspect: &dyn RegistryInspect,
    renderer: &dyn ImageRenderer,
) -> Result<CatalogMetadata> {
    let parsed = ImageReference::parse(reference)?;
    let resolved = resolve_digest(parsed, inspect)
        .await
        .with_context(|| format!("resolving digest of {}", reference))?;

    let image = resolved.digest_ref();
    let digest = resolved.digest.clone().unwrap_or_default();

    let cfg = renderer
        .render(std::slice::from_ref(&image), RefKind::CatalogOnly)
        .await
        .with_context(|| format!("rendering catalog {}", image))?;

    // the configured package, or the catalog's only package when it is named differently
    let package = if cfg.package(package).is_some() || cfg.packages.len() != 1 {
        package.to_string()
    } else {
        cfg.packages[0].name.clone()
    };
    let default_channel = cfg.default_channel(Some(&package)).unwrap_or_default().to_string();

    tracing::info!(catalog = %image, package = %package, channel = %default_channel, "Extracted catalog metadata");

    Ok(CatalogMetadata {
        short_digest: resolved.short_digest(),
        catalog_type: infer_catalog_type(&resolved.repository),
        version: infer_version(&resolved.repository, resolved.tag.as_deref()),
        image,
        digest,
        default_channel,
        package,
    })
}
