use crate::bundle::BundleMetadata;
use crate::constants::{LABEL_BUILD_DATE, LABEL_BUILD_NAME, LABEL_COMMIT_OPENSHIFT, LABEL_COMMIT_VCS, LABEL_VERSION};
use crate::error::{CatalogError, Result, ResultExt};
use crate::image_ref::ImageReference;
use crate::oci::{parse_timestamp, ImageInspection, RegistryInspect, TagLister};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;

/// Tags produced by signing and attestation tooling, never bundles
const ARTIFACT_TAG_SUFFIXES: &[&str] = &[".sig", ".att", ".sbom"];

fn is_bundle_tag(tag: &str) -> bool {
    !ARTIFACT_TAG_SUFFIXES.iter().any(|s| tag.ends_with(s))
}

fn to_metadata(repository: &ImageReference, tag: &str, inspection: ImageInspection) -> BundleMetadata {
    let build_date = inspection
        .label(LABEL_BUILD_DATE)
        .map(str::to_string)
        .or_else(|| {
            inspection
                .created
                .map(|c| c.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        })
        .unwrap_or_default();

    BundleMetadata {
        image: format!("{}:{}", repository.name(), tag),
        digest: inspection.digest.clone(),
        tag: tag.to_string(),
        version: inspection.label(LABEL_VERSION).unwrap_or_default().to_string(),
        build_date,
        pr_title: inspection.label(LABEL_BUILD_NAME).map(str::to_string),
        git_commit: inspection
            .label(LABEL_COMMIT_OPENSHIFT)
            .or_else(|| inspection.label(LABEL_COMMIT_VCS))
            .map(str::to_string),
    }
}

/// One entry per digest. A moving tag such as `latest` loses to any other tag.
fn collapse_by_digest(bundles: Vec<BundleMetadata>) -> Vec<BundleMetadata> {
    let mut out: Vec<BundleMetadata> = Vec::with_capacity(bundles.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for bundle in bundles {
        match index.get(&bundle.digest) {
            Some(&i) if out[i].tag == "latest" && bundle.tag != "latest" => out[i] = bundle,
            Some(_) => {}
            None => {
                index.insert(bundle.digest.clone(), out.len());
                out.push(bundle);
            }
        }
    }
    out
}

/// Newest first by build date; equal or unparseable dates keep their relative order
fn sort_newest_first(bundles: &mut [BundleMetadata]) {
    bundles.sort_by(|a, b| {
        let (ta, tb) = (parse_timestamp(&a.build_date), parse_timestamp(&b.build_date));
        tb.cmp(&ta)
    });
}

/// The `limit` most recently built bundles in `repository`
pub async fn list_latest_bundles(
    repository: &ImageReference,
    limit: usize,
    tags: &dyn TagLister,
    inspect: &dyn RegistryInspect,
    concurrency: usize,
) -> Result<Vec<BundleMetadata>> {
    if limit == 0 {
        return Err(CatalogError::validation("number of bundles to list must be at least 1"));
    }

    let all_tags = tags
        .list_tags(repository)
        .await
        .with_context(|| format!("listing tags of {}", repository.name()))?;
    let candidates: Vec<String> = all_tags.into_iter().filter(|t| is_bundle_tag(t)).collect();
    tracing::debug!(repository = %repository.name(), tags = candidates.len(), "Inspecting bundle tags");

    let results: Vec<(String, Result<ImageInspection>)> = stream::iter(candidates)
        .map(|tag| async move {
            let mut image = repository.clone();
            image.tag = Some(tag.clone());
            image.digest = None;
            let result = inspect.inspect(&image).await;
            (tag, result)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut bundles = Vec::with_capacity(results.len());
    for (tag, result) in results {
        match result {
            Ok(inspection) => bundles.push(to_metadata(repository, &tag, inspection)),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => tracing::warn!(tag = %tag, error = %e, "Skipping tag that could not be inspected"),
        }
    }

    let mut bundles = collapse_by_digest(bundles);
    sort_newest_first(&mut bundles);
    bundles.truncate(limit);
    Ok(bundles)
}
