//! Bundle image handling: metadata extraction, FBC template assembly, listing and the
//! artefact set needed to build a catalog image from bundles.

pub mod fbc;
pub mod generator;
pub mod list;
pub mod metadata;
pub mod renderer;
pub mod scaffold;

use serde::{Deserialize, Serialize};

pub use fbc::{catalog_entry_name, FbcTemplate};
pub use generator::{ArtefactGenerator, Artefacts};
pub use renderer::{LibraryTemplateRenderer, TemplateRenderer};

/// Identity of a rendered bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleInfo {
    /// Catalog-unique bundle name, usually the CSV name
    pub name: String,
    pub package: String,
}

/// Registry facts about one bundle image, used for listing and chain building
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleMetadata {
    pub image: String,
    pub digest: String,
    pub tag: String,
    #[serde(default)]
    pub version: String,
    /// ISO-8601, as found in the `build-date` label or image config
    #[serde(default)]
    pub build_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
}

impl BundleMetadata {
    /// `registry/namespace/repository@digest`, the pinned form used in templates
    pub fn pinned_image(&self) -> String {
        let base = match self.image.split_once('@') {
            Some((base, _)) => base,
            None => self.image.as_str(),
        };
        // drop a tag but not a registry port
        let base = match base.rfind(':') {
            Some(idx) if !base[idx + 1..].contains('/') => &base[..idx],
            _ => base,
        };
        if self.digest.is_empty() {
            self.image.clone()
        } else {
            format!("{}@{}", base, self.digest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pinned_image() {
        let meta = BundleMetadata {
            image: "localhost:5000/ns/bundle:abc".to_string(),
            digest: "sha256:ff".to_string(),
            ..Default::default()
        };
        assert_eq!(meta.pinned_image(), "localhost:5000/ns/bundle@sha256:ff");

        let unpinned = BundleMetadata {
            image: "quay.io/ns/bundle:abc".to_string(),
            ..Default::default()
        };
        assert_eq!(unpinned.pinned_image(), "quay.io/ns/bundle:abc");
    }

    #[test]
    fn test_metadata_json_field_names() {
        let meta = BundleMetadata {
            image: "quay.io/ns/bundle:abc".to_string(),
            build_date: "2025-10-02T12:05:37Z".to_string(),
            git_commit: Some("abc".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["buildDate"], "2025-10-02T12:05:37Z");
        assert_eq!(json["gitCommit"], "abc");
        assert!(json.get("prTitle").is_none());
    }
}
