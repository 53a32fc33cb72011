//! Bundle content analysis: which images a bundle pulls in and where each one can
//! actually be fetched from.

pub mod analyzer;
pub mod extractor;
pub mod format;
pub mod inspector;

pub use analyzer::BundleAnalyzer;
pub use format::{format_analysis, OutputFormat};
pub use inspector::ImageInspector;

use crate::constants::{
    LABEL_BUILD_NAME, LABEL_COMMIT_OPENSHIFT, LABEL_COMMIT_VCS, LABEL_SOURCE_OPENSHIFT, LABEL_SOURCE_VCS,
    LABEL_VERSION,
};
use crate::oci::ImageInspection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an image was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistryClass {
    Primary,
    TenantWorkspace,
    NotAccessible,
}

impl fmt::Display for RegistryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::TenantWorkspace => write!(f, "tenant workspace"),
            Self::NotAccessible => write!(f, "not accessible"),
        }
    }
}

/// Label-derived facts about an inspected image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_title: Option<String>,
}

impl From<&ImageInspection> for ImageInfo {
    fn from(inspection: &ImageInspection) -> Self {
        let owned = |key: &str| inspection.label(key).map(str::to_string);
        Self {
            created: inspection.created,
            version: owned(LABEL_VERSION),
            git_commit: owned(LABEL_COMMIT_OPENSHIFT).or_else(|| owned(LABEL_COMMIT_VCS)),
            git_url: owned(LABEL_SOURCE_OPENSHIFT).or_else(|| owned(LABEL_SOURCE_VCS)),
            pr_title: owned(LABEL_BUILD_NAME),
        }
    }
}

/// Outcome of probing one image. Built once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResult {
    pub reference: String,
    pub accessible: bool,
    pub registry: RegistryClass,
    /// Reference that answered, when it differs from `reference`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<ImageInfo>,
}

impl ImageResult {
    pub fn not_accessible(reference: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            accessible: false,
            registry: RegistryClass::NotAccessible,
            resolved: None,
            error: Some(error.into()),
            info: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_images: usize,
    pub accessible_images: usize,
    pub inaccessible_images: usize,
    pub primary_images: usize,
    pub tenant_images: usize,
}

pub fn calculate_summary(results: &[ImageResult]) -> Summary {
    results.iter().fold(
        Summary {
            total_images: results.len(),
            ..Default::default()
        },
        |mut summary, result| {
            if result.accessible {
                summary.accessible_images += 1;
                match result.registry {
                    RegistryClass::Primary => summary.primary_images += 1,
                    RegistryClass::TenantWorkspace => summary.tenant_images += 1,
                    RegistryClass::NotAccessible => {}
                }
            } else {
                summary.inaccessible_images += 1;
            }
            summary
        },
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleAnalysis {
    pub bundle_ref: String,
    /// Reference the bundle was actually read from
    pub resolved_bundle_ref: String,
    pub bundle_registry: RegistryClass,
    pub bundle_info: ImageInfo,
    pub images: Vec<ImageResult>,
    pub summary: Summary,
}

impl BundleAnalysis {
    /// Drop inaccessible images; the summary is recomputed over what remains
    pub fn accessible_only(mut self) -> Self {
        self.images.retain(|image| image.accessible);
        self.summary = calculate_summary(&self.images);
        self
    }
}
