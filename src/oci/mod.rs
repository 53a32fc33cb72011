pub mod layer;
pub mod manifest;
pub mod registry;

use crate::error::Result;
use crate::image_ref::ImageReference;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

pub use registry::RegistryClient;

/// What a registry reports about one image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageInspection {
    /// Digest of the top-level manifest, `sha256:...`
    pub digest: String,
    pub created: Option<DateTime<Utc>>,
    pub labels: BTreeMap<String, String>,
}

impl ImageInspection {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }
}

/// Image content fetched for in-process rendering
#[derive(Debug, Clone)]
pub struct PulledImage {
    pub digest: String,
    pub labels: BTreeMap<String, String>,
    /// Layer blobs in application order
    pub layers: Vec<Vec<u8>>,
}

/// Digest resolution and accessibility probing
#[async_trait]
pub trait RegistryInspect: Send + Sync {
    async fn inspect(&self, image: &ImageReference) -> Result<ImageInspection>;
}

/// Full image retrieval
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn pull(&self, image: &ImageReference) -> Result<PulledImage>;
}

/// Tag enumeration of a repository
#[async_trait]
pub trait TagLister: Send + Sync {
    async fn list_tags(&self, repository: &ImageReference) -> Result<Vec<String>>;
}

/// Parse an RFC 3339 timestamp as produced in image configs and labels. A bare
/// `YYYY-MM-DD` is midnight UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
