use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const MEDIA_TYPE_DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const MEDIA_TYPE_DOCKER_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";

/// Accept header sent for manifest requests
pub fn manifest_accept_header() -> String {
    [
        MEDIA_TYPE_OCI_INDEX,
        MEDIA_TYPE_DOCKER_LIST,
        MEDIA_TYPE_OCI_MANIFEST,
        MEDIA_TYPE_DOCKER_MANIFEST,
    ]
    .join(", ")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OCIManifest {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: OCIDescriptor,
    pub layers: Vec<OCIDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OCIDescriptor {
    #[serde(rename = "mediaType", default)]
    pub media_type: String,
    pub digest: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<OCIPlatform>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OCIPlatform {
    pub architecture: String,
    pub os: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OCIIndex {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub manifests: Vec<OCIDescriptor>,
}

/// The parts of an image config blob the catalog tooling reads
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OCIConfig {
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub config: Option<OCIImageConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OCIImageConfig {
    #[serde(rename = "Labels", default)]
    pub labels: Option<BTreeMap<String, String>>,
}

impl OCIConfig {
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.config
            .as_ref()
            .and_then(|c| c.labels.clone())
            .unwrap_or_default()
    }
}

/// A manifest body is either a single-platform manifest or a multi-platform index
pub enum ManifestKind {
    Image(OCIManifest),
    Index(OCIIndex),
}

impl ManifestKind {
    /// Decide by content type first, then by shape of the document
    pub fn parse(content_type: Option<&str>, body: &[u8]) -> anyhow::Result<Self> {
        let is_index = match content_type {
            Some(ct) if ct.starts_with(MEDIA_TYPE_OCI_INDEX) || ct.starts_with(MEDIA_TYPE_DOCKER_LIST) => true,
            Some(ct) if ct.starts_with(MEDIA_TYPE_OCI_MANIFEST) || ct.starts_with(MEDIA_TYPE_DOCKER_MANIFEST) => false,
            _ => {
                let value: serde_json::Value = serde_json::from_slice(body)?;
                value.get("manifests").is_some()
            }
        };

        if is_index {
            Ok(Self::Index(serde_json::from_slice(body)?))
        } else {
            Ok(Self::Image(serde_json::from_slice(body)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index_by_shape() {
        let body = br#"{"schemaVersion":2,"manifests":[{"mediaType":"application/vnd.oci.image.manifest.v1+json","digest":"sha256:aa","size":10,"platform":{"architecture":"amd64","os":"linux"}}]}"#;
        match ManifestKind::parse(None, body).unwrap() {
            ManifestKind::Index(index) => {
                assert_eq!(index.manifests.len(), 1);
                assert_eq!(index.manifests[0].platform.as_ref().unwrap().os, "linux");
            }
            ManifestKind::Image(_) => panic!("expected index"),
        }
    }

    #[test]
    fn test_config_labels() {
        let body = r#"{"created":"2025-10-02T12:05:37Z","config":{"Labels":{"version":"0.5.7"}}}"#;
        let config: OCIConfig = serde_json::from_str(body).unwrap();
        assert_eq!(config.labels().get("version").map(String::as_str), Some("0.5.7"));
        assert_eq!(config.created.as_deref(), Some("2025-10-02T12:05:37Z"));
    }
}
