//! Deployment manifests for a catalog image: Namespace, ImageDigestMirrorSet,
//! CatalogSource, OperatorGroup and Subscription, cross-referenced by name and
//! labelled by digest.

pub mod resources;

use crate::config::{CatalogConfig, MirrorRule, NamespaceMode};
use crate::error::{CatalogError, Result};
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use resources::{
    CatalogSource, CatalogSourceSpec, ImageDigestMirror, ImageDigestMirrorSet, ImageDigestMirrorSetSpec,
    OperatorGroup, OperatorGroupSpec, Subscription, SubscriptionSpec,
};

const LABEL_NAME: &str = "app.kubernetes.io/name";
const LABEL_CREATED_BY: &str = "app.kubernetes.io/created-by";
const LABEL_VERSION: &str = "app.kubernetes.io/version";
const LABEL_CLUSTER_MONITORING: &str = "openshift.io/cluster-monitoring";

/// What a catalog image resolved to, ready for manifest generation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogMetadata {
    /// Digest-pinned reference when the digest is known
    pub image: String,
    pub digest: String,
    pub short_digest: String,
    pub catalog_type: String,
    pub version: String,
    pub default_channel: String,
    pub package: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestSet {
    pub namespace: Namespace,
    pub idms: ImageDigestMirrorSet,
    pub catalog_source: CatalogSource,
    pub operator_group: OperatorGroup,
    pub subscription: Subscription,
}

impl ManifestSet {
    /// (file name, YAML) in apply order
    pub fn documents(&self) -> Result<Vec<(&'static str, String)>> {
        Ok(vec![
            ("00-namespace.yaml", serde_yaml_ng::to_string(&self.namespace)?),
            ("01-idms.yaml", serde_yaml_ng::to_string(&self.idms)?),
            ("02-catalogsource.yaml", serde_yaml_ng::to_string(&self.catalog_source)?),
            ("03-operatorgroup.yaml", serde_yaml_ng::to_string(&self.operator_group)?),
            ("04-subscription.yaml", serde_yaml_ng::to_string(&self.subscription)?),
        ])
    }
}

fn catalog_type_display(catalog_type: &str) -> &str {
    match catalog_type {
        "catalog-ystream" => "Y-stream",
        "catalog-zstream" => "Z-stream",
        "" => "Catalog",
        other => other.strip_prefix("catalog-").unwrap_or(other),
    }
}

pub struct ManifestGenerator {
    package: String,
    namespace_mode: NamespaceMode,
    resource_prefix: String,
    catalog_source_namespace: String,
    creator: String,
    mirrors: Vec<MirrorRule>,
}

impl ManifestGenerator {
    pub fn new(config: &CatalogConfig) -> Self {
        Self {
            package: config.package_name.clone(),
            namespace_mode: config.namespace_mode,
            resource_prefix: config.resource_prefix.clone(),
            catalog_source_namespace: config.catalog_source_namespace.clone(),
            creator: config.creator.clone(),
            mirrors: config.mirrors.clone(),
        }
    }

    /// `<prefix>-<kind>-sha-<short>`, or `<prefix>-<kind>` without a digest
    pub fn resource_name(&self, kind: &str, short_digest: &str) -> String {
        let base = format!("{}-{}", self.resource_prefix, kind);
        if short_digest.is_empty() {
            base
        } else {
            format!("{}-sha-{}", base, short_digest)
        }
    }

    pub fn namespace_name(&self, base: &str, short_digest: &str) -> String {
        match self.namespace_mode {
            NamespaceMode::DigestSuffixed if !short_digest.is_empty() => format!("{}-{}", base, short_digest),
            _ => base.to_string(),
        }
    }

    fn standard_labels(&self, meta: &CatalogMetadata, package: &str) -> BTreeMap<String, String> {
        let version = if meta.version.is_empty() { "latest" } else { meta.version.as_str() };
        let mut labels = BTreeMap::from([
            (LABEL_NAME.to_string(), package.to_string()),
            (LABEL_CREATED_BY.to_string(), self.creator.clone()),
            (LABEL_VERSION.to_string(), version.to_string()),
        ]);
        if !meta.short_digest.is_empty() {
            labels.insert(self.creator.clone(), meta.short_digest.clone());
            labels.insert(format!("{}/digest", self.creator), meta.short_digest.clone());
        }
        labels
    }

    /// Object-specific labels never override the standard set
    fn merged(standard: &BTreeMap<String, String>, extra: &[(&str, &str)]) -> BTreeMap<String, String> {
        let mut labels = standard.clone();
        for (k, v) in extra {
            labels.entry((*k).to_string()).or_insert_with(|| (*v).to_string());
        }
        labels
    }

    fn display_name(meta: &CatalogMetadata, package: &str) -> String {
        let mut parts = vec![package.to_string(), catalog_type_display(&meta.catalog_type).to_string()];
        if !meta.version.is_empty() {
            parts.push(format!("v{}", meta.version));
        }
        if !meta.short_digest.is_empty() {
            parts.push(format!("sha-{}", meta.short_digest));
        }
        parts.join(" ")
    }

    /// All five objects or an error; a catalog without a default channel has nothing
    /// safe to subscribe to.
    pub fn generate(&self, meta: &CatalogMetadata, namespace_base: &str) -> Result<ManifestSet> {
        if meta.default_channel.is_empty() {
            return Err(CatalogError::validation(format!(
                "no default channel found for catalog {}",
                meta.image
            )));
        }
        if namespace_base.is_empty() {
            return Err(CatalogError::validation("namespace cannot be empty"));
        }
        if meta.image.is_empty() {
            return Err(CatalogError::validation("catalog image cannot be empty"));
        }

        let package = if meta.package.is_empty() { self.package.as_str() } else { meta.package.as_str() };
        let short = meta.short_digest.as_str();
        let standard = self.standard_labels(meta, package);
        let namespace_name = self.namespace_name(namespace_base, short);

        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(namespace_name.clone()),
                labels: Some(Self::merged(&standard, &[(LABEL_CLUSTER_MONITORING, "true")])),
                ..Default::default()
            },
            ..Default::default()
        };

        let idms = ImageDigestMirrorSet {
            metadata: ObjectMeta {
                name: Some(self.resource_name("idms", short)),
                labels: Some(standard.clone()),
                ..Default::default()
            },
            spec: ImageDigestMirrorSetSpec {
                image_digest_mirrors: self
                    .mirrors
                    .iter()
                    .map(|m| ImageDigestMirror {
                        source: m.source.clone(),
                        mirrors: m.mirrors.clone(),
                    })
                    .collect(),
            },
        };

        let catalog_source_name = self.resource_name("catalogsource", short);
        let display_name = Self::display_name(meta, package);
        let catalog_source = CatalogSource {
            metadata: ObjectMeta {
                name: Some(catalog_source_name.clone()),
                namespace: Some(self.catalog_source_namespace.clone()),
                labels: Some(standard.clone()),
                ..Default::default()
            },
            spec: CatalogSourceSpec {
                source_type: "grpc".to_string(),
                image: meta.image.clone(),
                display_name,
                publisher: self.creator.clone(),
            },
        };

        let operator_group = OperatorGroup {
            metadata: ObjectMeta {
                name: Some(self.resource_name("operatorgroup", short)),
                namespace: Some(namespace_name.clone()),
                labels: Some(standard.clone()),
                ..Default::default()
            },
            spec: OperatorGroupSpec::default(),
        };

        let subscription = Subscription {
            metadata: ObjectMeta {
                name: Some(self.resource_name("subscription", short)),
                namespace: Some(namespace_name),
                labels: Some(standard),
                ..Default::default()
            },
            spec: SubscriptionSpec {
                channel: meta.default_channel.clone(),
                name: package.to_string(),
                source: catalog_source_name,
                source_namespace: self.catalog_source_namespace.clone(),
                install_plan_approval: "Automatic".to_string(),
            },
        };

        tracing::debug!(
            namespace = ?namespace.metadata.name,
            catalog_source = ?catalog_source.metadata.name,
            channel = %meta.default_channel,
            "Generated manifest set"
        );

        Ok(ManifestSet {
            namespace,
            idms,
            catalog_source,
            operator_group,
            subscription,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(short: &str, channel: &str) -> CatalogMetadata {
        CatalogMetadata {
            image: format!("quay.io/a/catalog-ystream@sha256:{}{}", short, "0".repeat(64 - short.len())),
            digest: String::new(),
            short_digest: short.to_string(),
            catalog_type: "catalog-ystream".to_string(),
            version: "4.19".to_string(),
            default_channel: channel.to_string(),
            package: "bpfman-operator".to_string(),
        }
    }

    #[test]
    fn test_names_and_cross_references() {
        let generator = ManifestGenerator::new(&CatalogConfig::default());
        let set = generator.generate(&meta("abc12345", "stable"), "bpfman").unwrap();

        assert_eq!(set.catalog_source.metadata.name.as_deref(), Some("bpfman-catalogsource-sha-abc12345"));
        assert_eq!(set.subscription.spec.source, "bpfman-catalogsource-sha-abc12345");
        assert_eq!(set.subscription.spec.channel, "stable");
        assert_eq!(set.namespace.metadata.name.as_deref(), Some("bpfman"));
        assert_eq!(set.operator_group.metadata.namespace, set.namespace.metadata.name);
        assert_eq!(set.subscription.metadata.namespace, set.namespace.metadata.name);
        assert_eq!(set.idms.metadata.name.as_deref(), Some("bpfman-idms-sha-abc12345"));
        assert_eq!(set.catalog_source.spec.display_name, "bpfman-operator Y-stream v4.19 sha-abc12345");
    }

    #[test]
    fn test_empty_channel_is_validation_error() {
        let generator = ManifestGenerator::new(&CatalogConfig::default());
        let err = generator.generate(&meta("abc12345", ""), "bpfman").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[test]
    fn test_no_digest_means_no_suffix() {
        let generator = ManifestGenerator::new(&CatalogConfig::default());
        let mut m = meta("abc12345", "stable");
        m.short_digest.clear();
        let set = generator.generate(&m, "bpfman").unwrap();
        assert_eq!(set.catalog_source.metadata.name.as_deref(), Some("bpfman-catalogsource"));
        let labels = set.subscription.metadata.labels.unwrap();
        assert!(!labels.contains_key("bpfman-catalog-cli/digest"));
    }

    #[test]
    fn test_digest_suffixed_namespace_mode() {
        let config = CatalogConfig {
            namespace_mode: NamespaceMode::DigestSuffixed,
            ..Default::default()
        };
        let set = ManifestGenerator::new(&config)
            .generate(&meta("abc12345", "stable"), "bpfman")
            .unwrap();
        assert_eq!(set.namespace.metadata.name.as_deref(), Some("bpfman-abc12345"));
        assert_eq!(set.subscription.metadata.namespace.as_deref(), Some("bpfman-abc12345"));
        assert_eq!(set.operator_group.metadata.namespace.as_deref(), Some("bpfman-abc12345"));
    }

    #[test]
    fn test_labels_propagate() {
        let generator = ManifestGenerator::new(&CatalogConfig::default());
        let set = generator.generate(&meta("abc12345", "stable"), "bpfman").unwrap();

        let all = [
            set.namespace.metadata.labels.clone().unwrap(),
            set.idms.metadata.labels.clone().unwrap(),
            set.catalog_source.metadata.labels.clone().unwrap(),
            set.operator_group.metadata.labels.clone().unwrap(),
            set.subscription.metadata.labels.clone().unwrap(),
        ];
        for labels in &all {
            assert_eq!(labels.get("bpfman-catalog-cli/digest").map(String::as_str), Some("abc12345"));
            assert_eq!(labels.get(LABEL_NAME).map(String::as_str), Some("bpfman-operator"));
        }
        assert_eq!(all[0].get(LABEL_CLUSTER_MONITORING).map(String::as_str), Some("true"));
        assert!(!all[1].contains_key(LABEL_CLUSTER_MONITORING));
    }

    #[test]
    fn test_extra_labels_never_override() {
        let standard = BTreeMap::from([(LABEL_NAME.to_string(), "pkg".to_string())]);
        let merged = ManifestGenerator::merged(&standard, &[(LABEL_NAME, "other"), ("x", "y")]);
        assert_eq!(merged[LABEL_NAME], "pkg");
        assert_eq!(merged["x"], "y");
    }

    #[test]
    fn test_documents_carry_kind() {
        let generator = ManifestGenerator::new(&CatalogConfig::default());
        let docs = generator
            .generate(&meta("abc12345", "stable"), "bpfman")
            .unwrap()
            .documents()
            .unwrap();
        let names: Vec<&str> = docs.iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec![
                "00-namespace.yaml",
                "01-idms.yaml",
                "02-catalogsource.yaml",
                "03-operatorgroup.yaml",
                "04-subscription.yaml"
            ]
        );
        assert!(docs[0].1.contains("kind: Namespace"));
        assert!(docs[2].1.contains("kind: CatalogSource"));
        assert!(docs[2].1.contains("sourceType: grpc"));
        assert!(docs[4].1.contains("installPlanApproval: Automatic"));
    }
}
