use crate::constants::{DEFAULT_CHANNEL, DEFAULT_INSPECT_CONCURRENCY};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// How the target namespace is named
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamespaceMode {
    /// Namespace is exactly the configured base name
    Plain,
    /// Namespace is `<base>-<shortDigest>` when a digest is known
    DigestSuffixed,
}

impl std::str::FromStr for NamespaceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "digest-suffixed" => Ok(Self::DigestSuffixed),
            other => Err(format!("unknown namespace mode: {}", other)),
        }
    }
}

/// Fallback registry location used when an image is not yet published to its primary registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantWorkspace {
    pub registry: String,
    pub namespace: String,
    /// Prefix added to the repository name, e.g. `ocp-`
    pub repository_prefix: String,
    /// Substrings removed from the repository name, e.g. `-rhel9`
    pub strip_from_repository: Vec<String>,
}

impl Default for TenantWorkspace {
    fn default() -> Self {
        Self {
            registry: "quay.io".to_string(),
            namespace: "redhat-user-workloads/ocp-bpfman-tenant".to_string(),
            repository_prefix: "ocp-".to_string(),
            strip_from_repository: vec!["-rhel9".to_string()],
        }
    }
}

/// One ImageDigestMirrorSet rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorRule {
    pub source: String,
    pub mirrors: Vec<String>,
}

/// Target platform used to pick an entry out of a manifest list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
}

impl Default for Platform {
    fn default() -> Self {
        Self {
            os: "linux".to_string(),
            architecture: "amd64".to_string(),
        }
    }
}

/// Configuration threaded into every collaborator at construction time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub package_name: String,
    pub default_channel: String,
    pub namespace: String,
    pub namespace_mode: NamespaceMode,
    pub resource_prefix: String,
    pub catalog_source_namespace: String,
    pub creator: String,
    pub tenant: TenantWorkspace,
    pub default_bundle_repository: String,
    pub platform: Platform,
    pub opm_binary: Option<PathBuf>,
    #[serde(skip_serializing)]
    pub registry_token: Option<String>,
    pub show_tool_output: bool,
    pub inspect_concurrency: usize,
    pub mirrors: Vec<MirrorRule>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            package_name: "bpfman-operator".to_string(),
            default_channel: DEFAULT_CHANNEL.to_string(),
            namespace: "bpfman".to_string(),
            namespace_mode: NamespaceMode::Plain,
            resource_prefix: "bpfman".to_string(),
            catalog_source_namespace: "openshift-marketplace".to_string(),
            creator: "bpfman-catalog-cli".to_string(),
            tenant: TenantWorkspace::default(),
            default_bundle_repository:
                "quay.io/redhat-user-workloads/ocp-bpfman-tenant/bpfman-operator-bundle-ystream"
                    .to_string(),
            platform: Platform::default(),
            opm_binary: None,
            registry_token: None,
            show_tool_output: false,
            inspect_concurrency: DEFAULT_INSPECT_CONCURRENCY,
            mirrors: vec![MirrorRule {
                source: "registry.redhat.io/openshift4".to_string(),
                mirrors: vec![
                    "registry.stage.redhat.io/openshift4".to_string(),
                    "registry-proxy.engineering.redhat.com/rh-osbs/openshift4".to_string(),
                ],
            }],
        }
    }
}

impl CatalogConfig {
    /// Defaults overlaid with `BPFMAN_CATALOG_*` environment variables
    pub fn from_env() -> Self {
        Self::default().overlay(|key| env::var(key).ok())
    }

    fn overlay<F: Fn(&str) -> Option<String>>(mut self, lookup: F) -> Self {
        let get = |name: &str| lookup(&format!("BPFMAN_CATALOG_{}", name)).filter(|v| !v.is_empty());

        if let Some(v) = get("PACKAGE") {
            self.package_name = v;
        }
        if let Some(v) = get("CHANNEL") {
            self.default_channel = v;
        }
        if let Some(v) = get("NAMESPACE") {
            self.namespace = v;
        }
        if let Some(mode) = get("NAMESPACE_MODE").and_then(|v| v.parse().ok()) {
            self.namespace_mode = mode;
        }
        if let Some(v) = get("RESOURCE_PREFIX") {
            self.resource_prefix = v;
        }
        if let Some(v) = get("TENANT_REGISTRY") {
            self.tenant.registry = v;
        }
        if let Some(v) = get("TENANT_NAMESPACE") {
            self.tenant.namespace = v;
        }
        if let Some(v) = get("BUNDLE_REPOSITORY") {
            self.default_bundle_repository = v;
        }
        if let Some(v) = get("OPM_BIN") {
            self.opm_binary = Some(PathBuf::from(v));
        }
        if let Some(v) = get("REGISTRY_TOKEN") {
            self.registry_token = Some(v);
        }
        if let Some(v) = get("SHOW_TOOL_OUTPUT") {
            self.show_tool_output = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Some(n) = get("INSPECT_CONCURRENCY").and_then(|v| v.parse::<usize>().ok()) {
            self.inspect_concurrency = n.max(1);
        }
        self
    }

    /// Base name of a namespaced or cluster-scoped resource, e.g. `bpfman-catalogsource`
    pub fn resource_base(&self, kind: &str) -> String {
        format!("{}-{}", self.resource_prefix, kind)
    }
}
