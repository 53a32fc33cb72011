//! Container image references: parsing, formatting and digest helpers.

use crate::config::TenantWorkspace;
use crate::constants::DEFAULT_REGISTRY;
use crate::error::{CatalogError, Result, ResultExt};
use crate::oci::RegistryInspect;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A parsed image reference such as `quay.io/ns/repo:tag@sha256:...`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    pub registry: String,
    /// May span several path segments, e.g. `redhat-user-workloads/ocp-bpfman-tenant`
    pub namespace: String,
    pub repository: String,
    pub tag: Option<String>,
    /// `algorithm:hex`
    pub digest: Option<String>,
}

fn is_registry_host(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}

fn validate_digest(reference: &str, digest: &str) -> Result<()> {
    let (algorithm, hex) = digest
        .split_once(':')
        .ok_or_else(|| CatalogError::parse(reference, "digest must be algorithm:hex"))?;
    if algorithm.is_empty()
        || hex.is_empty()
        || !hex.chars().all(|c| c.is_ascii_hexdigit())
    {
        return Err(CatalogError::parse(reference, format!("malformed digest {}", digest)));
    }
    Ok(())
}

impl ImageReference {
    /// Parse a reference. A leading `docker://` transport prefix is ignored.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let reference = trimmed.strip_prefix("docker://").unwrap_or(trimmed);
        if reference.is_empty() {
            return Err(CatalogError::parse(input, "empty reference"));
        }

        let (base, digest) = match reference.split_once('@') {
            Some((base, digest)) => {
                validate_digest(input, digest)?;
                (base, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // a colon after the last slash separates the tag; one before it is a registry port
        let (path, tag) = match base.rfind(':') {
            Some(idx) if !base[idx + 1..].contains('/') => {
                let tag = &base[idx + 1..];
                if tag.is_empty() {
                    return Err(CatalogError::parse(input, "empty tag"));
                }
                (&base[..idx], Some(tag.to_string()))
            }
            _ => (base, None),
        };

        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() < 2 {
            return Err(CatalogError::parse(
                input,
                "expected at least namespace/repository",
            ));
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(CatalogError::parse(input, "empty path segment"));
        }

        let (registry, rest) = if is_registry_host(segments[0]) {
            (segments[0].to_string(), &segments[1..])
        } else {
            (DEFAULT_REGISTRY.to_string(), &segments[..])
        };

        let (repository, namespace) = match rest.split_last() {
            Some((repo, ns)) => (repo.to_string(), ns.join("/")),
            None => return Err(CatalogError::parse(input, "missing repository")),
        };

        Ok(Self {
            registry,
            namespace,
            repository,
            tag,
            digest,
        })
    }

    /// `namespace/repository`, the path used against the registry API
    pub fn repository_path(&self) -> String {
        if self.namespace.is_empty() {
            self.repository.clone()
        } else {
            format!("{}/{}", self.namespace, self.repository)
        }
    }

    /// `registry/namespace/repository` without tag or digest
    pub fn name(&self) -> String {
        format!("{}/{}", self.registry, self.repository_path())
    }

    /// Tag or digest to ask the registry for; digest wins
    pub fn manifest_reference(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or("latest")
    }

    /// Digest-pinned form when a digest is known, else the tagged form
    pub fn digest_ref(&self) -> String {
        match &self.digest {
            Some(digest) => format!("{}@{}", self.name(), digest),
            None => self.to_string(),
        }
    }

    pub fn short_digest(&self) -> String {
        self.digest.as_deref().map(short_digest).unwrap_or_default()
    }

    pub fn with_digest(&self, digest: impl Into<String>) -> Self {
        Self {
            digest: Some(digest.into()),
            ..self.clone()
        }
    }

    pub fn is_in_tenant_workspace(&self, tenant: &TenantWorkspace) -> bool {
        self.registry == tenant.registry && self.namespace == tenant.namespace
    }

    /// Deterministic mapping onto the tenant workspace: registry and namespace are replaced,
    /// the repository gets the configured prefix with configured substrings removed.
    /// Tag and digest are kept.
    pub fn to_tenant_workspace(&self, tenant: &TenantWorkspace) -> Result<Self> {
        if self.is_in_tenant_workspace(tenant) {
            return Err(CatalogError::parse(
                self.to_string(),
                "reference is already in the tenant workspace",
            ));
        }

        let mut repository = self.repository.clone();
        for fragment in &tenant.strip_from_repository {
            repository = repository.replace(fragment.as_str(), "");
        }
        if !repository.starts_with(&tenant.repository_prefix) {
            repository = format!("{}{}", tenant.repository_prefix, repository);
        }

        Ok(Self {
            registry: tenant.registry.clone(),
            namespace: tenant.namespace.clone(),
            repository,
            tag: self.tag.clone(),
            digest: self.digest.clone(),
        })
    }
}

/// First 8 hex characters of a full `sha256:` digest, or an empty string.
/// An empty result means "omit any digest suffix"; it is never padded or truncated.
pub fn short_digest(digest: &str) -> String {
    match digest.strip_prefix("sha256:") {
        Some(hex) if hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()) => {
            hex[..8].to_ascii_lowercase()
        }
        _ => String::new(),
    }
}

/// First 8 characters of the digest embedded in a reference string, if any
pub fn digest_suffix(reference: &str) -> String {
    reference
        .split_once('@')
        .map(|(_, digest)| short_digest(digest))
        .unwrap_or_default()
}

/// Fill in a missing digest by asking the registry. A reference that already carries a
/// digest is returned untouched.
pub async fn resolve_digest(
    reference: ImageReference,
    inspect: &dyn RegistryInspect,
) -> Result<ImageReference> {
    if reference.digest.is_some() {
        return Ok(reference);
    }
    let inspection = inspect
        .inspect(&reference)
        .await
        .with_context(|| format!("resolving digest of {}", reference))?;
    tracing::debug!(image = %reference, digest = %inspection.digest, "Resolved digest");
    Ok(reference.with_digest(inspection.digest))
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

impl FromStr for ImageReference {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ImageReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ImageReference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "sha256:abc12345def67890abc12345def67890abc12345def67890abc12345def67890";

    #[test]
    fn test_parse_tagged() {
        let r = ImageReference::parse(
            "quay.io/redhat-user-workloads/ocp-bpfman-tenant/catalog-ystream:latest",
        )
        .unwrap();
        assert_eq!(r.registry, "quay.io");
        assert_eq!(r.namespace, "redhat-user-workloads/ocp-bpfman-tenant");
        assert_eq!(r.repository, "catalog-ystream");
        assert_eq!(r.tag.as_deref(), Some("latest"));
        assert_eq!(r.digest, None);
    }

    #[test]
    fn test_parse_digest_and_port() {
        let r = ImageReference::parse(&format!("localhost:5000/ns/repo@{}", DIGEST)).unwrap();
        assert_eq!(r.registry, "localhost:5000");
        assert_eq!(r.namespace, "ns");
        assert_eq!(r.tag, None);
        assert_eq!(r.short_digest(), "abc12345");
    }

    #[test]
    fn test_parse_tag_and_digest() {
        let r = ImageReference::parse(&format!("quay.io/ns/repo:v1@{}", DIGEST)).unwrap();
        assert_eq!(r.tag.as_deref(), Some("v1"));
        assert_eq!(r.digest.as_deref(), Some(DIGEST));
        assert_eq!(r.digest_ref(), format!("quay.io/ns/repo@{}", DIGEST));
    }

    #[test]
    fn test_default_registry_folds_first_segment() {
        let r = ImageReference::parse("library/nginx:1.25").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.namespace, "library");
        assert_eq!(r.repository, "nginx");
    }

    #[test]
    fn test_docker_transport_prefix() {
        let r = ImageReference::parse("docker://quay.io/ns/repo:tag").unwrap();
        assert_eq!(r.to_string(), "quay.io/ns/repo:tag");
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", "nginx", "nginx:latest", "quay.io/ns/repo@nodigest", "quay.io//repo:x", "quay.io/ns/repo:"] {
            let err = ImageReference::parse(bad).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::Parse, "{}", bad);
        }
    }

    #[test]
    fn test_tagged_round_trip() {
        for input in [
            "quay.io/ns/repo:v1.2.3",
            "registry.redhat.io/bpfman/bpfman-operator-bundle:latest",
            "localhost:5000/a/b/c:dev",
            "docker.io/library/nginx:1",
        ] {
            let parsed = ImageReference::parse(input).unwrap();
            assert_eq!(parsed.to_string(), input);
            assert_eq!(ImageReference::parse(&parsed.to_string()).unwrap(), parsed);
        }
    }

    #[test]
    fn test_short_digest() {
        assert_eq!(short_digest(DIGEST), "abc12345");
        assert_eq!(short_digest(&DIGEST.to_uppercase().replace("SHA256", "sha256")), "abc12345");
        assert_eq!(short_digest("sha256:abc"), "");
        assert_eq!(short_digest("sha512:abc12345"), "");
        assert_eq!(short_digest(""), "");
        assert_eq!(short_digest(&format!("{}zz", &DIGEST[..DIGEST.len() - 2])), "");
    }

    #[test]
    fn test_digest_suffix() {
        assert_eq!(digest_suffix(&format!("quay.io/a/b@{}", DIGEST)), "abc12345");
        assert_eq!(digest_suffix("quay.io/a/b:latest"), "");
    }

    #[test]
    fn test_tenant_workspace_conversion() {
        let tenant = TenantWorkspace::default();
        let r = ImageReference::parse("registry.redhat.io/bpfman/bpfman-rhel9-operator:v0.5").unwrap();
        let t = r.to_tenant_workspace(&tenant).unwrap();
        assert_eq!(
            t.to_string(),
            "quay.io/redhat-user-workloads/ocp-bpfman-tenant/ocp-bpfman-operator:v0.5"
        );
        assert!(t.to_tenant_workspace(&tenant).is_err());

        let agent = ImageReference::parse(&format!("registry.redhat.io/bpfman/bpfman-agent@{}", DIGEST)).unwrap();
        assert_eq!(
            agent.to_tenant_workspace(&tenant).unwrap().name(),
            "quay.io/redhat-user-workloads/ocp-bpfman-tenant/ocp-bpfman-agent"
        );
    }

    #[test]
    fn test_serde_as_string() {
        let r = ImageReference::parse("quay.io/ns/repo:tag").unwrap();
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, "\"quay.io/ns/repo:tag\"");
        let back: ImageReference = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
