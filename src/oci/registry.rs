use crate::cancel::cancellable;
use crate::config::{CatalogConfig, Platform, TenantWorkspace};
use crate::constants::DOCKER_HUB_API_HOST;
use crate::error::{CatalogError, RegistryTier, Result};
use crate::image_ref::ImageReference;
use crate::oci::manifest::{manifest_accept_header, ManifestKind, OCIConfig, OCIManifest};
use crate::oci::{parse_timestamp, ImageInspection, ImageSource, PulledImage, RegistryInspect, TagLister};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use reqwest::header::{ACCEPT, CONTENT_TYPE, LINK, WWW_AUTHENTICATE};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;

const DIGEST_HEADER: &str = "Docker-Content-Digest";
const TAG_PAGE_SIZE: usize = 1000;

/// Minimal OCI distribution client: anonymous or bearer-token pulls, no pushes.
pub struct RegistryClient {
    client: Client,
    token: Option<String>,
    platform: Platform,
    tenant: TenantWorkspace,
    cancel: CancellationToken,
    /// Bearer tokens obtained from auth challenges, keyed by `registry|scope`
    scoped_tokens: Mutex<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

pub fn sha256_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

fn api_host(registry: &str) -> &str {
    if registry == "docker.io" || registry == "index.docker.io" {
        DOCKER_HUB_API_HOST
    } else {
        registry
    }
}

fn base_url(registry: &str) -> String {
    let host = api_host(registry);
    if host.contains("://") {
        format!("{}/v2", host)
    } else if host.starts_with("localhost") || host.starts_with("127.0.0.1") {
        format!("http://{}/v2", host)
    } else {
        format!("https://{}/v2", host)
    }
}

static CHALLENGE_PARAM: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r#"(\w+)="([^"]*)""#).ok());

/// Parse `Bearer realm="...",service="...",scope="..."`
fn parse_challenge(header: &str) -> Option<HashMap<String, String>> {
    let rest = header.trim().strip_prefix("Bearer ")?;
    let params: HashMap<String, String> = CHALLENGE_PARAM
        .as_ref()?
        .captures_iter(rest)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect();
    params.contains_key("realm").then_some(params)
}

/// Extract the target of `Link: <...>; rel="next"`
fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let part = part.trim();
        if !part.contains("rel=\"next\"") {
            return None;
        }
        let start = part.find('<')?;
        let end = part.find('>')?;
        Some(part[start + 1..end].to_string())
    })
}

/// Absolute URL of the next tag page, or `None` when the registry points back at a
/// page already fetched
fn follow_link(origin: &str, link: &str, seen: &mut HashSet<String>) -> Option<String> {
    let url = if link.starts_with('/') {
        format!("{}{}", origin, link)
    } else {
        link.to_string()
    };
    seen.insert(url.clone()).then_some(url)
}

impl RegistryClient {
    pub fn new(config: &CatalogConfig, cancel: CancellationToken) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("bpfman-catalog/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CatalogError::Other(e.into()))?;

        Ok(Self {
            client,
            token: config.registry_token.clone(),
            platform: config.platform.clone(),
            tenant: config.tenant.clone(),
            cancel,
            scoped_tokens: Mutex::new(HashMap::new()),
        })
    }

    fn tier(&self, image: &ImageReference) -> RegistryTier {
        if image.is_in_tenant_workspace(&self.tenant) {
            RegistryTier::TenantWorkspace
        } else {
            RegistryTier::Primary
        }
    }

    fn access_error(&self, image: &ImageReference, reason: impl Into<String>) -> CatalogError {
        CatalogError::access(image.to_string(), self.tier(image), reason)
    }

    fn status_error(&self, image: &ImageReference, what: &str, status: StatusCode) -> CatalogError {
        let reason = match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => format!("{}: unauthorized ({})", what, status),
            StatusCode::NOT_FOUND => format!("{}: not found", what),
            other => format!("{}: unexpected status {}", what, other),
        };
        self.access_error(image, reason)
    }

    async fn fetch_token(&self, image: &ImageReference, challenge: &HashMap<String, String>) -> Result<String> {
        let realm = &challenge["realm"];
        let scope = challenge
            .get("scope")
            .cloned()
            .unwrap_or_else(|| format!("repository:{}:pull", image.repository_path()));

        let mut query = vec![("scope", scope)];
        if let Some(service) = challenge.get("service") {
            query.push(("service", service.clone()));
        }

        let resp = self
            .client
            .get(realm)
            .query(&query)
            .send()
            .await
            .map_err(|e| self.access_error(image, format!("token request failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(self.status_error(image, "token request", resp.status()));
        }
        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| self.access_error(image, format!("invalid token response: {}", e)))?;
        body.token
            .or(body.access_token)
            .ok_or_else(|| self.access_error(image, "token response carried no token"))
    }

    /// GET with one retry after answering a bearer challenge
    async fn get(&self, image: &ImageReference, url: &str, accept: Option<&str>) -> Result<Response> {
        let cache_key = format!("{}|{}", image.registry, image.repository_path());
        let mut attempted_challenge = false;

        loop {
            let mut rb = self.client.get(url);
            if let Some(accept) = accept {
                rb = rb.header(ACCEPT, accept);
            }
            let cached = self.scoped_tokens.lock().get(&cache_key).cloned();
            if let Some(t) = cached.as_ref().or(self.token.as_ref()) {
                rb = rb.bearer_auth(t);
            }

            let resp = rb
                .send()
                .await
                .map_err(|e| self.access_error(image, format!("request failed: {}", e)))?;

            if resp.status() != StatusCode::UNAUTHORIZED || attempted_challenge {
                return Ok(resp);
            }

            let challenge = resp
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_challenge);
            let Some(challenge) = challenge else {
                return Ok(resp);
            };

            let token = self.fetch_token(image, &challenge).await?;
            self.scoped_tokens.lock().insert(cache_key.clone(), token);
            attempted_challenge = true;
        }
    }

    /// Returns the manifest body, its content type and the registry-reported digest
    async fn fetch_manifest(
        &self,
        image: &ImageReference,
        reference: &str,
    ) -> Result<(Vec<u8>, Option<String>, String)> {
        let url = format!(
            "{}/{}/manifests/{}",
            base_url(&image.registry),
            image.repository_path(),
            reference
        );
        let accept = manifest_accept_header();
        let resp = self.get(image, &url, Some(&accept)).await?;
        if !resp.status().is_success() {
            return Err(self.status_error(image, "fetching manifest", resp.status()));
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let header_digest = resp
            .headers()
            .get(DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp
            .bytes()
            .await
            .map_err(|e| self.access_error(image, format!("reading manifest: {}", e)))?
            .to_vec();

        let digest = header_digest.unwrap_or_else(|| sha256_digest(&body));
        Ok((body, content_type, digest))
    }

    /// Top-level digest plus the single-platform manifest for the configured platform
    async fn resolve_manifest(&self, image: &ImageReference) -> Result<(String, OCIManifest)> {
        let (body, content_type, digest) = self.fetch_manifest(image, image.manifest_reference()).await?;
        let parsed = ManifestKind::parse(content_type.as_deref(), &body)
            .map_err(|e| self.access_error(image, format!("invalid manifest: {}", e)))?;

        match parsed {
            ManifestKind::Image(manifest) => Ok((digest, manifest)),
            ManifestKind::Index(index) => {
                let chosen = index
                    .manifests
                    .iter()
                    .find(|m| {
                        m.platform.as_ref().is_some_and(|p| {
                            p.os == self.platform.os && p.architecture == self.platform.architecture
                        })
                    })
                    .ok_or_else(|| {
                        self.access_error(
                            image,
                            format!(
                                "no manifest for platform {}/{}",
                                self.platform.os, self.platform.architecture
                            ),
                        )
                    })?;

                tracing::debug!(image = %image, platform_digest = %chosen.digest, "Resolved manifest list entry");
                let (body, content_type, _) = self.fetch_manifest(image, &chosen.digest).await?;
                match ManifestKind::parse(content_type.as_deref(), &body) {
                    Ok(ManifestKind::Image(manifest)) => Ok((digest, manifest)),
                    Ok(ManifestKind::Index(_)) => Err(self.access_error(image, "nested manifest list")),
                    Err(e) => Err(self.access_error(image, format!("invalid manifest: {}", e))),
                }
            }
        }
    }

    async fn fetch_blob(&self, image: &ImageReference, digest: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/{}/blobs/{}",
            base_url(&image.registry),
            image.repository_path(),
            digest
        );
        let resp = self.get(image, &url, None).await?;
        if !resp.status().is_success() {
            return Err(self.status_error(image, &format!("fetching blob {}", digest), resp.status()));
        }
        let data = resp
            .bytes()
            .await
            .map_err(|e| self.access_error(image, format!("reading blob {}: {}", digest, e)))?
            .to_vec();

        if digest.starts_with("sha256:") {
            let actual = sha256_digest(&data);
            if actual != digest {
                return Err(CatalogError::Other(anyhow::anyhow!(
                    "blob integrity failure: expected {}, got {} ({} bytes)",
                    digest,
                    actual,
                    data.len()
                )));
            }
        }
        Ok(data)
    }

    async fn fetch_config(&self, image: &ImageReference, manifest: &OCIManifest) -> Result<OCIConfig> {
        let blob = self.fetch_blob(image, &manifest.config.digest).await?;
        serde_json::from_slice(&blob)
            .map_err(|e| self.access_error(image, format!("invalid image config: {}", e)))
    }
}

#[async_trait]
impl RegistryInspect for RegistryClient {
    async fn inspect(&self, image: &ImageReference) -> Result<ImageInspection> {
        cancellable(&self.cancel, async {
            tracing::debug!(image = %image, "Inspecting image");
            let (digest, manifest) = self.resolve_manifest(image).await?;
            let config = self.fetch_config(image, &manifest).await?;
            Ok(ImageInspection {
                digest,
                created: config.created.as_deref().and_then(parse_timestamp),
                labels: config.labels(),
            })
        })
        .await
    }
}

#[async_trait]
impl ImageSource for RegistryClient {
    async fn pull(&self, image: &ImageReference) -> Result<PulledImage> {
        cancellable(&self.cancel, async {
            tracing::debug!(image = %image, "Pulling image");
            let (digest, manifest) = self.resolve_manifest(image).await?;
            let config = self.fetch_config(image, &manifest).await?;

            let mut layers = Vec::with_capacity(manifest.layers.len());
            for layer in &manifest.layers {
                layers.push(self.fetch_blob(image, &layer.digest).await?);
            }
            tracing::debug!(image = %image, layers = layers.len(), "Pulled image");

            Ok(PulledImage {
                digest,
                labels: config.labels(),
                layers,
            })
        })
        .await
    }
}

#[async_trait]
impl TagLister for RegistryClient {
    async fn list_tags(&self, repository: &ImageReference) -> Result<Vec<String>> {
        cancellable(&self.cancel, async {
            let base = base_url(&repository.registry);
            let origin = base.trim_end_matches("/v2").to_string();
            let mut url = format!(
                "{}/{}/tags/list?n={}",
                base,
                repository.repository_path(),
                TAG_PAGE_SIZE
            );
            let mut tags = Vec::new();
            let mut seen = HashSet::from([url.clone()]);

            loop {
                let resp = self.get(repository, &url, None).await?;
                if !resp.status().is_success() {
                    return Err(self.status_error(repository, "listing tags", resp.status()));
                }
                let next = resp
                    .headers()
                    .get(LINK)
                    .and_then(|v| v.to_str().ok())
                    .and_then(next_link);
                let page: TagList = resp
                    .json()
                    .await
                    .map_err(|e| self.access_error(repository, format!("invalid tag list: {}", e)))?;
                tags.extend(page.tags.unwrap_or_default());

                let Some(link) = next else { break };
                url = follow_link(&origin, &link, &mut seen).ok_or_else(|| {
                    self.access_error(repository, format!("tag listing loops back to {}", link))
                })?;
            }

            tracing::debug!(repository = %repository.name(), count = tags.len(), "Listed tags");
            Ok(tags)
        })
        .await
    }
}
