use crate::constants::{
    ANNOTATIONS_FILE, ANNOTATION_MANIFESTS, ANNOTATION_PACKAGE, DEFAULT_CONFIGS_DIR, LABEL_CONFIGS_DIR,
    PROPERTY_CSV_METADATA, PROPERTY_GVK, PROPERTY_PACKAGE, SCHEMA_BUNDLE,
};
use crate::declcfg::{Bundle, DeclarativeConfig, Property, RelatedImage};
use crate::error::{CatalogError, Result, ResultExt};
use crate::image_ref::ImageReference;
use crate::oci::layer::ImageFiles;
use crate::oci::{ImageSource, PulledImage};
use crate::render::{ImageRenderer, RefKind};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

const PROPERTIES_FILE: &str = "metadata/properties.yaml";
const DEFAULT_MANIFESTS_DIR: &str = "manifests/";

/// CSV spec fields carried into `olm.csv.metadata`, keyed by their name in the property
const CSV_METADATA_FIELDS: &[(&str, &str)] = &[
    ("apiServiceDefinitions", "apiservicedefinitions"),
    ("crdDescriptions", "customresourcedefinitions"),
    ("description", "description"),
    ("displayName", "displayName"),
    ("installModes", "installModes"),
    ("keywords", "keywords"),
    ("links", "links"),
    ("maintainers", "maintainers"),
    ("maturity", "maturity"),
    ("minKubeVersion", "minKubeVersion"),
    ("nativeAPIs", "nativeAPIs"),
    ("provider", "provider"),
];

/// In-process renderer: pulls images and reads their bundle or catalog content directly
pub struct RegistryRenderer {
    source: Arc<dyn ImageSource>,
}

impl RegistryRenderer {
    pub fn new(source: Arc<dyn ImageSource>) -> Self {
        Self { source }
    }

    async fn render_one(&self, reference: &str, mask: RefKind) -> Result<DeclarativeConfig> {
        let image = ImageReference::parse(reference)?;
        let pulled = self.source.pull(&image).await?;
        let reference = reference.to_string();

        tokio::task::spawn_blocking(move || render_pulled(&reference, pulled, mask))
            .await
            .map_err(|e| CatalogError::Other(anyhow::anyhow!("render task failed: {}", e)))?
    }
}

#[async_trait]
impl ImageRenderer for RegistryRenderer {
    async fn render(&self, refs: &[String], mask: RefKind) -> Result<DeclarativeConfig> {
        let mut cfg = DeclarativeConfig::default();
        for reference in refs {
            tracing::debug!(image = %reference, mask = %mask, "Rendering image");
            let rendered = self
                .render_one(reference, mask)
                .await
                .with_context(|| format!("rendering {}", reference))?;
            cfg.merge(rendered);
        }
        Ok(cfg)
    }
}

fn dir_prefix(dir: &str) -> String {
    let dir = dir.trim_start_matches('/');
    if dir.ends_with('/') {
        dir.to_string()
    } else {
        format!("{}/", dir)
    }
}

fn render_pulled(reference: &str, pulled: PulledImage, mask: RefKind) -> Result<DeclarativeConfig> {
    let configs_dir = dir_prefix(
        pulled
            .labels
            .get(LABEL_CONFIGS_DIR)
            .map(String::as_str)
            .unwrap_or(DEFAULT_CONFIGS_DIR),
    );
    let layers = || pulled.layers.iter().map(Vec::as_slice);

    let files = ImageFiles::from_layers(layers(), &["metadata/", configs_dir.as_str()])?;

    if let Some(annotations) = files.get(ANNOTATIONS_FILE) {
        if !mask.allows_bundle() {
            return Err(CatalogError::validation(format!(
                "{} is a bundle image but only {} are allowed",
                reference, mask
            )));
        }
        let annotations = parse_annotations(annotations)?;
        let manifests_dir = dir_prefix(
            annotations
                .get(ANNOTATION_MANIFESTS)
                .map(String::as_str)
                .unwrap_or(DEFAULT_MANIFESTS_DIR),
        );
        let manifests = ImageFiles::from_layers(layers(), &[manifests_dir.as_str()])?;
        let bundle = render_bundle(reference, &annotations, &files, &manifests, &manifests_dir)?;
        return Ok(DeclarativeConfig {
            bundles: vec![bundle],
            ..Default::default()
        });
    }

    if files.under(&configs_dir).next().is_some() {
        if !mask.allows_catalog() {
            return Err(CatalogError::validation(format!(
                "{} is a catalog image but only {} are allowed",
                reference, mask
            )));
        }
        return render_catalog(&files, &configs_dir);
    }

    Err(CatalogError::not_found(
        "bundle annotations or catalog configs",
        format!("{} is neither a bundle nor a catalog image", reference),
    ))
}

fn is_manifest_file(path: &str) -> bool {
    path.ends_with(".yaml") || path.ends_with(".yml") || path.ends_with(".json")
}

fn parse_document(data: &[u8]) -> Result<Value> {
    // YAML is a superset of JSON, one parser covers both
    Ok(serde_yaml_ng::from_slice(data)?)
}

fn parse_annotations(data: &[u8]) -> Result<BTreeMap<String, String>> {
    #[derive(serde::Deserialize)]
    struct AnnotationsFile {
        #[serde(default)]
        annotations: BTreeMap<String, String>,
    }
    let parsed: AnnotationsFile = serde_yaml_ng::from_slice(data)?;
    Ok(parsed.annotations)
}

fn render_catalog(files: &ImageFiles, configs_dir: &str) -> Result<DeclarativeConfig> {
    let mut cfg = DeclarativeConfig::default();
    for (path, data) in files.under(configs_dir).filter(|(p, _)| is_manifest_file(p)) {
        let content = String::from_utf8_lossy(data);
        let parsed = DeclarativeConfig::parse(&content).with_context(|| format!("parsing {}", path))?;
        cfg.merge(parsed);
    }
    Ok(cfg)
}

fn render_bundle(
    reference: &str,
    annotations: &BTreeMap<String, String>,
    metadata: &ImageFiles,
    manifests: &ImageFiles,
    manifests_dir: &str,
) -> Result<Bundle> {
    let package = annotations
        .get(ANNOTATION_PACKAGE)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| CatalogError::not_found("package annotation", format!("{} in {}", ANNOTATION_PACKAGE, reference)))?;

    let mut csv = None;
    for (path, data) in manifests.under(manifests_dir).filter(|(p, _)| is_manifest_file(p)) {
        let doc = parse_document(data).with_context(|| format!("parsing {}", path))?;
        if doc.get("kind").and_then(Value::as_str) == Some("ClusterServiceVersion") {
            csv = Some(doc);
            break;
        }
    }
    let csv = csv.ok_or_else(|| {
        CatalogError::not_found("ClusterServiceVersion", format!("no CSV under {} in {}", manifests_dir, reference))
    })?;

    let name = csv
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .ok_or_else(|| CatalogError::validation(format!("CSV in {} has no metadata.name", reference)))?
        .to_string();
    let version = csv.pointer("/spec/version").and_then(Value::as_str).unwrap_or_default();

    let mut properties = vec![Property {
        kind: PROPERTY_PACKAGE.to_string(),
        value: json!({ "packageName": package, "version": version }),
    }];
    properties.extend(owned_gvks(&csv).into_iter().map(|value| Property {
        kind: PROPERTY_GVK.to_string(),
        value,
    }));
    if let Some(data) = metadata.get(PROPERTIES_FILE) {
        properties.extend(declared_properties(data)?);
    }
    properties.push(Property {
        kind: PROPERTY_CSV_METADATA.to_string(),
        value: csv_metadata(&csv),
    });

    Ok(Bundle {
        schema: SCHEMA_BUNDLE.to_string(),
        name,
        package: package.clone(),
        image: reference.to_string(),
        properties,
        related_images: related_images(reference, &csv),
    })
}

/// `olm.gvk` values for each owned CRD, `<plural>.<group>` split into its group
fn owned_gvks(csv: &Value) -> Vec<Value> {
    let owned = csv
        .pointer("/spec/customresourcedefinitions/owned")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut seen = BTreeSet::new();
    owned
        .iter()
        .filter_map(|crd| {
            let name = crd.get("name")?.as_str()?;
            let group = name.split_once('.').map(|(_, g)| g)?;
            let kind = crd.get("kind")?.as_str()?;
            let version = crd.get("version")?.as_str()?;
            seen.insert((group.to_string(), kind.to_string(), version.to_string()))
                .then(|| json!({ "group": group, "kind": kind, "version": version }))
        })
        .collect()
}

fn declared_properties(data: &[u8]) -> Result<Vec<Property>> {
    #[derive(serde::Deserialize)]
    struct PropertiesFile {
        #[serde(default)]
        properties: Vec<Property>,
    }
    let parsed: PropertiesFile = serde_yaml_ng::from_slice(data)?;
    Ok(parsed.properties)
}

fn csv_metadata(csv: &Value) -> Value {
    let mut out = Map::new();
    if let Some(annotations) = csv.pointer("/metadata/annotations").filter(|v| !v.is_null()) {
        out.insert("annotations".to_string(), annotations.clone());
    }
    if let Some(labels) = csv.pointer("/metadata/labels").filter(|v| !v.is_null()) {
        out.insert("labels".to_string(), labels.clone());
    }
    if let Some(spec) = csv.get("spec") {
        for (key, source) in CSV_METADATA_FIELDS {
            if let Some(value) = spec.get(*source).filter(|v| !v.is_null()) {
                out.insert((*key).to_string(), value.clone());
            }
        }
    }
    Value::Object(out)
}

/// The bundle image itself, declared related images, then deployment container images
fn related_images(reference: &str, csv: &Value) -> Vec<RelatedImage> {
    let mut images = vec![RelatedImage {
        name: String::new(),
        image: reference.to_string(),
    }];

    if let Some(declared) = csv.pointer("/spec/relatedImages").and_then(Value::as_array) {
        images.extend(declared.iter().filter_map(|r| {
            Some(RelatedImage {
                name: r.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                image: r.get("image")?.as_str()?.to_string(),
            })
        }));
    }

    let deployments = csv
        .pointer("/spec/install/spec/deployments")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for deployment in &deployments {
        for list in ["initContainers", "containers"] {
            let pointer = format!("/spec/template/spec/{}", list);
            let Some(containers) = deployment.pointer(&pointer).and_then(Value::as_array) else {
                continue;
            };
            images.extend(containers.iter().filter_map(|c| {
                Some(RelatedImage {
                    name: c.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                    image: c.get("image")?.as_str()?.to_string(),
                })
            }));
        }
    }

    let mut seen = BTreeSet::new();
    images.retain(|r| !r.image.is_empty() && seen.insert(r.image.clone()));
    images
}
