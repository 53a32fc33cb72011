use crate::bundle::fbc::FbcTemplate;
use crate::bundle::renderer::TemplateRenderer;
use crate::bundle::scaffold::Scaffold;
use crate::bundle::{metadata, BundleMetadata};
use crate::declcfg::DeclarativeConfig;
use crate::error::{CatalogError, Result, ResultExt};
use crate::render::ImageRenderer;
use std::sync::Arc;

/// Everything needed to build a catalog image, held in memory until written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artefacts {
    pub fbc_template: Option<String>,
    /// Absent when rendering failed; see `render_error`
    pub catalog_yaml: Option<String>,
    pub render_error: Option<String>,
    pub dockerfile: String,
    pub makefile: String,
    pub workflow: String,
}

impl Artefacts {
    pub fn catalog_rendered(&self) -> bool {
        self.catalog_yaml.is_some()
    }

    /// (file name, contents) pairs in the order they are written
    pub fn files(&self) -> Vec<(&'static str, &str)> {
        let mut files = Vec::new();
        if let Some(template) = &self.fbc_template {
            files.push(("fbc-template.yaml", template.as_str()));
        }
        if let Some(catalog) = &self.catalog_yaml {
            files.push(("catalog.yaml", catalog.as_str()));
        }
        files.push(("Dockerfile", self.dockerfile.as_str()));
        files.push(("Makefile", self.makefile.as_str()));
        files.push(("WORKFLOW.txt", self.workflow.as_str()));
        files
    }
}

pub struct ArtefactGenerator {
    images: Arc<dyn ImageRenderer>,
    templates: Arc<dyn TemplateRenderer>,
    channel: String,
    resource_prefix: String,
    scaffold: Option<Scaffold>,
}

impl ArtefactGenerator {
    pub fn new(
        images: Arc<dyn ImageRenderer>,
        templates: Arc<dyn TemplateRenderer>,
        channel: impl Into<String>,
        resource_prefix: impl Into<String>,
    ) -> Self {
        Self {
            images,
            templates,
            channel: channel.into(),
            resource_prefix: resource_prefix.into(),
            scaffold: None,
        }
    }

    /// Use fixed ttl.sh identifiers instead of random ones
    pub fn with_scaffold(mut self, scaffold: Scaffold) -> Self {
        self.scaffold = Some(scaffold);
        self
    }

    fn scaffold(&self) -> Scaffold {
        self.scaffold
            .clone()
            .unwrap_or_else(|| Scaffold::new(&self.resource_prefix))
    }

    /// Template, scaffold and (best effort) rendered catalog for a single bundle
    pub async fn from_bundle(&self, bundle_image: &str, output_dir: &str) -> Result<Artefacts> {
        let info = metadata::extract(bundle_image, self.images.as_ref())
            .await
            .context("extracting bundle info")?;
        let template = FbcTemplate::single(bundle_image, &info, &self.channel)?;
        self.finish(template, bundle_image, 1, output_dir).await
    }

    /// Chain template over several bundles; all must belong to the same package
    pub async fn from_bundles(&self, bundles: &[BundleMetadata], output_dir: &str) -> Result<Artefacts> {
        let Some(first) = bundles.first() else {
            return Err(CatalogError::validation("no bundles provided"));
        };

        let mut package: Option<String> = None;
        for bundle in bundles {
            let image = bundle.pinned_image();
            let info = metadata::extract(&image, self.images.as_ref())
                .await
                .with_context(|| format!("extracting bundle info for {}", image))?;
            match &package {
                Some(p) if *p != info.package => {
                    return Err(CatalogError::validation(format!(
                        "bundle {} belongs to package {}, expected {}",
                        image, info.package, p
                    )))
                }
                Some(_) => {}
                None => package = Some(info.package),
            }
        }
        let package = package.unwrap_or_default();

        let template = FbcTemplate::chain(&package, bundles, &self.channel)?;
        self.finish(template, &first.pinned_image(), bundles.len(), output_dir)
            .await
    }

    /// Scaffold around an existing rendered catalog
    pub fn from_catalog_yaml(&self, catalog_yaml: &str, output_dir: &str) -> Result<Artefacts> {
        let cfg = DeclarativeConfig::parse(catalog_yaml).context("parsing catalog.yaml")?;
        if cfg.packages.is_empty() {
            return Err(CatalogError::validation("catalog.yaml declares no olm.package"));
        }

        let scaffold = self.scaffold();
        Ok(Artefacts {
            fbc_template: None,
            catalog_yaml: Some(catalog_yaml.to_string()),
            render_error: None,
            dockerfile: scaffold.dockerfile(),
            makefile: scaffold.makefile("from-yaml"),
            workflow: scaffold.workflow(0, true, output_dir),
        })
    }

    async fn finish(
        &self,
        template: FbcTemplate,
        source: &str,
        bundle_count: usize,
        output_dir: &str,
    ) -> Result<Artefacts> {
        let fbc_template = template.to_yaml()?;

        // the template and scaffold stay useful when rendering fails
        let (catalog_yaml, render_error) = match self.templates.render_template(&template).await {
            Ok(rendered) => (Some(rendered.into_string()), None),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                tracing::warn!(backend = self.templates.backend(), error = %e, "Catalog rendering failed, emitting template only");
                (None, Some(e.to_string()))
            }
        };
        if catalog_yaml.is_some() {
            tracing::info!(backend = self.templates.backend(), bundles = bundle_count, "Rendered catalog");
        }

        let scaffold = self.scaffold();
        let workflow = scaffold.workflow(bundle_count, catalog_yaml.is_some(), output_dir);
        Ok(Artefacts {
            fbc_template: Some(fbc_template),
            catalog_yaml,
            render_error,
            dockerfile: scaffold.dockerfile(),
            makefile: scaffold.makefile(source),
            workflow,
        })
    }
}
