use crate::bundle::fbc::FbcTemplate;
use crate::constants::{SCHEMA_CHANNEL, SCHEMA_PACKAGE};
use crate::declcfg::{Channel, DeclarativeConfig, Package};
use crate::error::{CatalogError, Result, ResultExt};
use crate::render::{ImageRenderer, OpmRenderer, RefKind, RenderedCatalog};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Expands a basic template into a rendered catalog. Backends are interchangeable:
/// for the same template and registry state they yield the same inventory.
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    async fn render_template(&self, template: &FbcTemplate) -> Result<RenderedCatalog>;

    /// Short backend name for logs
    fn backend(&self) -> &'static str;
}

/// In-process backend: package and channel pass through, every bundle entry is
/// replaced by the bundle rendered from its image.
pub struct LibraryTemplateRenderer {
    images: Arc<dyn ImageRenderer>,
}

impl LibraryTemplateRenderer {
    pub fn new(images: Arc<dyn ImageRenderer>) -> Self {
        Self { images }
    }
}

#[async_trait]
impl TemplateRenderer for LibraryTemplateRenderer {
    async fn render_template(&self, template: &FbcTemplate) -> Result<RenderedCatalog> {
        template.validate()?;
        let (Some(package), Some(channel)) = (template.package(), template.channel()) else {
            return Err(CatalogError::validation("template is missing its package or channel"));
        };

        let mut cfg = DeclarativeConfig {
            packages: vec![Package {
                schema: SCHEMA_PACKAGE.to_string(),
                name: package.name.clone(),
                default_channel: package.default_channel.clone(),
                description: None,
                icon: None,
                properties: Vec::new(),
            }],
            channels: vec![Channel {
                schema: SCHEMA_CHANNEL.to_string(),
                package: channel.package.clone(),
                name: channel.name.clone(),
                entries: channel.entries.clone(),
                properties: Vec::new(),
            }],
            ..Default::default()
        };

        for image in template.bundle_images() {
            let rendered = self
                .images
                .render(std::slice::from_ref(&image), RefKind::BundleOnly)
                .await
                .with_context(|| format!("rendering bundle {}", image))?;
            cfg.bundles.extend(rendered.bundles);
        }

        RenderedCatalog::new(cfg.to_yaml()?)
    }

    fn backend(&self) -> &'static str {
        "library"
    }
}

/// External `opm` when a binary is configured, the in-process backend otherwise
pub fn template_renderer(
    opm_binary: Option<PathBuf>,
    show_tool_output: bool,
    images: Arc<dyn ImageRenderer>,
    cancel: CancellationToken,
) -> Arc<dyn TemplateRenderer> {
    match opm_binary {
        Some(binary) => Arc::new(OpmRenderer::new(binary, show_tool_output, cancel)),
        None => Arc::new(LibraryTemplateRenderer::new(images)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::BundleInfo;
    use crate::render::registry::tests::{fake_renderer, BUNDLE_REF};

    #[tokio::test]
    async fn test_library_backend_renders_bundles() {
        let renderer = LibraryTemplateRenderer::new(Arc::new(fake_renderer()));
        let info = BundleInfo {
            name: "demo-operator.v1.1.0".to_string(),
            package: "demo-operator".to_string(),
        };
        let template = FbcTemplate::single(BUNDLE_REF, &info, "preview").unwrap();

        let rendered = renderer.render_template(&template).await.unwrap();
        let cfg = rendered.parse().unwrap();
        assert_eq!(cfg.default_channel(Some("demo-operator")), Some("preview"));
        assert_eq!(cfg.bundles.len(), 1);
        assert_eq!(cfg.bundles[0].image, BUNDLE_REF);
        assert_eq!(cfg.channels[0].entries[0].name, "demo-operator.v1.1.0");
    }

    #[tokio::test]
    async fn test_library_backend_surfaces_bundle_failure() {
        let renderer = LibraryTemplateRenderer::new(Arc::new(fake_renderer()));
        let info = BundleInfo {
            name: "demo.v1".to_string(),
            package: "demo".to_string(),
        };
        let template = FbcTemplate::single("quay.io/demo/absent:v1", &info, "preview").unwrap();
        let err = renderer.render_template(&template).await.unwrap_err();
        assert!(err.to_string().contains("rendering bundle quay.io/demo/absent:v1"));
    }

    #[test]
    fn test_factory_selects_backend() {
        let images: Arc<dyn ImageRenderer> = Arc::new(fake_renderer());
        let token = CancellationToken::new();
        assert_eq!(template_renderer(None, false, images.clone(), token.clone()).backend(), "library");
        assert_eq!(
            template_renderer(Some(PathBuf::from("/usr/bin/opm")), false, images, token).backend(),
            "opm"
        );
    }
}
