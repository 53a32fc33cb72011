use crate::analysis::extractor::extract_image_references;
use crate::analysis::inspector::{ImageInspector, Probe};
use crate::analysis::{calculate_summary, BundleAnalysis, ImageInfo};
use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result, ResultExt};
use crate::image_ref::ImageReference;
use crate::oci::RegistryInspect;
use crate::render::ImageRenderer;
use std::sync::Arc;

pub struct BundleAnalyzer {
    inspector: ImageInspector,
    renderer: Arc<dyn ImageRenderer>,
}

impl BundleAnalyzer {
    pub fn new(inspect: Arc<dyn RegistryInspect>, renderer: Arc<dyn ImageRenderer>, config: &CatalogConfig) -> Self {
        Self {
            inspector: ImageInspector::new(inspect, config.tenant.clone(), config.inspect_concurrency),
            renderer,
        }
    }

    /// Locate the bundle, walk its image graph and classify every image.
    /// With `show_all` unset only accessible images are kept.
    pub async fn analyze(&self, bundle_ref: &str, show_all: bool) -> Result<BundleAnalysis> {
        let parsed = ImageReference::parse(bundle_ref).context("invalid bundle reference")?;

        let (bundle_registry, resolved, inspection) = match self.inspector.probe(&parsed).await? {
            Probe::Found {
                registry,
                reference,
                inspection,
            } => (registry, reference, inspection),
            Probe::Missing { attempts, reason } => {
                return Err(CatalogError::Unreachable {
                    subject: format!("bundle {}", bundle_ref),
                    attempts,
                    reason,
                })
            }
        };
        let resolved_bundle_ref = resolved.to_string();
        tracing::info!(bundle = %resolved_bundle_ref, registry = %bundle_registry, "Bundle located");

        let references = extract_image_references(&resolved_bundle_ref, self.renderer.as_ref())
            .await
            .context("extracting image references")?;
        let images = self.inspector.inspect_images(&references).await?;

        let analysis = BundleAnalysis {
            bundle_ref: bundle_ref.to_string(),
            resolved_bundle_ref,
            bundle_registry,
            bundle_info: ImageInfo::from(&inspection),
            summary: calculate_summary(&images),
            images,
        };
        tracing::info!(
            total = analysis.summary.total_images,
            accessible = analysis.summary.accessible_images,
            "Bundle analysis complete"
        );

        Ok(if show_all { analysis } else { analysis.accessible_only() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::inspector::tests::KnownImages;
    use crate::analysis::RegistryClass;
    use crate::declcfg::DeclarativeConfig;
    use crate::error::ErrorKind;
    use crate::render::RefKind;
    use async_trait::async_trait;

    const BUNDLE: &str = "registry.redhat.io/bpfman/bpfman-operator-bundle:v0.5.6";
    const TENANT_BUNDLE: &str = "quay.io/redhat-user-workloads/ocp-bpfman-tenant/ocp-bpfman-operator-bundle:v0.5.6";
    const AGENT: &str = "registry.redhat.io/bpfman/bpfman-agent-rhel9:v0.5.6";
    const TENANT_AGENT: &str = "quay.io/redhat-user-workloads/ocp-bpfman-tenant/ocp-bpfman-agent:v0.5.6";
    const OPERATOR: &str = "registry.redhat.io/bpfman/bpfman-rhel9-operator:v0.5.6";

    /// Renders any reference as a bundle relating the given images
    struct RelatedImages(Vec<&'static str>);

    #[async_trait]
    impl ImageRenderer for RelatedImages {
        async fn render(&self, refs: &[String], mask: RefKind) -> Result<DeclarativeConfig> {
            assert_eq!(mask, RefKind::BundleOnly);
            let mut yaml = format!(
                "schema: olm.bundle\nname: bpfman-operator.v0.5.6\npackage: bpfman-operator\nimage: {}\nrelatedImages:\n  - image: {}\n",
                refs[0], refs[0]
            );
            for image in &self.0 {
                yaml.push_str(&format!("  - image: {}\n", image));
            }
            DeclarativeConfig::parse(&yaml)
        }
    }

    fn analyzer(known: KnownImages, related: Vec<&'static str>) -> BundleAnalyzer {
        BundleAnalyzer::new(Arc::new(known), Arc::new(RelatedImages(related)), &CatalogConfig::default())
    }

    #[tokio::test]
    async fn test_related_image_in_tenant_workspace() {
        let known = KnownImages::new(&[BUNDLE, TENANT_AGENT]);
        let analysis = analyzer(known, vec![AGENT]).analyze(BUNDLE, true).await.unwrap();

        assert_eq!(analysis.bundle_registry, RegistryClass::Primary);
        assert_eq!(analysis.images.len(), 2);
        assert_eq!(analysis.images[0].reference, BUNDLE);
        let agent = &analysis.images[1];
        assert_eq!(agent.registry, RegistryClass::TenantWorkspace);
        assert!(agent.accessible);
        assert_eq!(analysis.summary.total_images, 2);
        assert_eq!(analysis.summary.tenant_images, 1);
        assert_eq!(analysis.summary.primary_images, 1);
    }

    #[tokio::test]
    async fn test_bundle_from_tenant_workspace() {
        let known = KnownImages::new(&[TENANT_BUNDLE]);
        let analysis = analyzer(known, vec![]).analyze(BUNDLE, true).await.unwrap();
        assert_eq!(analysis.bundle_registry, RegistryClass::TenantWorkspace);
        assert_eq!(analysis.resolved_bundle_ref, TENANT_BUNDLE);
        assert_eq!(analysis.images[0].reference, TENANT_BUNDLE);
    }

    #[tokio::test]
    async fn test_bundle_unreachable_lists_both_attempts() {
        let err = analyzer(KnownImages::new(&[]), vec![]).analyze(BUNDLE, true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Access);
        let message = err.to_string();
        assert!(message.contains(BUNDLE));
        assert!(message.contains(TENANT_BUNDLE));
    }

    #[tokio::test]
    async fn test_show_all_filters_and_recounts() {
        let known = KnownImages::new(&[BUNDLE, AGENT]);
        let analyzer = analyzer(known, vec![AGENT, OPERATOR]);

        let all = analyzer.analyze(BUNDLE, true).await.unwrap();
        assert_eq!(all.summary.total_images, 3);
        assert_eq!(all.summary.inaccessible_images, 1);

        let filtered = analyzer.analyze(BUNDLE, false).await.unwrap();
        assert_eq!(filtered.images.len(), 2);
        assert_eq!(filtered.summary.total_images, 2);
        assert_eq!(filtered.summary.inaccessible_images, 0);
        assert!(filtered.images.iter().all(|i| i.accessible));
    }

    #[tokio::test]
    async fn test_invalid_bundle_reference() {
        let err = analyzer(KnownImages::new(&[]), vec![]).analyze("", true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }
}
