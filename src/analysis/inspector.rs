use crate::analysis::{ImageInfo, ImageResult, RegistryClass};
use crate::config::TenantWorkspace;
use crate::error::Result;
use crate::image_ref::ImageReference;
use crate::oci::{ImageInspection, RegistryInspect};
use futures::stream::{self, StreamExt};
use std::sync::Arc;

/// Outcome of the primary-then-tenant lookup for one reference
#[derive(Debug)]
pub enum Probe {
    Found {
        registry: RegistryClass,
        reference: ImageReference,
        inspection: ImageInspection,
    },
    Missing {
        /// References tried, in order
        attempts: Vec<String>,
        reason: String,
    },
}

/// Classifies images by trying their own registry first and the tenant workspace second
pub struct ImageInspector {
    inspect: Arc<dyn RegistryInspect>,
    tenant: TenantWorkspace,
    concurrency: usize,
}

impl ImageInspector {
    pub fn new(inspect: Arc<dyn RegistryInspect>, tenant: TenantWorkspace, concurrency: usize) -> Self {
        Self {
            inspect,
            tenant,
            concurrency: concurrency.max(1),
        }
    }

    /// A direct hit is primary unless the reference already names the tenant workspace
    fn direct_class(&self, reference: &ImageReference) -> RegistryClass {
        if reference.is_in_tenant_workspace(&self.tenant) {
            RegistryClass::TenantWorkspace
        } else {
            RegistryClass::Primary
        }
    }

    /// Two sequential attempts, never more. Only cancellation is an `Err`.
    pub async fn probe(&self, reference: &ImageReference) -> Result<Probe> {
        let direct_err = match self.inspect.inspect(reference).await {
            Ok(inspection) => {
                return Ok(Probe::Found {
                    registry: self.direct_class(reference),
                    reference: reference.clone(),
                    inspection,
                })
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => e,
        };
        tracing::debug!(image = %reference, error = %direct_err, "Direct inspection failed");

        let tenant_ref = match reference.to_tenant_workspace(&self.tenant) {
            Ok(tenant_ref) => tenant_ref,
            Err(_) => {
                return Ok(Probe::Missing {
                    attempts: vec![reference.to_string()],
                    reason: direct_err.to_string(),
                })
            }
        };

        match self.inspect.inspect(&tenant_ref).await {
            Ok(inspection) => Ok(Probe::Found {
                registry: RegistryClass::TenantWorkspace,
                reference: tenant_ref,
                inspection,
            }),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                tracing::debug!(image = %tenant_ref, error = %e, "Tenant workspace inspection failed");
                Ok(Probe::Missing {
                    attempts: vec![reference.to_string(), tenant_ref.to_string()],
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Failures become `NotAccessible` results; only cancellation aborts
    pub async fn inspect_image(&self, reference: &str) -> Result<ImageResult> {
        let parsed = match ImageReference::parse(reference) {
            Ok(parsed) => parsed,
            Err(e) => return Ok(ImageResult::not_accessible(reference, format!("invalid image reference: {}", e))),
        };

        Ok(match self.probe(&parsed).await? {
            Probe::Found {
                registry,
                reference: found,
                inspection,
            } => {
                let found = found.to_string();
                ImageResult {
                    resolved: (found != reference).then_some(found),
                    reference: reference.to_string(),
                    accessible: true,
                    registry,
                    error: None,
                    info: Some(ImageInfo::from(&inspection)),
                }
            }
            Probe::Missing { attempts, reason } => {
                let error = if attempts.len() > 1 {
                    format!("not accessible in primary or tenant workspace registry: {}", reason)
                } else {
                    format!("not accessible in any registry: {}", reason)
                };
                ImageResult::not_accessible(reference, error)
            }
        })
    }

    /// Results come back in input order regardless of completion order
    pub async fn inspect_images(&self, references: &[String]) -> Result<Vec<ImageResult>> {
        let results: Vec<Result<ImageResult>> = stream::iter(references)
            .map(|reference| self.inspect_image(reference))
            .buffered(self.concurrency)
            .collect()
            .await;
        results.into_iter().collect()
    }
}
