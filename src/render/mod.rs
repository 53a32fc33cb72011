pub mod opm;
pub mod registry;

use crate::declcfg::DeclarativeConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

pub use opm::OpmRenderer;
pub use registry::RegistryRenderer;

/// Which kinds of image reference a render call accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    BundleOnly,
    CatalogOnly,
    Any,
}

impl RefKind {
    pub fn allows_bundle(self) -> bool {
        matches!(self, Self::BundleOnly | Self::Any)
    }

    pub fn allows_catalog(self) -> bool {
        matches!(self, Self::CatalogOnly | Self::Any)
    }
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BundleOnly => write!(f, "bundle images"),
            Self::CatalogOnly => write!(f, "catalog images"),
            Self::Any => write!(f, "bundle or catalog images"),
        }
    }
}

/// Turn bundle or catalog image references into declarative config
#[async_trait]
pub trait ImageRenderer: Send + Sync {
    async fn render(&self, refs: &[String], mask: RefKind) -> Result<DeclarativeConfig>;
}

/// A rendered catalog document, never empty once constructed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCatalog(String);

impl RenderedCatalog {
    pub fn new(yaml: impl Into<String>) -> Result<Self> {
        let yaml = yaml.into();
        if yaml.trim().is_empty() {
            return Err(crate::error::CatalogError::validation("renderer produced an empty catalog"));
        }
        Ok(Self(yaml))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn parse(&self) -> Result<DeclarativeConfig> {
        DeclarativeConfig::parse(&self.0)
    }
}

impl fmt::Display for RenderedCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
