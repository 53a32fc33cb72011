pub mod analysis;
pub mod bundle;
pub mod cancel;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod declcfg;
pub mod error;
pub mod image_ref;
pub mod logging;
pub mod manifests;
pub mod oci;
pub mod render;
pub mod writer;

pub use config::CatalogConfig;
pub use error::{CatalogError, ErrorKind, Result};
pub use image_ref::ImageReference;
