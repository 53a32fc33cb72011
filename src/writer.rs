//! Persists generated manifests and build artefacts to an output directory.

use crate::bundle::Artefacts;
use crate::error::{CatalogError, Result, ResultExt};
use crate::manifests::ManifestSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Reject the working directory itself, then remove whatever a previous run left behind
pub fn prepare_output_dir(dir: &Path) -> Result<()> {
    let meaningful = dir.components().any(|c| !matches!(c, Component::CurDir));
    if !meaningful {
        return Err(CatalogError::validation(
            "output directory cannot be the current working directory, use a named subdirectory",
        ));
    }
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CatalogError::from(e).context(format!("cleaning output directory {}", dir.display()))),
    }
}

pub struct ArtefactWriter {
    dir: PathBuf,
}

impl ArtefactWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write one file, creating the directory on demand
    pub fn write_file(&self, name: &str, content: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .map_err(CatalogError::from)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.dir.join(name);
        fs::write(&path, content)
            .map_err(CatalogError::from)
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::debug!(path = %path.display(), bytes = content.len(), "Wrote file");
        Ok(path)
    }

    pub fn write_manifests(&self, manifests: &ManifestSet) -> Result<Vec<PathBuf>> {
        manifests
            .documents()?
            .iter()
            .map(|(name, yaml)| self.write_file(name, yaml))
            .collect()
    }

    pub fn write_artefacts(&self, artefacts: &Artefacts) -> Result<Vec<PathBuf>> {
        artefacts
            .files()
            .into_iter()
            .map(|(name, content)| self.write_file(name, content))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CatalogConfig;
    use crate::manifests::{CatalogMetadata, ManifestGenerator};
    use tempfile::TempDir;

    #[test]
    fn test_current_dir_rejected() {
        assert!(prepare_output_dir(Path::new(".")).is_err());
        assert!(prepare_output_dir(Path::new("./")).is_err());
    }

    #[test]
    fn test_prepare_removes_previous_output() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("out");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("stale.yaml"), "x").unwrap();

        prepare_output_dir(&dir).unwrap();
        assert!(!dir.exists());
        // absent directories are fine
        prepare_output_dir(&dir).unwrap();
    }

    #[test]
    fn test_write_manifests_creates_dir() {
        let tmp = TempDir::new().unwrap();
        let writer = ArtefactWriter::new(tmp.path().join("nested/manifests"));
        let meta = CatalogMetadata {
            image: format!("quay.io/a/catalog-ystream@sha256:{}", "a".repeat(64)),
            short_digest: "aaaaaaaa".to_string(),
            default_channel: "stable".to_string(),
            ..Default::default()
        };
        let set = ManifestGenerator::new(&CatalogConfig::default()).generate(&meta, "bpfman").unwrap();

        let paths = writer.write_manifests(&set).unwrap();
        assert_eq!(paths.len(), 5);
        let subscription = fs::read_to_string(writer.dir().join("04-subscription.yaml")).unwrap();
        assert!(subscription.contains("source: bpfman-catalogsource-sha-aaaaaaaa"));
    }
}
