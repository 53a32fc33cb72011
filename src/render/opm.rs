use crate::bundle::fbc::FbcTemplate;
use crate::bundle::renderer::TemplateRenderer;
use crate::cancel::cancellable;
use crate::constants::MIGRATE_LEVEL;
use crate::declcfg::DeclarativeConfig;
use crate::error::{CatalogError, Result, ResultExt};
use crate::render::{ImageRenderer, RefKind, RenderedCatalog};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

const TEMPLATE_FILE: &str = "template.yaml";

/// Renders by running an external `opm` binary
pub struct OpmRenderer {
    binary: PathBuf,
    show_output: bool,
    cancel: CancellationToken,
}

impl OpmRenderer {
    pub fn new(binary: impl Into<PathBuf>, show_output: bool, cancel: CancellationToken) -> Self {
        Self {
            binary: binary.into(),
            show_output,
            cancel,
        }
    }

    fn tool_name(&self) -> String {
        self.binary
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.binary.display().to_string())
    }

    fn scratch_dir() -> Result<tempfile::TempDir> {
        Ok(tempfile::Builder::new().prefix("bpfman-catalog-render-").tempdir()?)
    }

    /// Run the binary in `workdir`, returning stdout. A non-zero exit carries stderr verbatim.
    async fn run(&self, args: Vec<OsString>, workdir: &Path) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(binary = %self.binary.display(), ?args, "Running external renderer");

        let output = cancellable(&self.cancel, async {
            cmd.output().await.map_err(|e| {
                CatalogError::Other(anyhow::anyhow!("running {}: {}", self.binary.display(), e))
            })
        })
        .await?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if self.show_output && !stderr.trim().is_empty() {
            tracing::info!(tool = %self.tool_name(), "{}", stderr.trim_end());
        } else if !stderr.trim().is_empty() {
            tracing::debug!(tool = %self.tool_name(), "{}", stderr.trim_end());
        }

        if !output.status.success() {
            return Err(CatalogError::ExternalTool {
                tool: self.tool_name(),
                code: output.status.code(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ImageRenderer for OpmRenderer {
    async fn render(&self, refs: &[String], mask: RefKind) -> Result<DeclarativeConfig> {
        let scratch = Self::scratch_dir()?;

        let mut args: Vec<OsString> = vec!["render".into()];
        args.extend(refs.iter().map(OsString::from));
        args.push(OsString::from("-o"));
        args.push(OsString::from("yaml"));
        args.push(OsString::from(format!("--migrate-level={}", MIGRATE_LEVEL)));

        let stdout = self.run(args, scratch.path()).await?;
        let cfg = DeclarativeConfig::parse(&stdout).context("parsing opm render output")?;

        // opm has no reference mask of its own; a catalog shows up as packages or channels
        let is_catalog = !cfg.packages.is_empty() || !cfg.channels.is_empty();
        if is_catalog && !mask.allows_catalog() {
            return Err(CatalogError::validation(format!(
                "{} rendered as a catalog but only {} are allowed",
                refs.join(", "),
                mask
            )));
        }
        if !cfg.bundles.is_empty() && !is_catalog && !mask.allows_bundle() {
            return Err(CatalogError::validation(format!(
                "{} rendered as bundles but only {} are allowed",
                refs.join(", "),
                mask
            )));
        }
        Ok(cfg)
    }
}

#[async_trait]
impl TemplateRenderer for OpmRenderer {
    async fn render_template(&self, template: &FbcTemplate) -> Result<RenderedCatalog> {
        let scratch = Self::scratch_dir()?;
        let template_path = scratch.path().join(TEMPLATE_FILE);
        tokio::fs::write(&template_path, template.to_yaml()?).await?;

        let args: Vec<OsString> = vec![
            "alpha".into(),
            "render-template".into(),
            "basic".into(),
            format!("--migrate-level={}", MIGRATE_LEVEL).into(),
            "-o".into(),
            "yaml".into(),
            template_path.into_os_string(),
        ];

        let stdout = self.run(args, scratch.path()).await?;
        RenderedCatalog::new(stdout)
    }

    fn backend(&self) -> &'static str {
        "opm"
    }
}
