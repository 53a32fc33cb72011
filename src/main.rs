use anyhow::{bail, Context, Result};
use bpfman_catalog::analysis::{format_analysis, BundleAnalyzer, OutputFormat};
use bpfman_catalog::bundle::list::list_latest_bundles;
use bpfman_catalog::bundle::renderer::template_renderer;
use bpfman_catalog::bundle::{ArtefactGenerator, Artefacts, BundleMetadata};
use bpfman_catalog::catalog::extract_metadata;
use bpfman_catalog::constants::{DEFAULT_ARTEFACTS_DIR, DEFAULT_MANIFESTS_DIR};
use bpfman_catalog::logging::{init_logging, LogFormat};
use bpfman_catalog::manifests::ManifestGenerator;
use bpfman_catalog::oci::RegistryClient;
use bpfman_catalog::render::{ImageRenderer, OpmRenderer, RegistryRenderer};
use bpfman_catalog::writer::{prepare_output_dir, ArtefactWriter};
use bpfman_catalog::{CatalogConfig, ImageReference};
use clap::{CommandFactory, Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "bpfman-catalog", version)]
#[command(about = "Build and deploy OLM catalogs for bpfman on OpenShift")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log format
    #[arg(long, global = true, env = "LOG_FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prepare catalog build artefacts from a bundle image, or from the latest N bundles
    PrepareCatalogBuildFromBundle {
        /// Bundle image reference
        #[arg(required_unless_present = "latest")]
        bundle_image: Option<String>,

        /// Chain the N most recently built bundles instead of a single image
        #[arg(long, conflicts_with = "bundle_image")]
        latest: Option<usize>,

        /// Bundle repository searched by --latest
        #[arg(long, requires = "latest")]
        repository: Option<String>,

        /// Render with an external opm binary instead of the built-in renderer
        #[arg(long, env = "BPFMAN_CATALOG_OPM_BIN")]
        opm_bin: Option<PathBuf>,

        #[arg(long, default_value = DEFAULT_ARTEFACTS_DIR)]
        output_dir: PathBuf,
    },

    /// Prepare catalog build artefacts from an existing catalog.yaml
    PrepareCatalogBuildFromYaml {
        catalog_yaml: PathBuf,

        #[arg(long, default_value = DEFAULT_ARTEFACTS_DIR)]
        output_dir: PathBuf,
    },

    /// Generate deployment manifests for an existing catalog image
    PrepareCatalogDeploymentFromImage {
        catalog_image: String,

        #[arg(long, default_value = DEFAULT_MANIFESTS_DIR)]
        output_dir: PathBuf,
    },

    /// Report every image a bundle references and where it can be pulled from
    AnalyseBundle {
        bundle_image: String,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Include inaccessible images
        #[arg(long)]
        show_all: bool,
    },

    /// List the most recently built bundles in a repository
    ListBundles {
        #[arg(long)]
        repository: Option<String>,

        /// Number of bundles to list
        #[arg(long, default_value = "1")]
        list: usize,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Collaborators shared by every command
struct App {
    config: CatalogConfig,
    cancel: CancellationToken,
    registry: Arc<RegistryClient>,
}

impl App {
    fn new(config: CatalogConfig, cancel: CancellationToken) -> Result<Self> {
        let registry = Arc::new(RegistryClient::new(&config, cancel.clone())?);
        Ok(Self {
            config,
            cancel,
            registry,
        })
    }

    fn image_renderer(&self) -> Arc<dyn ImageRenderer> {
        match &self.config.opm_binary {
            Some(binary) => Arc::new(OpmRenderer::new(
                binary.clone(),
                self.config.show_tool_output,
                self.cancel.clone(),
            )),
            None => Arc::new(RegistryRenderer::new(self.registry.clone())),
        }
    }

    fn artefact_generator(&self) -> ArtefactGenerator {
        let images = self.image_renderer();
        let templates = template_renderer(
            self.config.opm_binary.clone(),
            self.config.show_tool_output,
            images.clone(),
            self.cancel.clone(),
        );
        ArtefactGenerator::new(
            images,
            templates,
            self.config.default_channel.clone(),
            self.config.resource_prefix.clone(),
        )
    }

    async fn latest_bundles(&self, repository: Option<&str>, limit: usize) -> Result<Vec<BundleMetadata>> {
        let repository = repository.unwrap_or(&self.config.default_bundle_repository);
        let repository = ImageReference::parse(repository).context("parsing repository")?;
        tracing::debug!(repository = %repository, limit, "Listing bundles");
        let bundles = list_latest_bundles(
            &repository,
            limit,
            self.registry.as_ref(),
            self.registry.as_ref(),
            self.config.inspect_concurrency,
        )
        .await
        .context("listing bundles")?;
        Ok(bundles)
    }
}

fn write_artefacts(output_dir: &Path, artefacts: &Artefacts) -> Result<()> {
    let writer = ArtefactWriter::new(output_dir);
    writer.write_artefacts(artefacts).context("writing artefacts")?;
    tracing::debug!(
        output_dir = %output_dir.display(),
        catalog_rendered = artefacts.catalog_rendered(),
        "Artefacts written"
    );

    print!("{}", artefacts.workflow);
    println!("\nThis information is saved in {}/WORKFLOW.txt", output_dir.display());
    Ok(())
}

fn print_bundles_text(bundles: &[BundleMetadata]) {
    let pinned = |b: &BundleMetadata| {
        if b.digest.is_empty() {
            b.image.clone()
        } else {
            b.pinned_image()
        }
    };

    if let [bundle] = bundles {
        println!("{} {}", pinned(bundle), bundle.build_date);
        return;
    }

    println!("Latest {} bundles (sorted by build date, newest first):\n", bundles.len());
    for bundle in bundles {
        println!("{}", pinned(bundle));
        println!("  Tag: {}", bundle.tag);
        println!("  Build Date: {}", bundle.build_date);
        if !bundle.version.is_empty() {
            println!("  Version: {}", bundle.version);
        }
        println!();
    }
}

async fn run(command: Command, app: &App) -> Result<()> {
    match command {
        Command::PrepareCatalogBuildFromBundle {
            bundle_image,
            latest,
            repository,
            opm_bin: _,
            output_dir,
        } => {
            prepare_output_dir(&output_dir)?;
            let generator = app.artefact_generator();
            let dir = output_dir.display().to_string();

            let artefacts = match (latest, bundle_image) {
                (Some(n), _) => {
                    let bundles = app.latest_bundles(repository.as_deref(), n).await?;
                    if bundles.is_empty() {
                        bail!("no bundles found");
                    }
                    generator.from_bundles(&bundles, &dir).await
                }
                (None, Some(image)) => {
                    tracing::debug!(bundle = %image, "Generating catalog artefacts from bundle");
                    generator.from_bundle(&image, &dir).await
                }
                (None, None) => bail!("a bundle image or --latest is required"),
            }
            .context("generating bundle artefacts")?;

            write_artefacts(&output_dir, &artefacts)
        }

        Command::PrepareCatalogBuildFromYaml {
            catalog_yaml,
            output_dir,
        } => {
            let content = std::fs::read_to_string(&catalog_yaml)
                .with_context(|| format!("reading {}", catalog_yaml.display()))?;
            prepare_output_dir(&output_dir)?;
            let artefacts = app
                .artefact_generator()
                .from_catalog_yaml(&content, &output_dir.display().to_string())?;
            write_artefacts(&output_dir, &artefacts)
        }

        Command::PrepareCatalogDeploymentFromImage {
            catalog_image,
            output_dir,
        } => {
            prepare_output_dir(&output_dir)?;
            let renderer = app.image_renderer();
            let meta = extract_metadata(
                &catalog_image,
                &app.config.package_name,
                app.registry.as_ref(),
                renderer.as_ref(),
            )
            .await
            .context("extracting catalog metadata")?;

            let manifests = ManifestGenerator::new(&app.config)
                .generate(&meta, &app.config.namespace)
                .context("generating manifests")?;
            ArtefactWriter::new(&output_dir)
                .write_manifests(&manifests)
                .context("writing manifests")?;

            tracing::debug!(catalog_source = ?manifests.catalog_source.metadata.name, "Manifests written");
            println!("Manifests generated in {}", output_dir.display());
            Ok(())
        }

        Command::AnalyseBundle {
            bundle_image,
            format,
            show_all,
        } => {
            let analyzer = BundleAnalyzer::new(app.registry.clone(), app.image_renderer(), &app.config);
            let analysis = analyzer
                .analyze(&bundle_image, show_all)
                .await
                .context("failed to analyse bundle")?;
            print!("{}", format_analysis(&analysis, format)?);
            Ok(())
        }

        Command::ListBundles {
            repository,
            list,
            format,
        } => {
            let bundles = app.latest_bundles(repository.as_deref(), list).await?;
            match format {
                OutputFormat::Json => {
                    let out = serde_json::json!({ "count": bundles.len(), "bundles": bundles });
                    println!("{}", serde_json::to_string_pretty(&out)?);
                }
                OutputFormat::Text => print_bundles_text(&bundles),
            }
            Ok(())
        }

        Command::Completions { .. } => Ok(()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Command::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "bpfman-catalog", &mut io::stdout());
        return;
    }

    if let Err(e) = init_logging(&cli.log_level, cli.log_format) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let mut config = CatalogConfig::from_env();
    if let Command::PrepareCatalogBuildFromBundle { opm_bin: Some(bin), .. } = &cli.command {
        config.opm_binary = Some(bin.clone());
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Received interrupt, cancelling");
            on_signal.cancel();
        }
    });

    let result = match App::new(config, cancel) {
        Ok(app) => run(cli.command, &app).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
