use crate::analysis::{BundleAnalysis, ImageInfo, ImageResult, RegistryClass};
use crate::error::Result;
use colored::Colorize;
use std::fmt::Write;

/// Output format shared by the reporting commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub fn format_analysis(analysis: &BundleAnalysis, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let mut out = serde_json::to_string_pretty(analysis)?;
            out.push('\n');
            Ok(out)
        }
        OutputFormat::Text => Ok(format_text(analysis)),
    }
}

fn write_info(out: &mut String, info: &ImageInfo, indent: &str) {
    if let Some(version) = &info.version {
        let _ = writeln!(out, "{}Version: {}", indent, version);
    }
    if let Some(created) = &info.created {
        let _ = writeln!(out, "{}Created: {}", indent, created.to_rfc3339_opts(chrono::SecondsFormat::Secs, true));
    }
    if let Some(commit) = &info.git_commit {
        let _ = writeln!(out, "{}Commit: {}", indent, commit);
    }
    if let Some(url) = &info.git_url {
        let _ = writeln!(out, "{}Source: {}", indent, url);
    }
    if let Some(title) = &info.pr_title {
        let _ = writeln!(out, "{}Build: {}", indent, title);
    }
}

fn registry_tag(registry: RegistryClass) -> String {
    let label = format!("[{}]", registry);
    match registry {
        RegistryClass::Primary => label.green().to_string(),
        RegistryClass::TenantWorkspace => label.yellow().to_string(),
        RegistryClass::NotAccessible => label.red().to_string(),
    }
}

fn write_image(out: &mut String, image: &ImageResult) {
    let mark = if image.accessible { "✓".green() } else { "✗".red() };
    let _ = writeln!(out, "  {} {} {}", mark, image.reference, registry_tag(image.registry));
    if let Some(resolved) = &image.resolved {
        let _ = writeln!(out, "      Found at: {}", resolved);
    }
    if let Some(error) = &image.error {
        let _ = writeln!(out, "      Error: {}", error.dimmed());
    }
    if let Some(info) = &image.info {
        write_info(out, info, "      ");
    }
}

fn format_text(analysis: &BundleAnalysis) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", "Bundle:".bold(), analysis.bundle_ref);
    if analysis.resolved_bundle_ref != analysis.bundle_ref {
        let _ = writeln!(out, "  Found at: {}", analysis.resolved_bundle_ref);
    }
    let _ = writeln!(out, "  Registry: {}", registry_tag(analysis.bundle_registry));
    write_info(&mut out, &analysis.bundle_info, "  ");

    let _ = writeln!(out, "\n{} ({})", "Images".bold(), analysis.images.len());
    if analysis.images.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for image in &analysis.images {
        write_image(&mut out, image);
    }

    let s = &analysis.summary;
    let _ = writeln!(out, "\n{}", "Summary".bold());
    let _ = writeln!(out, "  Total: {}", s.total_images);
    let _ = writeln!(out, "  Accessible: {}", s.accessible_images);
    let _ = writeln!(out, "  Inaccessible: {}", s.inaccessible_images);
    let _ = writeln!(out, "  Primary registry: {}", s.primary_images);
    let _ = writeln!(out, "  Tenant workspace: {}", s.tenant_images);
    out
}
