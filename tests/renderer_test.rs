#![cfg(unix)]
// Both template backends against the same template; the external one is driven through
// shell scripts standing in for opm.

use async_trait::async_trait;
use bpfman_catalog::bundle::{BundleInfo, FbcTemplate, LibraryTemplateRenderer, TemplateRenderer};
use bpfman_catalog::declcfg::DeclarativeConfig;
use bpfman_catalog::error::{CatalogError, ErrorKind, Result};
use bpfman_catalog::render::{ImageRenderer, OpmRenderer, RefKind};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const BUNDLE: &str = "quay.io/demo/demo-operator-bundle@sha256:1111111111111111111111111111111111111111111111111111111111111111";
const AGENT: &str = "registry.example.com/demo/agent@sha256:2222222222222222222222222222222222222222222222222222222222222222";

fn bundle_yaml(image: &str) -> String {
    format!(
        "---\nschema: olm.bundle\nname: demo-operator.v1.1.0\npackage: demo-operator\nimage: {image}\n\
         properties:\n  - type: olm.package\n    value:\n      packageName: demo-operator\n      version: 1.1.0\n\
         relatedImages:\n  - name: bundle\n    image: {image}\n  - name: agent\n    image: {AGENT}\n"
    )
}

struct Scripts {
    _dir: TempDir,
    ok: PathBuf,
    recording: PathBuf,
    recording_record: PathBuf,
    failing: PathBuf,
    failing_record: PathBuf,
    slow: PathBuf,
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Answers `render` with a bundle and `alpha render-template` with a full catalog
fn fake_opm(record: Option<&Path>) -> String {
    let record = record
        .map(|path| format!("pwd > {}\n", path.display()))
        .unwrap_or_default();
    format!(
        r#"{record}if [ "$1" = "render" ]; then
  cat <<EOF
{bundle}EOF
  exit 0
fi
[ "$1 $2 $3 $4" = "alpha render-template basic --migrate-level=bundle-object-to-csv-metadata" ] || exit 9
for template in "$@"; do :; done
grep -q "olm.template.basic" "$template" || exit 8
cat <<'EOF'
---
schema: olm.package
name: demo-operator
defaultChannel: preview
---
schema: olm.channel
package: demo-operator
name: preview
entries:
  - name: demo-operator.v1.1.0
{bundle_fixed}EOF
"#,
        bundle = bundle_yaml("$2"),
        bundle_fixed = bundle_yaml(BUNDLE),
    )
}

/// Written once, before any test spawns a child, so no script is still open for
/// writing when another thread forks
fn scripts() -> &'static Scripts {
    static SCRIPTS: OnceLock<Scripts> = OnceLock::new();
    SCRIPTS.get_or_init(|| {
        let dir = TempDir::new().unwrap();
        let failing_record = dir.path().join("failing.pwd");

        let recording_record = dir.path().join("recording.pwd");
        let ok = write_script(dir.path(), "opm-ok", &fake_opm(None));
        let recording = write_script(dir.path(), "opm-recording", &fake_opm(Some(&recording_record)));
        let failing = write_script(
            dir.path(),
            "opm-failing",
            &format!(
                "pwd > {}\necho 'error: unauthorized: access to the requested resource is not authorized' >&2\nexit 3\n",
                failing_record.display()
            ),
        );
        let slow = write_script(dir.path(), "opm-slow", "sleep 30\n");

        Scripts {
            _dir: dir,
            ok,
            recording,
            recording_record,
            failing,
            failing_record,
            slow,
        }
    })
}

fn template() -> FbcTemplate {
    let info = BundleInfo {
        name: "demo-operator.v1.1.0".to_string(),
        package: "demo-operator".to_string(),
    };
    FbcTemplate::single(BUNDLE, &info, "preview").unwrap()
}

/// In-process stand-in for a registry-backed renderer
struct CannedBundles;

#[async_trait]
impl ImageRenderer for CannedBundles {
    async fn render(&self, refs: &[String], mask: RefKind) -> Result<DeclarativeConfig> {
        assert!(mask.allows_bundle());
        DeclarativeConfig::parse(&bundle_yaml(&refs[0]))
    }
}

fn recorded_dir(record: &Path) -> PathBuf {
    PathBuf::from(fs::read_to_string(record).unwrap().trim())
}

#[tokio::test]
async fn test_backends_produce_same_inventory() {
    let scripts = scripts();
    let external = OpmRenderer::new(&scripts.ok, false, CancellationToken::new());
    let library = LibraryTemplateRenderer::new(Arc::new(CannedBundles));

    let from_opm = external.render_template(&template()).await.unwrap().parse().unwrap();
    let from_library = library.render_template(&template()).await.unwrap().parse().unwrap();

    assert_eq!(from_opm.inventory(), from_library.inventory());
    assert!(from_library.inventory().related_images.contains(AGENT));
    assert_eq!(external.backend(), "opm");
    assert_eq!(library.backend(), "library");
}

#[tokio::test]
async fn test_scratch_dir_removed_after_success() {
    let scripts = scripts();
    let external = OpmRenderer::new(&scripts.recording, false, CancellationToken::new());
    let cfg = external
        .render(&[BUNDLE.to_string()], RefKind::BundleOnly)
        .await
        .unwrap();
    assert_eq!(cfg.bundles[0].image, BUNDLE);

    let scratch = recorded_dir(&scripts.recording_record);
    assert!(scratch.file_name().unwrap().to_string_lossy().starts_with("bpfman-catalog-render-"));
    assert!(!scratch.exists());
}

#[tokio::test]
async fn test_failure_carries_stderr_and_cleans_up() {
    let scripts = scripts();
    let external = OpmRenderer::new(&scripts.failing, false, CancellationToken::new());
    let err = external.render_template(&template()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExternalTool);
    match err.root() {
        CatalogError::ExternalTool { code, stderr, .. } => {
            assert_eq!(*code, Some(3));
            assert!(stderr.contains("unauthorized"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!recorded_dir(&scripts.failing_record).exists());
}

#[tokio::test]
async fn test_bundle_mask_rejects_catalog_output() {
    let scripts = scripts();
    // the render branch only ever emits bundles, so ask for catalogs to trip the mask
    let external = OpmRenderer::new(&scripts.ok, false, CancellationToken::new());
    let err = external
        .render(&[BUNDLE.to_string()], RefKind::CatalogOnly)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_cancellation_stops_the_tool() {
    let scripts = scripts();
    let token = CancellationToken::new();
    let external = OpmRenderer::new(&scripts.slow, false, token.clone());

    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let err = external.render_template(&template()).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(10));
}
