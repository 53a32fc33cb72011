//! Dockerfile, Makefile and WORKFLOW.txt that accompany a catalog build.

use crate::constants::{OPM_BASE_IMAGE, TTL_MAX_MINUTES, TTL_MIN_MINUTES};
use crate::image_ref::digest_suffix;

/// Identity of the ephemeral ttl.sh image shared by the Makefile and the workflow text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scaffold {
    pub image_uuid: String,
    /// Expiry such as `23m`
    pub ttl: String,
    /// Path of this tool, invoked from the Makefile
    pub binary: String,
    pub resource_prefix: String,
}

/// Two v4 UUIDs joined by `-`, unguessable enough for a public registry
pub fn generate_image_uuid() -> String {
    format!("{}-{}", uuid::Uuid::new_v4(), uuid::Uuid::new_v4())
}

/// Random lifetime between the configured bounds, inclusive
pub fn generate_ttl() -> String {
    let span = TTL_MAX_MINUTES - TTL_MIN_MINUTES + 1;
    format!("{}m", TTL_MIN_MINUTES + rand::random::<u32>() % span)
}

fn current_binary() -> String {
    std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| env!("CARGO_PKG_NAME").to_string())
}

impl Scaffold {
    pub fn new(resource_prefix: &str) -> Self {
        Self {
            image_uuid: generate_image_uuid(),
            ttl: generate_ttl(),
            binary: current_binary(),
            resource_prefix: resource_prefix.to_string(),
        }
    }

    pub fn ttl_image(&self) -> String {
        format!("ttl.sh/{}:{}", self.image_uuid, self.ttl)
    }

    /// `<prefix>-catalog-sha-<short>` for a digest-pinned source, `<prefix>-catalog` otherwise
    pub fn local_tag(&self, source: &str) -> String {
        match digest_suffix(source) {
            short if short.is_empty() => format!("{}-catalog", self.resource_prefix),
            short => format!("{}-catalog-sha-{}", self.resource_prefix, short),
        }
    }

    pub fn dockerfile(&self) -> String {
        format!(
            r#"# Catalog Dockerfile
# Generated by {name}
#
# Build with:
#   podman build -f Dockerfile -t my-catalog:dev .

FROM {base} AS builder

COPY catalog.yaml /configs/catalog.yaml

RUN ["/bin/opm", "validate", "/configs"]

FROM {base}

COPY --from=builder /configs /configs

LABEL operators.operatorframework.io.index.configs.v1=/configs

ENTRYPOINT ["/bin/opm"]
CMD ["serve", "/configs"]
"#,
            name = env!("CARGO_PKG_NAME"),
            base = OPM_BASE_IMAGE
        )
    }

    /// `source` is the bundle reference the catalog came from, or a marker such as `from-yaml`
    pub fn makefile(&self, source: &str) -> String {
        format!(
            "# Generated by {name} from {source}\n\
             \n\
             LOCAL_TAG ?= {local_tag}\n\
             IMAGE ?= {image}\n\
             MANIFESTS_DIR ?= manifests\n\
             CONTAINER_TOOL ?= podman\n\
             BPFMAN_CATALOG ?= {binary}\n\
             \n\
             .PHONY: all build-image push-image generate-manifests deploy undeploy clean\n\
             \n\
             all: push-image deploy\n\
             \n\
             build-image:\n\
             \t$(CONTAINER_TOOL) build -f Dockerfile -t $(LOCAL_TAG) .\n\
             \n\
             push-image: build-image\n\
             \t$(CONTAINER_TOOL) tag $(LOCAL_TAG) $(IMAGE)\n\
             \t$(CONTAINER_TOOL) push $(IMAGE)\n\
             \n\
             generate-manifests:\n\
             \t$(BPFMAN_CATALOG) prepare-catalog-deployment-from-image $(IMAGE) --output-dir $(MANIFESTS_DIR)\n\
             \n\
             deploy: generate-manifests\n\
             \tkubectl apply -f $(MANIFESTS_DIR)/\n\
             \n\
             undeploy:\n\
             \tkubectl delete -f $(MANIFESTS_DIR)/ --ignore-not-found\n\
             \n\
             clean:\n\
             \trm -rf $(MANIFESTS_DIR)\n\
             \t-$(CONTAINER_TOOL) rmi $(LOCAL_TAG)\n",
            name = env!("CARGO_PKG_NAME"),
            source = source,
            local_tag = self.local_tag(source),
            image = self.ttl_image(),
            binary = self.binary,
        )
    }

    pub fn workflow(&self, bundle_count: usize, catalog_rendered: bool, output_dir: &str) -> String {
        let mut out = String::new();
        out.push_str("Catalog build workflow\n======================\n\n");
        if bundle_count > 1 {
            out.push_str(&format!(
                "The catalog chains {} bundles, oldest first, in a single channel.\n\n",
                bundle_count
            ));
        }

        if catalog_rendered {
            out.push_str(&format!(
                "Generated in {dir}: fbc-template.yaml (when built from bundles), catalog.yaml, Dockerfile, Makefile.\n\n",
                dir = output_dir
            ));
        } else {
            out.push_str(&format!(
                "Automatic rendering did not complete, so {dir}/catalog.yaml is missing.\n\
                 Render it from the template, then continue below:\n\n\
                 \x20 opm alpha render-template basic --migrate-level=bundle-object-to-csv-metadata -o yaml \\\n\
                 \x20     {dir}/fbc-template.yaml > {dir}/catalog.yaml\n\n",
                dir = output_dir
            ));
        }

        out.push_str(&format!(
            "1. Build and push the catalog image (expires after {ttl}):\n\n\
             \x20 make -C {dir} push-image\n\n\
             2. Generate deployment manifests and apply them:\n\n\
             \x20 make -C {dir} deploy\n\n\
             Or do both in one step:\n\n\
             \x20 make -C {dir} all\n\n\
             The image is pushed as {image}\n\n\
             To remove the deployment:\n\n\
             \x20 make -C {dir} undeploy\n",
            ttl = self.ttl,
            dir = output_dir,
            image = self.ttl_image(),
        ));
        out
    }
}
