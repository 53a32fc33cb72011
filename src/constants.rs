// Centralized constants for bpfman-catalog to avoid magic strings

/// Registry assumed when the first path segment of a reference is not a host
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Endpoint actually serving the `docker.io` registry API
pub const DOCKER_HUB_API_HOST: &str = "registry-1.docker.io";

/// Channel used when none is given
pub const DEFAULT_CHANNEL: &str = "preview";

/// Schema identifiers of the file-based catalog format
pub const SCHEMA_TEMPLATE_BASIC: &str = "olm.template.basic";
pub const SCHEMA_PACKAGE: &str = "olm.package";
pub const SCHEMA_CHANNEL: &str = "olm.channel";
pub const SCHEMA_BUNDLE: &str = "olm.bundle";

/// Bundle property types
pub const PROPERTY_PACKAGE: &str = "olm.package";
pub const PROPERTY_GVK: &str = "olm.gvk";
pub const PROPERTY_CSV_METADATA: &str = "olm.csv.metadata";

/// Migration applied by both render backends
pub const MIGRATE_LEVEL: &str = "bundle-object-to-csv-metadata";

/// Bundle image annotations (metadata/annotations.yaml)
pub const ANNOTATIONS_FILE: &str = "metadata/annotations.yaml";
pub const ANNOTATION_PACKAGE: &str = "operators.operatorframework.io.bundle.package.v1";
pub const ANNOTATION_MANIFESTS: &str = "operators.operatorframework.io.bundle.manifests.v1";
pub const LABEL_CONFIGS_DIR: &str = "operators.operatorframework.io.index.configs.v1";
pub const DEFAULT_CONFIGS_DIR: &str = "configs";

/// Image labels read during inspection
pub const LABEL_VERSION: &str = "version";
pub const LABEL_BUILD_DATE: &str = "build-date";
pub const LABEL_COMMIT_OPENSHIFT: &str = "io.openshift.build.commit.id";
pub const LABEL_COMMIT_VCS: &str = "vcs-ref";
pub const LABEL_SOURCE_OPENSHIFT: &str = "io.openshift.build.source-location";
pub const LABEL_SOURCE_VCS: &str = "vcs-url";
pub const LABEL_BUILD_NAME: &str = "io.openshift.build.name";

/// Default output directories of the CLI
pub const DEFAULT_ARTEFACTS_DIR: &str = "auto-generated/artefacts";
pub const DEFAULT_MANIFESTS_DIR: &str = "auto-generated/manifests";

/// Default number of concurrent registry inspections
pub const DEFAULT_INSPECT_CONCURRENCY: usize = 4;

/// ttl.sh image lifetime bounds in minutes
pub const TTL_MIN_MINUTES: u32 = 15;
pub const TTL_MAX_MINUTES: u32 = 30;

/// Catalog builder base image used by the generated Dockerfile
pub const OPM_BASE_IMAGE: &str = "registry.redhat.io/openshift4/ose-operator-registry-rhel9:v4.20";
