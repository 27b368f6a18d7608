// Artifact layout, builder environment and naming conventions shared across acibuild

/// Build manifest template read from the project directory
pub const PATH_ACI_MANIFEST: &str = "aci-manifest.yml";

/// Target directory under the project when no work directory is configured
pub const PATH_TARGET: &str = "target";

pub const PATH_IMAGE_ACI: &str = "image.aci";
pub const PATH_IMAGE_ACI_ASC: &str = "image.aci.asc";
pub const PATH_IMAGE_GZ_ACI: &str = "image.gz.aci";
pub const PATH_IMAGE_GZ_ACI_ASC: &str = "image.gz.aci.asc";
pub const PATH_MANIFEST_JSON: &str = "manifest.json";
pub const PATH_VERSION: &str = "version";
pub const PATH_GRAPH_DOT: &str = "graph.dot";
pub const PATH_GRAPH_PNG: &str = "graph.png";

pub const PATH_STAGE1: &str = "stage1";
pub const PATH_BUILDER: &str = "builder";
pub const PATH_TESTER_STAGE1: &str = "tester-stage1";
pub const PATH_TESTER: &str = "tester";
pub const PATH_BUILDER_UUID: &str = "builder.uuid";
pub const PATH_TESTER_UUID: &str = "tester.uuid";

/// Entries of an image archive
pub const PATH_MANIFEST: &str = "manifest";
pub const PATH_ROOTFS: &str = "rootfs";

/// Placeholder keeping the builder's rootfs layer non-empty
pub const PATH_KEEP: &str = ".keep";

pub const SUFFIX_ASC: &str = ".asc";

pub const PREFIX_BUILDER: &str = "builder/";
pub const PREFIX_BUILDER_STAGE1: &str = "builder-stage1/";
pub const PREFIX_TEST: &str = "test/";

// Environment passed into the builder invocation
pub const ENV_BUILDER_VERSION: &str = "ACI_BUILDER_VERSION";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
pub const ENV_ACI_PATH: &str = "ACI_PATH";
pub const ENV_ACI_TARGET: &str = "ACI_TARGET";
pub const ENV_BUILDER_COMMAND: &str = "BUILDER_COMMAND";
pub const ENV_CATCH_ON_ERROR: &str = "CATCH_ON_ERROR";
pub const ENV_CATCH_ON_STEP: &str = "CATCH_ON_STEP";

/// Builder image used when a manifest does not name one
pub const DEFAULT_BUILDER_IMAGE: &str = "acibuild.io/aci-builder";

/// appc schema values written into generated manifests
pub const AC_KIND_IMAGE_MANIFEST: &str = "ImageManifest";
pub const AC_VERSION: &str = "0.8.11";
pub const LABEL_VERSION: &str = "version";
pub const LABEL_OS: &str = "os";
pub const LABEL_ARCH: &str = "arch";
pub const ANNOTATION_BUILDER_VERSION: &str = "acibuild-version";
pub const ISOLATOR_CAPABILITIES_RETAIN: &str = "os/linux/capabilities-retain-set";

/// Compression defaults: 100 kB blocks, 10 blocks in flight
pub const DEFAULT_COMPRESSION_BLOCK_SIZE: usize = 100_000;
pub const DEFAULT_COMPRESSION_CONCURRENCY: usize = 10;

/// Tool version advertised to builders and recorded in image annotations
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
