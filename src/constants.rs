//! # Pull and Unpack Constants
//!
//! Resource limits, timeouts, store layout names and OCI identifiers used
//! across the crate. These constants are the single source of truth for the
//! bounds enforced while resolving, reading and unpacking images.
//!
//! ## Cross-References
//!
//! - [`crate::location`]: location length bound
//! - [`crate::image`]: layer count bound
//! - [`crate::transport`]: manifest size bound, pull timeout, media types
//! - [`crate::drivers`]: store layout, extraction bounds, runtime spec version

use std::time::Duration;

// =============================================================================
// Size Limits
// =============================================================================
//
// The cumulative worst case for one layer is bounded by MAX_ROOTFS_SIZE and
// MAX_FILES_PER_LAYER, independently of the compressed blob size.
// =============================================================================

/// Maximum image location length in bytes.
///
/// **Attack Vector**: Pathologically long locations fed to URL and reference
/// parsers.
pub const MAX_LOCATION_LEN: usize = 512;

/// Maximum number of layers in an image manifest.
///
/// **Attack Vector**: 10,000 one-byte layers would turn a pull into thousands
/// of full tree copies.
pub const MAX_LAYERS: usize = 128;

/// Maximum size of a manifest or index document read from disk (1 MiB).
///
/// Standard OCI manifests are typically under 100 KiB.
pub const MAX_MANIFEST_SIZE: u64 = 1024 * 1024;

/// Maximum number of tar entries applied from a single layer.
///
/// **Attack Vector**: Inode exhaustion through millions of tiny files.
pub const MAX_FILES_PER_LAYER: usize = 100_000;

/// Maximum extracted size of a single layer (4 GiB).
///
/// **Attack Vector**: Compression bombs (small compressed, huge uncompressed).
pub const MAX_ROOTFS_SIZE: u64 = 4 * 1024 * 1024 * 1024;

// =============================================================================
// Timeouts
// =============================================================================

/// Timeout applied to each registry request (manifest or blob).
pub const IMAGE_PULL_TIMEOUT: Duration = Duration::from_secs(300);

// =============================================================================
// Store Layout
// =============================================================================

/// Directory under the store root holding one merged tree per layer.
pub const LAYER_DIR: &str = "layers";

/// Directory under the store root holding assembled bundles.
pub const BUNDLE_DIR: &str = "bundles";

/// Directory name of the root filesystem inside a bundle.
pub const ROOTFS_DIR: &str = "rootfs";

/// Runtime configuration file name inside a bundle.
pub const BUNDLE_CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the CLI's default store root.
pub const STORE_ENV_VAR: &str = "LAYERFS_STORE";

// =============================================================================
// OCI Identifiers
// =============================================================================

/// OCI runtime spec version written into generated bundles.
pub const OCI_RUNTIME_SPEC_VERSION: &str = "1.0.2";

/// OCI image manifest media type.
pub const OCI_IMAGE_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// OCI image index media type.
pub const OCI_IMAGE_INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";

/// Docker v2 manifest list media type.
pub const DOCKER_MANIFEST_LIST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// OCI gzip-compressed layer media type.
pub const OCI_LAYER_MEDIA_TYPE_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

/// OCI uncompressed layer media type.
pub const OCI_LAYER_MEDIA_TYPE_TAR: &str = "application/vnd.oci.image.layer.v1.tar";

/// Index annotation naming the tag of a manifest in an image layout.
pub const OCI_REF_NAME_ANNOTATION: &str = "org.opencontainers.image.ref.name";

/// Bundle annotation listing the layer identities the rootfs was built from.
pub const LAYERS_ANNOTATION: &str = "org.opencontainers.image.layers";

/// Image layout index file name.
pub const OCI_LAYOUT_INDEX_FILE: &str = "index.json";

/// Image layout blob directory name.
pub const OCI_LAYOUT_BLOBS_DIR: &str = "blobs";

// =============================================================================
// Layer Tar Conventions
// =============================================================================

/// Prefix marking a whiteout entry that deletes its sibling.
pub const WHITEOUT_PREFIX: &str = ".wh.";

/// Entry marking its directory as opaque (lower contents hidden).
pub const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";
