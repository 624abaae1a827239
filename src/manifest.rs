//! Manifests and layer descriptors.
//!
//! A [`Manifest`] is the validated, ordered layer list of one image. Both
//! transports parse OCI/Docker documents with the `oci-distribution` serde
//! types and reduce them to this shape, resolving image indexes to a single
//! platform on the way.

use crate::constants::{DOCKER_MANIFEST_LIST_MEDIA_TYPE, OCI_IMAGE_INDEX_MEDIA_TYPE};
use crate::error::{Error, Result};
use crate::platform::Platform;
use oci_distribution::manifest::{ImageIndexEntry, OciDescriptor, OciImageIndex, OciImageManifest};

/// One layer entry of a manifest.
///
/// The order of descriptors within a [`Manifest`] is the unpack order:
/// `layers[0]` is the base layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDescriptor {
    /// Content digest, `algorithm:hex`.
    pub digest: String,
    /// Blob size in bytes as declared by the manifest.
    pub size: u64,
    /// Media type of the blob.
    pub media_type: String,
}

impl LayerDescriptor {
    /// Creates a descriptor.
    pub fn new(digest: impl Into<String>, size: u64, media_type: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            size,
            media_type: media_type.into(),
        }
    }

    /// Returns the layer identity: the hex portion of the digest.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedDigest`] when the digest has no `:` separator, an
    /// empty side, or characters outside the OCI encoded-digest alphabet.
    pub fn identity(&self) -> Result<&str> {
        layer_identity(&self.digest)
    }
}

impl From<OciDescriptor> for LayerDescriptor {
    fn from(desc: OciDescriptor) -> Self {
        Self {
            digest: desc.digest,
            size: desc.size.max(0) as u64,
            media_type: desc.media_type,
        }
    }
}

impl From<&LayerDescriptor> for OciDescriptor {
    fn from(layer: &LayerDescriptor) -> Self {
        OciDescriptor {
            media_type: layer.media_type.clone(),
            digest: layer.digest.clone(),
            size: layer.size as i64,
            urls: None,
            annotations: None,
        }
    }
}

/// Extracts the identity (hex part) from an `algorithm:hex` digest.
pub fn layer_identity(digest: &str) -> Result<&str> {
    let malformed = || Error::MalformedDigest {
        digest: digest.to_string(),
    };

    let (algorithm, encoded) = digest.split_once(':').ok_or_else(malformed)?;
    if algorithm.is_empty() || encoded.is_empty() {
        return Err(malformed());
    }
    // Identities become directory names in drivers; keep them to the
    // encoded-digest alphabet.
    if !encoded
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '=' || c == '_' || c == '-')
    {
        return Err(malformed());
    }

    Ok(encoded)
}

/// The validated content of one image manifest.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    /// Digest of the manifest document, when the source reports one.
    pub digest: Option<String>,
    /// Image config blob digest.
    pub config_digest: Option<String>,
    /// Platform the manifest was resolved for (`os/arch`), if known.
    pub platform: Option<String>,
    /// Layers in unpack order.
    pub layers: Vec<LayerDescriptor>,
}

impl Manifest {
    /// Builds a manifest from a parsed OCI/Docker image manifest.
    pub fn from_image_manifest(
        image: OciImageManifest,
        digest: Option<String>,
        platform: Option<String>,
    ) -> Self {
        Self {
            digest,
            config_digest: Some(image.config.digest),
            platform,
            layers: image.layers.into_iter().map(LayerDescriptor::from).collect(),
        }
    }
}

/// Returns true if the media type names an image index / manifest list.
pub fn is_index_media_type(media_type: &str) -> bool {
    media_type == OCI_IMAGE_INDEX_MEDIA_TYPE || media_type == DOCKER_MANIFEST_LIST_MEDIA_TYPE
}

/// Picks the index entry matching `platform`.
///
/// When nothing matches, the error lists the platforms the index offers.
pub fn select_platform<'a>(
    index: &'a OciImageIndex,
    platform: &Platform,
    reference: &str,
) -> Result<&'a ImageIndexEntry> {
    index
        .manifests
        .iter()
        .find(|m| {
            m.platform.as_ref().is_some_and(|p| {
                platform.matches(&p.os, &p.architecture, p.variant.as_deref())
            })
        })
        .ok_or_else(|| {
            let available: Vec<String> = index
                .manifests
                .iter()
                .filter_map(|m| m.platform.as_ref())
                .map(|p| format!("{}/{}", p.os, p.architecture))
                .collect();

            Error::SourceFailed {
                reference: reference.to_string(),
                reason: format!(
                    "no manifest for {}. Available: {}",
                    platform,
                    available.join(", ")
                ),
            }
        })
}
