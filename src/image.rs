//! # Image Metadata Access
//!
//! [`Image::open`] opens a source from a reference and reads its manifest
//! exactly once. The resulting [`Image`] owns the source for the rest of the
//! pull, so every blob read is made against the manifest that produced the
//! layer list:
//!
//! ```text
//! ImageReference ──new_image_source──► ImageSource ──get_manifest──► Manifest
//!                                           │                          │
//!                                           └────────── Image ─────────┘
//!                                           source()        layers()
//! ```
//!
//! Dropping the [`Image`] releases the source, on success and on every error
//! path alike.

use crate::constants::MAX_LAYERS;
use crate::error::{Error, Result};
use crate::manifest::{LayerDescriptor, Manifest};
use crate::transport::{ImageReference, ImageSource, SourceContext};
use tracing::info;

/// An open image source paired with its validated manifest.
pub struct Image {
    source: Box<dyn ImageSource>,
    manifest: Manifest,
}

impl Image {
    /// Opens the reference and reads the manifest.
    ///
    /// # Errors
    ///
    /// [`Error::SourceFailed`] when the source cannot be opened, the manifest
    /// cannot be read or parsed, or it lists more than [`MAX_LAYERS`] layers.
    /// The source is released before the error is returned.
    pub fn open(reference: &dyn ImageReference, ctx: &SourceContext) -> Result<Self> {
        let source = reference.new_image_source(ctx)?;
        let manifest = source.get_manifest()?;

        if manifest.layers.len() > MAX_LAYERS {
            return Err(Error::SourceFailed {
                reference: source.describe(),
                reason: format!("too many layers: {} > {}", manifest.layers.len(), MAX_LAYERS),
            });
        }

        info!(
            "Opened image {} ({} layers{})",
            source.describe(),
            manifest.layers.len(),
            manifest
                .platform
                .as_deref()
                .map(|p| format!(", {}", p))
                .unwrap_or_default()
        );

        Ok(Self { source, manifest })
    }

    /// Returns the open source for blob reads.
    pub fn source(&self) -> &dyn ImageSource {
        self.source.as_ref()
    }

    /// Returns the cached manifest.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Returns the layers in unpack order.
    pub fn layers(&self) -> &[LayerDescriptor] {
        &self.manifest.layers
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("source", &self.source.describe())
            .field("manifest", &self.manifest)
            .finish()
    }
}
