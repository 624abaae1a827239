//! # Layer Unpack Orchestration
//!
//! Walks an image's layers in manifest order and drives the storage driver,
//! threading each layer's identity forward as the next layer's parent:
//!
//! ```text
//! layers:   sha256:aaaa        sha256:bbbb        sha256:cccc
//!               │                  │                  │
//! unpack:   ("aaaa", "")  ──►  ("bbbb", "aaaa") ──► ("cccc", "bbbb")
//!               │                  │                  │
//! chain:    [aaaa]             [aaaa, bbbb]       [aaaa, bbbb, cccc]
//! ```
//!
//! ## Guarantees
//!
//! - Layers are never reordered, deduplicated or unpacked concurrently:
//!   drivers may rely on the parent being fully materialized.
//! - A digest without `algorithm:hex` fails with [`Error::MalformedDigest`]
//!   before its blob is requested or the driver is called.
//! - Each blob stream lives for exactly one iteration and is dropped before
//!   the next layer is requested, whether the unpack succeeded or not.
//! - The first failure aborts the walk; already-unpacked layers are left to
//!   the driver (no rollback) and no partial chain is returned.
//!
//! [`Error::MalformedDigest`]: crate::error::Error::MalformedDigest

use crate::driver::Driver;
use crate::error::Result;
use crate::manifest::LayerDescriptor;
use crate::transport::ImageSource;
use tracing::debug;

/// Parent identity of the base layer.
pub const ROOT_PARENT: &str = "";

/// Ordered layer identities, bottom layer first.
///
/// `chain[i]`'s parent is `chain[i - 1]`; `chain[0]`'s parent is
/// [`ROOT_PARENT`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerChain {
    ids: Vec<String>,
}

impl LayerChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of layers in the chain.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if no layer has been recorded.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns the most recently recorded identity.
    pub fn top(&self) -> Option<&str> {
        self.ids.last().map(String::as_str)
    }

    /// Returns the parent the next layer must be unpacked onto.
    pub fn next_parent(&self) -> &str {
        self.top().unwrap_or(ROOT_PARENT)
    }

    /// Records a successfully unpacked layer on top of the chain.
    pub fn push(&mut self, id: impl Into<String>) {
        self.ids.push(id.into());
    }

    /// Returns the identities bottom to top.
    pub fn as_slice(&self) -> &[String] {
        &self.ids
    }

    /// Consumes the chain, returning the identities bottom to top.
    pub fn into_vec(self) -> Vec<String> {
        self.ids
    }
}

impl AsRef<[String]> for LayerChain {
    fn as_ref(&self) -> &[String] {
        &self.ids
    }
}

/// Unpacks every layer through `driver`, returning the completed chain.
///
/// # Errors
///
/// The first [`Error::MalformedDigest`], [`Error::BlobFetchFailed`] or driver
/// error, unchanged. Remaining layers are not attempted.
///
/// [`Error::MalformedDigest`]: crate::error::Error::MalformedDigest
/// [`Error::BlobFetchFailed`]: crate::error::Error::BlobFetchFailed
pub fn unpack_layers<D: Driver + ?Sized>(
    driver: &D,
    source: &dyn ImageSource,
    layers: &[LayerDescriptor],
) -> Result<LayerChain> {
    let mut chain = LayerChain::new();

    for (index, layer) in layers.iter().enumerate() {
        let id = layer.identity()?;
        let parent = chain.next_parent();

        debug!(
            "Unpacking layer {}/{}: {} (parent: {:?}, {} bytes)",
            index + 1,
            layers.len(),
            id,
            parent,
            layer.size
        );

        // Scoped to this iteration: the stream is dropped before the next
        // layer is requested, also when unpack fails.
        let size = {
            let mut blob = source.get_blob(layer)?;
            driver.unpack(id, parent, &mut blob)?
        };

        debug!("Unpacked layer {} ({} bytes)", id, size);
        chain.push(id);
    }

    Ok(chain)
}
