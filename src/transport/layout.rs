//! # Image Layout Transport (`oci://`)
//!
//! Reads images from an OCI image layout directory:
//!
//! ```text
//! <dir>/
//! ├── oci-layout
//! ├── index.json
//! └── blobs/
//!     └── sha256/
//!         ├── <manifest hex>
//!         ├── <config hex>
//!         └── <layer hex>...
//! ```
//!
//! The location `oci:///var/images/alpine:3.19` names the layout at
//! `/var/images/alpine` and the index entry annotated
//! `org.opencontainers.image.ref.name = 3.19`. Without a tag the index must
//! hold a single manifest, or one per platform.

use super::{BlobStream, ImageReference, ImageSource, SourceContext, Transport};
use crate::constants::{
    MAX_MANIFEST_SIZE, OCI_LAYOUT_BLOBS_DIR, OCI_LAYOUT_INDEX_FILE, OCI_REF_NAME_ANNOTATION,
};
use crate::error::{Error, Result};
use crate::manifest::{
    LayerDescriptor, Manifest, is_index_media_type, layer_identity, select_platform,
};
use crate::platform::Platform;
use oci_distribution::manifest::{ImageIndexEntry, OciImageIndex, OciImageManifest};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

const TRANSPORT_NAME: &str = "oci";

/// Transport for local OCI image layouts.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutTransport;

impl Transport for LayoutTransport {
    fn name(&self) -> &'static str {
        TRANSPORT_NAME
    }

    fn parse_reference(&self, reference: &str) -> Result<Box<dyn ImageReference>> {
        let invalid = |reason: &str| Error::InvalidReference {
            transport: TRANSPORT_NAME.to_string(),
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        // "//" + path: dropping one slash leaves an absolute path
        let spec = reference
            .strip_prefix('/')
            .filter(|rest| rest.starts_with('/'))
            .ok_or_else(|| invalid("reference must start with //"))?;

        let (dir, tag) = match spec.rsplit_once(':') {
            Some((dir, tag)) if !tag.contains('/') => (dir, Some(tag)),
            _ => (spec, None),
        };

        if dir.is_empty() || dir == "/" {
            return Err(invalid("empty layout directory"));
        }
        if let Some(tag) = tag
            && (tag.is_empty()
                || !tag
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_'))
        {
            return Err(invalid("invalid tag"));
        }

        Ok(Box::new(LayoutReference {
            dir: PathBuf::from(dir),
            tag: tag.map(str::to_string),
        }))
    }
}

/// A layout directory plus optional tag.
#[derive(Debug, Clone)]
struct LayoutReference {
    dir: PathBuf,
    tag: Option<String>,
}

impl fmt::Display for LayoutReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", TRANSPORT_NAME, self.dir.display())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        Ok(())
    }
}

impl ImageReference for LayoutReference {
    fn transport_name(&self) -> &'static str {
        TRANSPORT_NAME
    }

    fn new_image_source(&self, ctx: &SourceContext) -> Result<Box<dyn ImageSource>> {
        if !self.dir.is_dir() {
            return Err(Error::SourceFailed {
                reference: self.to_string(),
                reason: format!("layout directory {} does not exist", self.dir.display()),
            });
        }

        debug!("Opened layout source {}", self);

        Ok(Box::new(LayoutSource {
            reference: self.clone(),
            platform: ctx.platform.clone(),
        }))
    }
}

/// An open image layout.
struct LayoutSource {
    reference: LayoutReference,
    platform: Platform,
}

impl LayoutSource {
    fn source_failed(&self, reason: String) -> Error {
        Error::SourceFailed {
            reference: self.describe(),
            reason,
        }
    }

    /// Returns the on-disk path of a blob.
    fn blob_path(&self, digest: &str) -> Result<PathBuf> {
        let hex = layer_identity(digest)?;
        let (algorithm, _) = digest.split_once(':').unwrap_or_default();
        // SECURITY: the algorithm becomes a path component too
        if !algorithm.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::MalformedDigest {
                digest: digest.to_string(),
            });
        }
        Ok(self
            .reference
            .dir
            .join(OCI_LAYOUT_BLOBS_DIR)
            .join(algorithm)
            .join(hex))
    }

    /// Reads a small JSON document with the manifest size bound applied.
    fn read_document(&self, path: &Path) -> Result<Vec<u8>> {
        let file = File::open(path)
            .map_err(|e| self.source_failed(format!("failed to open {}: {}", path.display(), e)))?;

        let mut data = Vec::new();
        file.take(MAX_MANIFEST_SIZE + 1)
            .read_to_end(&mut data)
            .map_err(|e| self.source_failed(format!("failed to read {}: {}", path.display(), e)))?;

        if data.len() as u64 > MAX_MANIFEST_SIZE {
            return Err(self.source_failed(format!(
                "{} exceeds {} bytes",
                path.display(),
                MAX_MANIFEST_SIZE
            )));
        }
        Ok(data)
    }

    fn read_index(&self, path: &Path) -> Result<OciImageIndex> {
        let data = self.read_document(path)?;
        serde_json::from_slice(&data)
            .map_err(|e| self.source_failed(format!("invalid index {}: {}", path.display(), e)))
    }

    fn read_blob_document(&self, digest: &str) -> Result<Vec<u8>> {
        let path = self
            .blob_path(digest)
            .map_err(|e| self.source_failed(e.to_string()))?;
        self.read_document(&path)
    }

    /// Picks the top-level index entry named by the tag, or the only one.
    fn select_entry<'a>(&self, index: &'a OciImageIndex) -> Result<&'a ImageIndexEntry> {
        match &self.reference.tag {
            Some(tag) => index
                .manifests
                .iter()
                .find(|m| {
                    m.annotations
                        .as_ref()
                        .and_then(|a| a.get(OCI_REF_NAME_ANNOTATION))
                        .is_some_and(|name| name == tag)
                })
                .ok_or_else(|| self.source_failed(format!("tag '{}' not found in index", tag))),
            None => match index.manifests.as_slice() {
                [] => Err(self.source_failed("index lists no manifests".to_string())),
                [only] => Ok(only),
                _ => select_platform(index, &self.platform, &self.describe()),
            },
        }
    }
}

impl ImageSource for LayoutSource {
    fn describe(&self) -> String {
        self.reference.to_string()
    }

    fn get_manifest(&self) -> Result<Manifest> {
        let index = self.read_index(&self.reference.dir.join(OCI_LAYOUT_INDEX_FILE))?;
        let entry = self.select_entry(&index)?;
        let mut digest = entry.digest.clone();
        let mut platform = None;

        if is_index_media_type(&entry.media_type) {
            let nested: OciImageIndex =
                serde_json::from_slice(&self.read_blob_document(&digest)?).map_err(|e| {
                    self.source_failed(format!("invalid index {}: {}", digest, e))
                })?;

            let selected = select_platform(&nested, &self.platform, &self.describe())?;
            if is_index_media_type(&selected.media_type) {
                return Err(self.source_failed("nested image index not supported".to_string()));
            }
            digest = selected.digest.clone();
            platform = Some(self.platform.to_string());
        }

        let image: OciImageManifest =
            serde_json::from_slice(&self.read_blob_document(&digest)?).map_err(|e| {
                self.source_failed(format!("invalid manifest {}: {}", digest, e))
            })?;

        debug!("Manifest {} has {} layers", digest, image.layers.len());
        Ok(Manifest::from_image_manifest(image, Some(digest), platform))
    }

    fn get_blob(&self, layer: &LayerDescriptor) -> Result<BlobStream> {
        let fetch_failed = |reason: String| Error::BlobFetchFailed {
            digest: layer.digest.clone(),
            reason,
        };

        let path = self
            .blob_path(&layer.digest)
            .map_err(|e| fetch_failed(e.to_string()))?;
        let file = File::open(&path)
            .map_err(|e| fetch_failed(format!("failed to open {}: {}", path.display(), e)))?;

        Ok(Box::new(BufReader::new(file)))
    }
}

impl Drop for LayoutSource {
    fn drop(&mut self) {
        debug!("Closing layout source {}", self.reference);
    }
}
