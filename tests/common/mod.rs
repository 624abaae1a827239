//! Shared fixtures for integration tests.
//!
//! - [`FakeImage`] / [`FakeTransport`]: an in-memory image source that counts
//!   opened sources and live blob streams
//! - [`RecordingDriver`]: a driver that records every call it receives
//! - layer tar builders for the copy driver tests

#![allow(dead_code)]

use layerfs::bundle::{BundleSpec, OciRoot};
use layerfs::constants::{OCI_LAYER_MEDIA_TYPE_TAR, OCI_RUNTIME_SPEC_VERSION};
use layerfs::{
    BlobStream, Driver, Error, ImageReference, ImageSource, LayerDescriptor, Manifest, Result,
    SourceContext, Transport,
};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// =============================================================================
// Fake Image Source
// =============================================================================

/// Counters shared between a fake image and everything opened from it.
#[derive(Debug, Default)]
pub struct Counters {
    pub sources_opened: AtomicUsize,
    pub sources_released: AtomicUsize,
    pub manifests_read: AtomicUsize,
    pub streams_live: AtomicUsize,
    pub streams_max_live: AtomicUsize,
    pub blobs_fetched: Mutex<Vec<String>>,
}

impl Counters {
    pub fn opened(&self) -> usize {
        self.sources_opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.sources_released.load(Ordering::SeqCst)
    }

    pub fn live_streams(&self) -> usize {
        self.streams_live.load(Ordering::SeqCst)
    }

    pub fn max_live_streams(&self) -> usize {
        self.streams_max_live.load(Ordering::SeqCst)
    }

    pub fn fetched(&self) -> Vec<String> {
        self.blobs_fetched.lock().unwrap().clone()
    }
}

/// An image held in memory: layer list plus blob contents by digest.
#[derive(Debug, Default)]
pub struct FakeImage {
    pub layers: Vec<LayerDescriptor>,
    pub blobs: HashMap<String, Vec<u8>>,
    pub fail_manifest: bool,
    pub counters: Arc<Counters>,
}

impl FakeImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a layer whose blob is `data`.
    pub fn layer(mut self, digest: &str, data: &[u8]) -> Self {
        self.layers.push(tar_layer(digest, data.len() as u64));
        self.blobs.insert(digest.to_string(), data.to_vec());
        self
    }

    /// Adds a layer with no blob behind it.
    pub fn missing_layer(mut self, digest: &str) -> Self {
        self.layers.push(tar_layer(digest, 0));
        self
    }

    pub fn failing_manifest(mut self) -> Self {
        self.fail_manifest = true;
        self
    }
}

/// Opens a source onto a shared fake image.
pub fn open_fake(image: &Arc<FakeImage>) -> FakeSource {
    image.counters.sources_opened.fetch_add(1, Ordering::SeqCst);
    FakeSource {
        image: Arc::clone(image),
    }
}

pub fn tar_layer(digest: &str, size: u64) -> LayerDescriptor {
    LayerDescriptor::new(digest, size, OCI_LAYER_MEDIA_TYPE_TAR)
}

/// Open handle onto a [`FakeImage`].
pub struct FakeSource {
    image: Arc<FakeImage>,
}

impl ImageSource for FakeSource {
    fn describe(&self) -> String {
        "fake:image".to_string()
    }

    fn get_manifest(&self) -> Result<Manifest> {
        self.image
            .counters
            .manifests_read
            .fetch_add(1, Ordering::SeqCst);

        if self.image.fail_manifest {
            return Err(Error::SourceFailed {
                reference: self.describe(),
                reason: "manifest unavailable".to_string(),
            });
        }
        Ok(Manifest {
            layers: self.image.layers.clone(),
            ..Manifest::default()
        })
    }

    fn get_blob(&self, layer: &LayerDescriptor) -> Result<BlobStream> {
        let counters = &self.image.counters;
        counters
            .blobs_fetched
            .lock()
            .unwrap()
            .push(layer.digest.clone());

        let data = self
            .image
            .blobs
            .get(&layer.digest)
            .ok_or_else(|| Error::BlobFetchFailed {
                digest: layer.digest.clone(),
                reason: "blob not found".to_string(),
            })?;

        let live = counters.streams_live.fetch_add(1, Ordering::SeqCst) + 1;
        counters.streams_max_live.fetch_max(live, Ordering::SeqCst);

        Ok(Box::new(TrackedStream {
            data: Cursor::new(data.clone()),
            counters: Arc::clone(counters),
        }))
    }
}

impl Drop for FakeSource {
    fn drop(&mut self) {
        self.image
            .counters
            .sources_released
            .fetch_add(1, Ordering::SeqCst);
    }
}

/// Blob stream that keeps the live-stream count accurate.
struct TrackedStream {
    data: Cursor<Vec<u8>>,
    counters: Arc<Counters>,
}

impl Read for TrackedStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.data.read(buf)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.counters.streams_live.fetch_sub(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Fake Transport
// =============================================================================

/// Transport under the `fake` scheme serving one in-memory image.
pub struct FakeTransport {
    pub image: Arc<FakeImage>,
    pub parsed: Arc<Mutex<Vec<String>>>,
}

impl FakeTransport {
    pub fn new(image: FakeImage) -> Self {
        Self {
            image: Arc::new(image),
            parsed: Arc::default(),
        }
    }
}

impl Transport for FakeTransport {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn parse_reference(&self, reference: &str) -> Result<Box<dyn ImageReference>> {
        self.parsed.lock().unwrap().push(reference.to_string());
        Ok(Box::new(FakeReference {
            reference: reference.to_string(),
            image: Arc::clone(&self.image),
        }))
    }
}

struct FakeReference {
    reference: String,
    image: Arc<FakeImage>,
}

impl fmt::Display for FakeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fake:{}", self.reference)
    }
}

impl ImageReference for FakeReference {
    fn transport_name(&self) -> &'static str {
        "fake"
    }

    fn new_image_source(&self, _ctx: &SourceContext) -> Result<Box<dyn ImageSource>> {
        Ok(Box::new(open_fake(&self.image)))
    }
}

// =============================================================================
// Recording Driver
// =============================================================================

/// One call observed by [`RecordingDriver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Unpack {
        id: String,
        parent: String,
        data: Vec<u8>,
    },
    Bundle {
        id: String,
        parent_ids: Vec<String>,
    },
}

/// Driver that records calls and optionally fails on one identity.
#[derive(Debug, Default)]
pub struct RecordingDriver {
    pub calls: RefCell<Vec<Call>>,
    pub fail_unpack: Option<String>,
    pub fail_bundle: bool,
    pub watch: Option<Arc<Counters>>,
    pub live_during_unpack: RefCell<Vec<usize>>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(id: &str) -> Self {
        Self {
            fail_unpack: Some(id.to_string()),
            ..Self::default()
        }
    }

    /// Records the live stream count of `counters` on every unpack.
    pub fn watching(mut self, counters: &Arc<Counters>) -> Self {
        self.watch = Some(Arc::clone(counters));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn unpacked(&self) -> Vec<(String, String)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                Call::Unpack { id, parent, .. } => Some((id.clone(), parent.clone())),
                Call::Bundle { .. } => None,
            })
            .collect()
    }
}

impl Driver for RecordingDriver {
    fn unpack(&self, id: &str, parent_id: &str, blob: &mut dyn Read) -> Result<u64> {
        if let Some(counters) = &self.watch {
            self.live_during_unpack
                .borrow_mut()
                .push(counters.live_streams());
        }

        let mut data = Vec::new();
        blob.read_to_end(&mut data)?;
        self.calls.borrow_mut().push(Call::Unpack {
            id: id.to_string(),
            parent: parent_id.to_string(),
            data: data.clone(),
        });

        if self.fail_unpack.as_deref() == Some(id) {
            return Err(Error::LayerUnpackFailed {
                id: id.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(data.len() as u64)
    }

    fn bundle(&self, id: &str, parent_ids: &[String]) -> Result<BundleSpec> {
        self.calls.borrow_mut().push(Call::Bundle {
            id: id.to_string(),
            parent_ids: parent_ids.to_vec(),
        });

        if self.fail_bundle {
            return Err(Error::BundleFailed {
                id: id.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(BundleSpec {
            oci_version: OCI_RUNTIME_SPEC_VERSION.to_string(),
            root: OciRoot {
                path: format!("/bundles/{}/rootfs", id),
                readonly: false,
            },
            process: None,
            hostname: None,
            mounts: Vec::new(),
            linux: None,
            annotations: BTreeMap::new(),
        })
    }
}

// =============================================================================
// Layer Tarballs
// =============================================================================

/// Entry in a test layer.
pub enum Entry<'a> {
    File(&'a str, &'a [u8]),
    Dir(&'a str),
    Symlink(&'a str, &'a str),
}

/// Builds an uncompressed layer tar.
pub fn layer_tar(entries: &[Entry<'_>]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for entry in entries {
        let mut header = tar::Header::new_gnu();
        match entry {
            Entry::File(path, data) => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_size(data.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append_data(&mut header, path, *data).unwrap();
            }
            Entry::Dir(path) => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_size(0);
                header.set_mode(0o755);
                header.set_cksum();
                builder.append_data(&mut header, path, std::io::empty()).unwrap();
            }
            Entry::Symlink(path, target) => {
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_size(0);
                header.set_mode(0o777);
                builder.append_link(&mut header, path, target).unwrap();
            }
        }
    }
    builder.into_inner().unwrap()
}

/// Builds a gzip-compressed layer tar.
pub fn layer_tar_gz(entries: &[Entry<'_>]) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&layer_tar(entries)).unwrap();
    encoder.finish().unwrap()
}

/// Builds a tar whose single entry path escapes the archive root.
///
/// `tar::Builder` refuses such paths, so the name is written into the
/// header bytes directly.
pub fn traversal_tar(path: &str) -> Vec<u8> {
    let mut header = tar::Header::new_gnu();
    {
        let name = &mut header.as_old_mut().name;
        name[..path.len()].copy_from_slice(path.as_bytes());
    }
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(4);
    header.set_mode(0o644);
    header.set_cksum();

    let mut data = Vec::new();
    data.extend_from_slice(header.as_bytes());
    let mut block = [0u8; 512];
    block[..4].copy_from_slice(b"evil");
    data.extend_from_slice(&block);
    data.extend_from_slice(&[0u8; 1024]);
    data
}
