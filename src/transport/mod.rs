//! # Transports, References and Image Sources
//!
//! Resolution turns an [`ImageLocation`] into a transport-bound
//! [`ImageReference`]; opening a reference yields an [`ImageSource`] that
//! serves the manifest and the layer blobs.
//!
//! ```text
//! ImageLocation ──TransportRegistry::resolve──► Box<dyn ImageReference>
//!                                                   │ new_image_source(ctx)
//!                                                   ▼
//!                                            Box<dyn ImageSource>
//!                                            ├── get_manifest()
//!                                            └── get_blob(layer) → stream
//! ```
//!
//! ## Registered Transports
//!
//! | Scheme   | Transport            | Backing store                 |
//! |----------|----------------------|-------------------------------|
//! | `docker` | [`RegistryTransport`]| OCI distribution registry     |
//! | `oci`    | [`LayoutTransport`]  | OCI image layout directory    |
//!
//! ## Resource Release
//!
//! References, sources and blob streams release whatever they hold when
//! dropped. Callers scope them so release happens on every exit path.

mod docker;
mod layout;

pub use docker::RegistryTransport;
pub use layout::LayoutTransport;

use crate::constants::IMAGE_PULL_TIMEOUT;
use crate::error::{Error, Result};
use crate::location::ImageLocation;
use crate::manifest::{LayerDescriptor, Manifest};
use crate::platform::Platform;
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::time::Duration;
use tracing::debug;

/// A readable layer blob.
pub type BlobStream = Box<dyn Read + Send>;

/// Options that influence how a source is opened.
#[derive(Debug, Clone)]
pub struct SourceContext {
    /// Accept invalid TLS certificates from registries.
    pub insecure_skip_tls_verify: bool,
    /// Platform used to resolve image indexes.
    pub platform: Platform,
    /// Per-request timeout for network transports.
    pub timeout: Duration,
}

impl Default for SourceContext {
    fn default() -> Self {
        Self {
            insecure_skip_tls_verify: false,
            platform: Platform::detect(),
            timeout: IMAGE_PULL_TIMEOUT,
        }
    }
}

/// A strategy for one location scheme.
pub trait Transport: Send + Sync {
    /// Scheme this transport is registered under.
    fn name(&self) -> &'static str;

    /// Parses a root-relative reference string. Performs no I/O.
    fn parse_reference(&self, reference: &str) -> Result<Box<dyn ImageReference>>;
}

/// An openable, transport-bound image reference.
pub trait ImageReference: fmt::Display + Send + Sync {
    /// Name of the transport that produced this reference.
    fn transport_name(&self) -> &'static str;

    /// Opens a source for reading the image.
    fn new_image_source(&self, ctx: &SourceContext) -> Result<Box<dyn ImageSource>>;
}

/// An open image: manifest plus blob access.
pub trait ImageSource: Send {
    /// Human-readable description of what this source reads, for errors.
    fn describe(&self) -> String;

    /// Fetches and parses the manifest, resolved to a single platform.
    fn get_manifest(&self) -> Result<Manifest>;

    /// Opens a stream over one layer blob.
    ///
    /// The stream must be dropped before the next blob is requested.
    fn get_blob(&self, layer: &LayerDescriptor) -> Result<BlobStream>;
}

/// Scheme → transport table used to resolve locations.
pub struct TransportRegistry {
    transports: HashMap<&'static str, Box<dyn Transport>>,
}

impl TransportRegistry {
    /// Creates an empty registry.
    pub fn empty() -> Self {
        Self {
            transports: HashMap::new(),
        }
    }

    /// Creates a registry with the `docker` and `oci` transports.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(RegistryTransport));
        registry.register(Box::new(LayoutTransport));
        registry
    }

    /// Registers a transport, replacing any previous one with the same name.
    pub fn register(&mut self, transport: Box<dyn Transport>) {
        self.transports.insert(transport.name(), transport);
    }

    /// Looks up the transport for a scheme.
    pub fn get(&self, scheme: &str) -> Option<&dyn Transport> {
        self.transports.get(scheme).map(|t| t.as_ref())
    }

    /// Returns the registered scheme names, sorted.
    pub fn schemes(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.transports.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Resolves a location to a reference.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedTransport`] when no transport handles the scheme
    /// - [`Error::InvalidReference`] when the transport rejects the reference
    pub fn resolve(&self, location: &ImageLocation) -> Result<Box<dyn ImageReference>> {
        let transport = self
            .get(location.scheme())
            .ok_or_else(|| Error::UnsupportedTransport {
                scheme: location.scheme().to_string(),
            })?;

        let reference = transport.parse_reference(&location.reference_string())?;
        debug!("Resolved {} to {} reference {}", location, transport.name(), reference);
        Ok(reference)
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}
