//! # Image Puller
//!
//! One call from an image location to a runtime bundle:
//!
//! ```text
//! "docker:///busybox"
//!     │  ImageLocation::parse
//!     ▼
//! ImageLocation ──TransportRegistry::resolve──► ImageReference
//!     │                                              │ Image::open (manifest read once)
//!     │                                              ▼
//!     │                                            Image ──unpack_layers──► LayerChain
//!     │                                                                       │ assemble
//!     ▼                                                                       ▼
//! Puller::pull ───────────────────────────────────────────────────────────► BundleSpec
//! ```
//!
//! The reference and the image source are dropped before `pull` returns,
//! whether it succeeds or fails.
//!
//! ## Example
//!
//! ```rust,ignore
//! use layerfs::{CopyDriver, Puller, SourceContext};
//!
//! let driver = CopyDriver::new("/var/lib/layerfs")?;
//! let puller = Puller::new(driver, SourceContext::default());
//! let spec = puller.pull_location("docker:///busybox:latest", "my-box")?;
//! println!("rootfs at {}", spec.root.path);
//! ```

use crate::bundle::{BundleSpec, assemble};
use crate::driver::Driver;
use crate::error::Result;
use crate::image::Image;
use crate::location::ImageLocation;
use crate::transport::{SourceContext, TransportRegistry};
use crate::unpack::unpack_layers;
use tracing::info;

/// Pulls images through a driver chosen at construction.
#[derive(Debug)]
pub struct Puller<D> {
    driver: D,
    transports: TransportRegistry,
    context: SourceContext,
}

impl<D: Driver> Puller<D> {
    /// Creates a puller with the default transports.
    pub fn new(driver: D, context: SourceContext) -> Self {
        Self::with_transports(driver, TransportRegistry::with_defaults(), context)
    }

    /// Creates a puller with a custom transport registry.
    pub fn with_transports(driver: D, transports: TransportRegistry, context: SourceContext) -> Self {
        Self {
            driver,
            transports,
            context,
        }
    }

    /// Returns the driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Returns the source options used for every pull.
    pub fn context(&self) -> &SourceContext {
        &self.context
    }

    /// Parses `location` and pulls it as bundle `id`.
    pub fn pull_location(&self, location: &str, id: &str) -> Result<BundleSpec> {
        self.pull(&ImageLocation::parse(location)?, id)
    }

    /// Pulls the image at `location` and assembles bundle `id`.
    ///
    /// # Errors
    ///
    /// The first error of any stage, unchanged:
    /// resolution, source, malformed digest, blob fetch, driver unpack or
    /// driver bundle.
    pub fn pull(&self, location: &ImageLocation, id: &str) -> Result<BundleSpec> {
        info!("Pulling {} as {}", location, id);

        let reference = self.transports.resolve(location)?;
        let image = Image::open(reference.as_ref(), &self.context)?;
        let chain = unpack_layers(&self.driver, image.source(), image.layers())?;
        drop(image);

        assemble(&self.driver, id, &chain)
    }
}
