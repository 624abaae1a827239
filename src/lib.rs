//! # layerfs
//!
//! **Pull container images and unpack them into runtime bundles.**
//!
//! The crate walks an image's ordered layer list, streams every layer to a
//! pluggable storage [`Driver`] while threading a parent chain of layer
//! identities, and finally has the driver assemble an OCI runtime bundle
//! from the completed chain.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              layerfs                                │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  Puller::pull(location, id)                                         │
//! │                                                                     │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌─────────────────┐  │
//! │  │ TransportRegistry│──►│      Image       │──►│  unpack_layers  │  │
//! │  │ docker:// oci:// │   │ manifest (once)  │   │ id, parent, blob│  │
//! │  └──────────────────┘   └──────────────────┘   └────────┬────────┘  │
//! │                                                         │           │
//! │                                   LayerChain [a, b, c]  ▼           │
//! │                                                ┌─────────────────┐  │
//! │                                                │    assemble     │  │
//! │                                                └────────┬────────┘  │
//! ├─────────────────────────────────────────────────────────┼───────────┤
//! │  Driver: unpack(id, parent, blob) · bundle(id, chain)   ▼           │
//! │  CopyDriver: <store>/layers/<id>  <store>/bundles/<id> BundleSpec   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Ordering
//!
//! Layers are unpacked strictly in manifest order, one at a time: layer
//! `i`'s parent is always layer `i - 1`, and the base layer's parent is the
//! empty identity. Drivers may rely on the parent being fully materialized.
//!
//! # Failure Model
//!
//! The first error aborts the pull and is returned unchanged; there is no
//! partial result and no rollback of layers already unpacked. See
//! [`Error::kind`] for the error categories.
//!
//! # Example
//!
//! ```rust,ignore
//! use layerfs::{CopyDriver, Puller, SourceContext};
//!
//! let driver = CopyDriver::new("/var/lib/layerfs")?;
//! let puller = Puller::new(driver, SourceContext::default());
//! let spec = puller.pull_location("oci:///var/images/alpine:3.19", "alpine")?;
//! println!("{}", serde_json::to_string_pretty(&spec)?);
//! ```

pub mod bundle;
pub mod constants;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod image;
pub mod location;
pub mod manifest;
pub mod platform;
pub mod puller;
pub mod transport;
pub mod unpack;

// Re-exports
pub use bundle::{BundleSpec, assemble};
pub use driver::Driver;
pub use drivers::CopyDriver;
pub use error::{Error, ErrorKind, Result};
pub use image::Image;
pub use location::ImageLocation;
pub use manifest::{LayerDescriptor, Manifest};
pub use platform::{Arch, Os, Platform};
pub use puller::Puller;
pub use transport::{
    BlobStream, ImageReference, ImageSource, SourceContext, Transport, TransportRegistry,
};
pub use unpack::{LayerChain, ROOT_PARENT, unpack_layers};
