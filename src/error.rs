//! Error types for image pulling and layer unpacking.
//!
//! Every failure aborts the current pull and reaches the caller unchanged.
//! [`Error::kind`] groups the variants into the categories callers usually
//! branch on (bad location, source trouble, a broken layer, a failing driver).

use std::path::PathBuf;

/// Result type alias for pull operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The location could not be turned into an openable reference.
    Resolution,
    /// The image source could not be opened or its manifest read.
    Source,
    /// A layer blob stream could not be acquired.
    BlobFetch,
    /// A layer digest lacks the `algorithm:hex` form.
    MalformedDigest,
    /// The storage driver failed to materialize a layer.
    DriverUnpack,
    /// The storage driver failed to produce a bundle.
    DriverBundle,
    /// Local I/O outside the pull pipeline.
    Other,
}

/// Errors that can occur while pulling and unpacking an image.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Resolution Errors
    // =========================================================================
    /// Location string could not be parsed.
    #[error("invalid image location '{location}': {reason}")]
    InvalidLocation { location: String, reason: String },

    /// No transport is registered for the location's scheme.
    #[error("no transport registered for scheme '{scheme}'")]
    UnsupportedTransport { scheme: String },

    /// The transport rejected the reference string.
    #[error("invalid {transport} reference '{reference}': {reason}")]
    InvalidReference {
        transport: String,
        reference: String,
        reason: String,
    },

    // =========================================================================
    // Source Errors
    // =========================================================================
    /// Opening the source or reading its manifest failed.
    #[error("failed to read image '{reference}': {reason}")]
    SourceFailed { reference: String, reason: String },

    /// Acquiring a layer blob stream failed.
    #[error("failed to fetch blob {digest}: {reason}")]
    BlobFetchFailed { digest: String, reason: String },

    /// Digest has no `algorithm:hex` separator or an invalid hex part.
    #[error("malformed layer digest '{digest}'")]
    MalformedDigest { digest: String },

    // =========================================================================
    // Driver Errors
    // =========================================================================
    /// The driver could not unpack a layer.
    #[error("failed to unpack layer {id}: {reason}")]
    LayerUnpackFailed { id: String, reason: String },

    /// The driver could not assemble a bundle.
    #[error("failed to build bundle '{id}': {reason}")]
    BundleFailed { id: String, reason: String },

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Store directory could not be created.
    #[error("failed to initialize storage at {path}: {reason}")]
    StorageInitFailed { path: PathBuf, reason: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidLocation { .. }
            | Self::UnsupportedTransport { .. }
            | Self::InvalidReference { .. } => ErrorKind::Resolution,
            Self::SourceFailed { .. } => ErrorKind::Source,
            Self::BlobFetchFailed { .. } => ErrorKind::BlobFetch,
            Self::MalformedDigest { .. } => ErrorKind::MalformedDigest,
            Self::LayerUnpackFailed { .. } => ErrorKind::DriverUnpack,
            Self::BundleFailed { .. } => ErrorKind::DriverBundle,
            Self::StorageInitFailed { .. } | Self::Io(_) => ErrorKind::Other,
        }
    }
}
