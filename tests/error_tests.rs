//! Tests for error types.
//!
//! Validates display formatting and the mapping of every variant onto its
//! error kind.

use layerfs::{Error, ErrorKind, ImageLocation, LayerDescriptor};
use std::path::PathBuf;

// =============================================================================
// Resolution Errors
// =============================================================================

#[test]
fn test_invalid_location_display() {
    let err = Error::InvalidLocation {
        location: "::".to_string(),
        reason: "relative URL without a base".to_string(),
    };
    let msg = err.to_string();

    assert!(msg.contains("::"), "should include the location");
    assert!(msg.contains("relative URL"), "should include the reason");
    assert_eq!(err.kind(), ErrorKind::Resolution);
}

#[test]
fn test_unsupported_transport_display() {
    let err = Error::UnsupportedTransport {
        scheme: "ftp".to_string(),
    };

    assert_eq!(err.to_string(), "no transport registered for scheme 'ftp'");
    assert_eq!(err.kind(), ErrorKind::Resolution);
}

#[test]
fn test_invalid_reference_display() {
    let err = Error::InvalidReference {
        transport: "docker".to_string(),
        reference: "/busybox".to_string(),
        reason: "reference must start with //".to_string(),
    };
    let msg = err.to_string();

    assert!(msg.contains("docker"), "should name the transport");
    assert!(msg.contains("/busybox"), "should include the reference");
    assert_eq!(err.kind(), ErrorKind::Resolution);
}

#[test]
fn test_location_parse_errors_are_resolution_errors() {
    let too_long = "x".repeat(1000);
    for bad in ["", "no-scheme", too_long.as_str()] {
        let err = ImageLocation::parse(bad).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resolution, "input {:?}", bad);
    }
}

// =============================================================================
// Source Errors
// =============================================================================

#[test]
fn test_source_failed_display() {
    let err = Error::SourceFailed {
        reference: "docker://docker.io/library/busybox:latest".to_string(),
        reason: "manifest unknown".to_string(),
    };
    let msg = err.to_string();

    assert!(msg.contains("busybox"));
    assert!(msg.contains("manifest unknown"));
    assert_eq!(err.kind(), ErrorKind::Source);
}

#[test]
fn test_blob_fetch_failed_display() {
    let err = Error::BlobFetchFailed {
        digest: "sha256:abcd".to_string(),
        reason: "connection reset".to_string(),
    };

    assert!(err.to_string().contains("sha256:abcd"));
    assert_eq!(err.kind(), ErrorKind::BlobFetch);
}

#[test]
fn test_malformed_digest_from_descriptor() {
    let layer = LayerDescriptor::new("sha256abcd", 10, "application/vnd.oci.image.layer.v1.tar");

    let err = layer.identity().unwrap_err();

    assert_eq!(err.to_string(), "malformed layer digest 'sha256abcd'");
    assert_eq!(err.kind(), ErrorKind::MalformedDigest);
}

// =============================================================================
// Driver Errors
// =============================================================================

#[test]
fn test_layer_unpack_failed_display() {
    let err = Error::LayerUnpackFailed {
        id: "aaaa".to_string(),
        reason: "disk full".to_string(),
    };

    assert_eq!(err.to_string(), "failed to unpack layer aaaa: disk full");
    assert_eq!(err.kind(), ErrorKind::DriverUnpack);
}

#[test]
fn test_bundle_failed_display() {
    let err = Error::BundleFailed {
        id: "web".to_string(),
        reason: "layer ffff was never unpacked".to_string(),
    };

    assert!(err.to_string().contains("'web'"));
    assert_eq!(err.kind(), ErrorKind::DriverBundle);
}

// =============================================================================
// Other Errors
// =============================================================================

#[test]
fn test_storage_init_failed_display() {
    let err = Error::StorageInitFailed {
        path: PathBuf::from("/var/lib/layerfs"),
        reason: "permission denied".to_string(),
    };

    assert!(err.to_string().contains("/var/lib/layerfs"));
    assert_eq!(err.kind(), ErrorKind::Other);
}

#[test]
fn test_io_error_conversion() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: Error = io_err.into();

    assert!(matches!(err, Error::Io(_)));
    assert!(err.to_string().contains("gone"));
    assert_eq!(err.kind(), ErrorKind::Other);
}

#[test]
fn test_error_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Error>();
}
