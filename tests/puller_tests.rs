//! Tests for the end-to-end pull pipeline with pluggable transports.
//!
//! Validates resolution, the single manifest read, and that the image
//! source is released exactly once on every exit path.

mod common;

use common::{Call, FakeImage, FakeTransport, RecordingDriver};
use layerfs::{Error, ErrorKind, Puller, SourceContext, TransportRegistry};

fn puller_with(transport: FakeTransport, driver: RecordingDriver) -> Puller<RecordingDriver> {
    let mut transports = TransportRegistry::with_defaults();
    transports.register(Box::new(transport));
    Puller::with_transports(driver, transports, SourceContext::default())
}

// =============================================================================
// Resolution
// =============================================================================

#[test]
fn test_unsupported_scheme_fails_before_source_access() {
    let transport = FakeTransport::new(FakeImage::new().layer("sha256:aaaa", b"a"));
    let counters = transport.image.counters.clone();
    let parsed = transport.parsed.clone();
    let puller = puller_with(transport, RecordingDriver::new());

    let err = puller.pull_location("ftp://example.com/image", "x").unwrap_err();

    assert!(matches!(err, Error::UnsupportedTransport { ref scheme } if scheme == "ftp"));
    assert_eq!(err.kind(), ErrorKind::Resolution);
    assert_eq!(counters.opened(), 0);
    assert!(parsed.lock().unwrap().is_empty());
    assert!(puller.driver().calls().is_empty());
}

#[test]
fn test_invalid_location_is_a_resolution_error() {
    let puller = Puller::new(RecordingDriver::new(), SourceContext::default());

    let err = puller.pull_location("", "x").unwrap_err();

    assert!(matches!(err, Error::InvalidLocation { .. }));
    assert_eq!(err.kind(), ErrorKind::Resolution);
}

#[test]
fn test_transport_receives_root_relative_reference() {
    let transport = FakeTransport::new(FakeImage::new());
    let parsed = transport.parsed.clone();
    let puller = puller_with(transport, RecordingDriver::new());

    puller
        .pull_location("fake://registry.local:5000/team/app:1.0", "app")
        .unwrap();

    assert_eq!(
        *parsed.lock().unwrap(),
        vec!["//registry.local:5000/team/app:1.0".to_string()]
    );
}

#[test]
fn test_default_registry_rejects_bad_docker_reference() {
    let puller = Puller::new(RecordingDriver::new(), SourceContext::default());

    let err = puller.pull_location("docker://", "x").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Resolution);
}

// =============================================================================
// Pull Pipeline
// =============================================================================

#[test]
fn test_pull_unpacks_then_bundles() {
    let transport = FakeTransport::new(
        FakeImage::new()
            .layer("sha256:aaaa", b"s1")
            .layer("sha256:bbbb", b"s2"),
    );
    let counters = transport.image.counters.clone();
    let puller = puller_with(transport, RecordingDriver::new());

    let spec = puller.pull_location("fake:///app", "my-app").unwrap();

    assert_eq!(spec.root.path, "/bundles/my-app/rootfs");
    assert_eq!(
        puller.driver().calls().last(),
        Some(&Call::Bundle {
            id: "my-app".to_string(),
            parent_ids: vec!["aaaa".to_string(), "bbbb".to_string()],
        })
    );
    assert_eq!(counters.manifests_read.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn test_source_released_once_on_success() {
    let transport = FakeTransport::new(FakeImage::new().layer("sha256:aaaa", b"a"));
    let counters = transport.image.counters.clone();
    let puller = puller_with(transport, RecordingDriver::new());

    puller.pull_location("fake:///app", "app").unwrap();

    assert_eq!(counters.opened(), 1);
    assert_eq!(counters.released(), 1);
    assert_eq!(counters.live_streams(), 0);
}

#[test]
fn test_source_released_once_on_manifest_failure() {
    let transport = FakeTransport::new(FakeImage::new().failing_manifest());
    let counters = transport.image.counters.clone();
    let puller = puller_with(transport, RecordingDriver::new());

    let err = puller.pull_location("fake:///app", "app").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Source);
    assert_eq!(counters.opened(), 1);
    assert_eq!(counters.released(), 1);
    assert!(puller.driver().calls().is_empty());
}

#[test]
fn test_source_released_once_on_unpack_failure() {
    let transport = FakeTransport::new(
        FakeImage::new()
            .layer("sha256:aaaa", b"a")
            .layer("sha256:bbbb", b"b"),
    );
    let counters = transport.image.counters.clone();
    let puller = puller_with(transport, RecordingDriver::failing_on("aaaa"));

    let err = puller.pull_location("fake:///app", "app").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DriverUnpack);
    assert_eq!(counters.released(), 1);
    assert_eq!(counters.live_streams(), 0);
    assert!(
        !puller
            .driver()
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Bundle { .. })),
        "bundle must not be attempted after a failed unpack"
    );
}

#[test]
fn test_source_released_once_on_bundle_failure() {
    let transport = FakeTransport::new(FakeImage::new().layer("sha256:aaaa", b"a"));
    let counters = transport.image.counters.clone();
    let driver = RecordingDriver {
        fail_bundle: true,
        ..RecordingDriver::new()
    };
    let puller = puller_with(transport, driver);

    let err = puller.pull_location("fake:///app", "app").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DriverBundle);
    assert_eq!(counters.opened(), 1);
    assert_eq!(counters.released(), 1);
}

#[test]
fn test_too_many_layers_is_a_source_error() {
    let mut image = FakeImage::new();
    for i in 0..=layerfs::constants::MAX_LAYERS {
        image = image.layer(&format!("sha256:{:04x}", i), b"x");
    }
    let transport = FakeTransport::new(image);
    let counters = transport.image.counters.clone();
    let puller = puller_with(transport, RecordingDriver::new());

    let err = puller.pull_location("fake:///big", "big").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Source);
    assert!(puller.driver().calls().is_empty());
    assert_eq!(counters.released(), 1);
}
