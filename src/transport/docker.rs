//! # Registry Transport (`docker://`)
//!
//! Reads images from OCI distribution registries through `oci-distribution`.
//!
//! ## Reference Format
//!
//! The reference string must start with `//`; the remainder is a regular
//! image reference (`[registry[:port]/]repository[:tag|@digest]`), with
//! Docker Hub and `latest` as defaults:
//!
//! | Location                               | Resolved                               |
//! |----------------------------------------|----------------------------------------|
//! | `docker:///busybox`                    | `docker.io/library/busybox:latest`     |
//! | `docker://localhost:5000/team/app:1.0` | `localhost:5000/team/app:1.0`          |
//!
//! ## Blocking Model
//!
//! Each source owns a current-thread `tokio` runtime and blocks on one
//! registry request at a time, bounded by [`SourceContext::timeout`]. Blobs
//! are spooled into an anonymous temporary file and handed out as a plain
//! reader, so a layer is never held in memory.
//!
//! Pulls are anonymous; registry authentication is not supported.

use super::{BlobStream, ImageReference, ImageSource, SourceContext, Transport};
use crate::error::{Error, Result};
use crate::manifest::{LayerDescriptor, Manifest, select_platform};
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::manifest::{OciDescriptor, OciManifest};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Client, Reference};
use std::fmt;
use std::io::{BufReader, Seek, SeekFrom};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::runtime::Runtime;
use tracing::{debug, info};

const TRANSPORT_NAME: &str = "docker";

/// Transport for remote registries.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryTransport;

impl Transport for RegistryTransport {
    fn name(&self) -> &'static str {
        TRANSPORT_NAME
    }

    fn parse_reference(&self, reference: &str) -> Result<Box<dyn ImageReference>> {
        let invalid = |reason: &str| Error::InvalidReference {
            transport: TRANSPORT_NAME.to_string(),
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        let name = reference
            .strip_prefix("//")
            .ok_or_else(|| invalid("reference must start with //"))?;

        if name.is_empty() {
            return Err(invalid("empty image name"));
        }

        // SECURITY: Character allowlist before handing off to the parser
        if !name.chars().all(|c| {
            c.is_ascii_alphanumeric()
                || c == '/'
                || c == ':'
                || c == '.'
                || c == '-'
                || c == '_'
                || c == '@'
        }) {
            return Err(invalid("contains invalid characters"));
        }

        let parsed: Reference = name
            .parse()
            .map_err(|e| invalid(&format!("{}", e)))?;

        Ok(Box::new(RegistryReference { reference: parsed }))
    }
}

/// A parsed registry reference.
#[derive(Debug, Clone)]
struct RegistryReference {
    reference: Reference,
}

impl fmt::Display for RegistryReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", TRANSPORT_NAME, self.reference.whole())
    }
}

impl ImageReference for RegistryReference {
    fn transport_name(&self) -> &'static str {
        TRANSPORT_NAME
    }

    fn new_image_source(&self, ctx: &SourceContext) -> Result<Box<dyn ImageSource>> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::SourceFailed {
                reference: self.to_string(),
                reason: format!("failed to start I/O runtime: {}", e),
            })?;

        let client = Client::new(ClientConfig {
            protocol: ClientProtocol::Https,
            accept_invalid_certificates: ctx.insecure_skip_tls_verify,
            ..Default::default()
        });

        info!("Opened registry source {}", self);

        Ok(Box::new(RegistrySource {
            client,
            reference: self.reference.clone(),
            auth: RegistryAuth::Anonymous,
            runtime,
            platform: ctx.platform.clone(),
            timeout: ctx.timeout,
        }))
    }
}

/// An open registry image.
struct RegistrySource {
    client: Client,
    reference: Reference,
    auth: RegistryAuth,
    runtime: Runtime,
    platform: crate::platform::Platform,
    timeout: Duration,
}

impl RegistrySource {
    fn source_failed(&self, reason: String) -> Error {
        Error::SourceFailed {
            reference: self.describe(),
            reason,
        }
    }

    /// Pulls one manifest document with the request timeout applied.
    fn pull_manifest(&self, reference: &Reference) -> Result<(OciManifest, String)> {
        self.runtime
            .block_on(async {
                tokio::time::timeout(self.timeout, self.client.pull_manifest(reference, &self.auth))
                    .await
            })
            .map_err(|_| {
                self.source_failed(format!(
                    "timed out after {:?} pulling manifest {}",
                    self.timeout,
                    reference.whole()
                ))
            })?
            .map_err(|e| self.source_failed(e.to_string()))
    }
}

impl ImageSource for RegistrySource {
    fn describe(&self) -> String {
        format!("{}://{}", TRANSPORT_NAME, self.reference.whole())
    }

    fn get_manifest(&self) -> Result<Manifest> {
        let (manifest, digest) = self.pull_manifest(&self.reference)?;

        match manifest {
            OciManifest::Image(image) => {
                debug!("Manifest {} has {} layers", digest, image.layers.len());
                Ok(Manifest::from_image_manifest(image, Some(digest), None))
            }

            OciManifest::ImageIndex(index) => {
                let entry = select_platform(&index, &self.platform, &self.describe())?;

                // Pull the platform-specific manifest by digest
                let digest_ref_str = format!(
                    "{}/{}@{}",
                    self.reference.registry(),
                    self.reference.repository(),
                    entry.digest
                );
                let platform_ref: Reference = digest_ref_str.parse().map_err(|e| {
                    self.source_failed(format!("failed to build digest reference: {}", e))
                })?;

                let (platform_manifest, platform_digest) = self.pull_manifest(&platform_ref)?;
                match platform_manifest {
                    OciManifest::Image(image) => {
                        debug!(
                            "Resolved index to {} for {} ({} layers)",
                            platform_digest,
                            self.platform,
                            image.layers.len()
                        );
                        Ok(Manifest::from_image_manifest(
                            image,
                            Some(platform_digest),
                            Some(self.platform.to_string()),
                        ))
                    }
                    OciManifest::ImageIndex(_) => {
                        Err(self.source_failed("nested image index not supported".to_string()))
                    }
                }
            }
        }
    }

    fn get_blob(&self, layer: &LayerDescriptor) -> Result<BlobStream> {
        let fetch_failed = |reason: String| Error::BlobFetchFailed {
            digest: layer.digest.clone(),
            reason,
        };

        let spool = tempfile::tempfile()
            .map_err(|e| fetch_failed(format!("failed to create spool file: {}", e)))?;
        let descriptor = OciDescriptor::from(layer);

        debug!("Pulling blob {} ({} bytes)", layer.digest, layer.size);

        let mut spool = self
            .runtime
            .block_on(async {
                let mut file = tokio::fs::File::from_std(spool);
                tokio::time::timeout(
                    self.timeout,
                    self.client.pull_blob(&self.reference, &descriptor, &mut file),
                )
                .await
                .map_err(|_| format!("timed out after {:?}", self.timeout))?
                .map_err(|e| e.to_string())?;
                file.flush().await.map_err(|e| e.to_string())?;
                Ok::<_, String>(file.into_std().await)
            })
            .map_err(fetch_failed)?;

        spool
            .seek(SeekFrom::Start(0))
            .map_err(|e| fetch_failed(format!("failed to rewind spool file: {}", e)))?;

        Ok(Box::new(BufReader::new(spool)))
    }
}

impl Drop for RegistrySource {
    fn drop(&mut self) {
        debug!("Closing registry source {}", self.describe());
    }
}
