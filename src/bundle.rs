//! OCI runtime bundle assembly.
//!
//! [`assemble`] hands the completed layer chain to the driver, which builds
//! the [`BundleSpec`] a runtime such as runc, crun or youki consumes as
//! `config.json`. The spec types mirror the subset of the OCI Runtime Spec
//! the drivers emit.

use crate::driver::Driver;
use crate::error::Result;
use crate::unpack::LayerChain;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Builds the bundle for image `image_id` from its unpacked chain.
///
/// # Errors
///
/// The driver's [`Error::BundleFailed`], unchanged.
///
/// [`Error::BundleFailed`]: crate::error::Error::BundleFailed
pub fn assemble<D: Driver + ?Sized>(
    driver: &D,
    image_id: &str,
    chain: &LayerChain,
) -> Result<BundleSpec> {
    let spec = driver.bundle(image_id, chain.as_slice())?;
    info!(
        "Assembled bundle {} from {} layers (root: {})",
        image_id,
        chain.len(),
        spec.root.path
    );
    Ok(spec)
}

// =============================================================================
// OCI Runtime Spec Types
// =============================================================================

/// OCI runtime spec produced for a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleSpec {
    pub oci_version: String,
    pub root: OciRoot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<OciProcess>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default)]
    pub mounts: Vec<OciMount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linux: Option<OciLinux>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// OCI root filesystem config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OciRoot {
    pub path: String,
    #[serde(default)]
    pub readonly: bool,
}

/// OCI process config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OciProcess {
    pub terminal: bool,
    pub user: OciUser,
    pub args: Vec<String>,
    pub env: Vec<String>,
    pub cwd: String,
}

/// OCI user config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OciUser {
    pub uid: u32,
    pub gid: u32,
}

/// OCI mount config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OciMount {
    pub destination: String,
    #[serde(rename = "type")]
    pub mount_type: String,
    pub source: String,
    #[serde(default)]
    pub options: Vec<String>,
}

/// OCI Linux-specific config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OciLinux {
    pub namespaces: Vec<OciNamespace>,
}

/// OCI namespace config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OciNamespace {
    #[serde(rename = "type")]
    pub ns_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}
