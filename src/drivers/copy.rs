//! # Tree-Copy Driver
//!
//! Materializes every layer as a complete, merged directory tree: a child
//! layer starts as a copy of its parent's tree and has its tar applied on
//! top. Bundles copy the top layer's tree into their own rootfs, so running
//! containers never write into layer storage.
//!
//! ## Store Layout
//!
//! ```text
//! <store>/
//! ├── layers/
//! │   ├── aaaa.../          base layer tree
//! │   └── bbbb.../          aaaa + layer bbbb
//! └── bundles/
//!     └── <bundle id>/
//!         ├── config.json
//!         └── rootfs/       copy of the top layer tree
//! ```
//!
//! ## Atomicity
//!
//! Layers and bundles are built in a temporary directory inside the store
//! and renamed into place once complete. A failed unpack leaves nothing
//! behind for that identity.
//!
//! This strategy trades disk space for simplicity; it needs no mount
//! privileges and works on any filesystem.

use super::extract::apply_layer;
use crate::bundle::{BundleSpec, OciLinux, OciMount, OciNamespace, OciProcess, OciRoot, OciUser};
use crate::constants::{
    BUNDLE_CONFIG_FILE, BUNDLE_DIR, LAYER_DIR, LAYERS_ANNOTATION, OCI_RUNTIME_SPEC_VERSION,
    ROOTFS_DIR,
};
use crate::driver::Driver;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Driver that stores each layer as a full copy of its merged tree.
#[derive(Debug, Clone)]
pub struct CopyDriver {
    /// Absolute store root.
    base_dir: PathBuf,
}

impl CopyDriver {
    /// Creates a driver rooted at `base_dir`, creating the store layout.
    ///
    /// # Errors
    ///
    /// [`Error::StorageInitFailed`] if the directories cannot be created.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        let init_failed = |e: io::Error| Error::StorageInitFailed {
            path: base_dir.clone(),
            reason: e.to_string(),
        };

        fs::create_dir_all(base_dir.join(LAYER_DIR)).map_err(init_failed)?;
        fs::create_dir_all(base_dir.join(BUNDLE_DIR)).map_err(init_failed)?;
        let base_dir = fs::canonicalize(&base_dir).map_err(init_failed)?;

        info!("Layer store initialized at: {}", base_dir.display());

        Ok(Self { base_dir })
    }

    /// Returns the store root.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Returns the directory holding layer `id`'s merged tree.
    pub fn layer_path(&self, id: &str) -> PathBuf {
        self.base_dir.join(LAYER_DIR).join(id)
    }

    /// Returns the directory of bundle `id`.
    pub fn bundle_path(&self, id: &str) -> PathBuf {
        self.base_dir.join(BUNDLE_DIR).join(id)
    }

    /// Checks whether layer `id` has been materialized.
    pub fn has_layer(&self, id: &str) -> bool {
        validate_id(id).is_ok() && self.layer_path(id).is_dir()
    }

    /// Creates a scratch directory next to the final location.
    fn scratch_dir(&self, area: &str) -> io::Result<TempDir> {
        tempfile::Builder::new()
            .prefix(".tmp-")
            .tempdir_in(self.base_dir.join(area))
    }

    /// Generates the runtime spec for a bundle rootfs.
    fn generate_spec(&self, rootfs: &Path, hostname: &str, parent_ids: &[String]) -> BundleSpec {
        let mut annotations = BTreeMap::new();
        annotations.insert(LAYERS_ANNOTATION.to_string(), parent_ids.join(","));

        BundleSpec {
            oci_version: OCI_RUNTIME_SPEC_VERSION.to_string(),
            root: OciRoot {
                path: rootfs.to_string_lossy().to_string(),
                readonly: false,
            },
            process: Some(OciProcess {
                terminal: false,
                user: OciUser { uid: 0, gid: 0 },
                args: vec!["/bin/sh".to_string()],
                env: vec![
                    "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin"
                        .to_string(),
                ],
                cwd: "/".to_string(),
            }),
            hostname: Some(hostname.to_string()),
            mounts: default_mounts(),
            linux: Some(OciLinux {
                namespaces: ["pid", "network", "ipc", "uts", "mount"]
                    .iter()
                    .map(|ns| OciNamespace {
                        ns_type: ns.to_string(),
                        path: None,
                    })
                    .collect(),
            }),
            annotations,
        }
    }
}

impl Driver for CopyDriver {
    fn unpack(&self, id: &str, parent_id: &str, blob: &mut dyn Read) -> Result<u64> {
        let failed = |reason: String| Error::LayerUnpackFailed {
            id: id.to_string(),
            reason,
        };

        validate_id(id).map_err(failed)?;
        if !parent_id.is_empty() && !self.has_layer(parent_id) {
            return Err(failed(format!(
                "parent layer {} is not materialized",
                parent_id
            )));
        }

        let scratch = self.scratch_dir(LAYER_DIR).map_err(|e| failed(e.to_string()))?;
        if parent_id.is_empty() {
            set_dir_mode(scratch.path(), 0o755).map_err(|e| failed(e.to_string()))?;
        } else {
            copy_tree(&self.layer_path(parent_id), scratch.path())
                .map_err(|e| failed(format!("failed to copy parent {}: {}", parent_id, e)))?;
        }

        let size = apply_layer(id, blob, scratch.path())?;

        let layer_dir = self.layer_path(id);
        if layer_dir.exists() {
            warn!("Replacing existing layer directory {}", layer_dir.display());
            fs::remove_dir_all(&layer_dir).map_err(|e| failed(e.to_string()))?;
        }
        fs::rename(scratch.path(), &layer_dir).map_err(|e| failed(e.to_string()))?;

        debug!(
            "Materialized layer {} at {} ({} bytes)",
            id,
            layer_dir.display(),
            size
        );
        Ok(size)
    }

    fn bundle(&self, id: &str, parent_ids: &[String]) -> Result<BundleSpec> {
        let failed = |reason: String| Error::BundleFailed {
            id: id.to_string(),
            reason,
        };

        validate_id(id).map_err(failed)?;
        if let Some(missing) = parent_ids.iter().find(|layer| !self.has_layer(layer)) {
            return Err(failed(format!("layer {} was never unpacked", missing)));
        }

        let scratch = self.scratch_dir(BUNDLE_DIR).map_err(|e| failed(e.to_string()))?;
        let scratch_rootfs = scratch.path().join(ROOTFS_DIR);
        fs::create_dir(&scratch_rootfs).map_err(|e| failed(e.to_string()))?;
        set_dir_mode(&scratch_rootfs, 0o755).map_err(|e| failed(e.to_string()))?;

        if let Some(top) = parent_ids.last() {
            copy_tree(&self.layer_path(top), &scratch_rootfs)
                .map_err(|e| failed(format!("failed to copy layer {}: {}", top, e)))?;
        }

        let bundle_dir = self.bundle_path(id);
        let spec = self.generate_spec(&bundle_dir.join(ROOTFS_DIR), id, parent_ids);
        let config_json = serde_json::to_string_pretty(&spec)
            .map_err(|e| failed(format!("failed to serialize config: {}", e)))?;
        fs::write(scratch.path().join(BUNDLE_CONFIG_FILE), config_json)
            .map_err(|e| failed(format!("failed to write config.json: {}", e)))?;

        if bundle_dir.exists() {
            warn!("Replacing existing bundle {}", bundle_dir.display());
            fs::remove_dir_all(&bundle_dir).map_err(|e| failed(e.to_string()))?;
        }
        fs::rename(scratch.path(), &bundle_dir).map_err(|e| failed(e.to_string()))?;
        set_dir_mode(&bundle_dir, 0o755).map_err(|e| failed(e.to_string()))?;

        info!("Built bundle: {}", bundle_dir.display());
        Ok(spec)
    }
}

/// Checks that an identity is usable as a single path component.
fn validate_id(id: &str) -> std::result::Result<(), String> {
    if id.is_empty() {
        return Err("empty identifier".to_string());
    }
    // SECURITY: identifiers become directory names under the store
    if id == "." || id == ".." || id.starts_with(".tmp-") || id.contains(['/', '\\', '\0']) {
        return Err(format!("invalid identifier '{}'", id));
    }
    Ok(())
}

/// Returns default OCI mounts.
fn default_mounts() -> Vec<OciMount> {
    let mount = |destination: &str, mount_type: &str, options: &[&str]| OciMount {
        destination: destination.to_string(),
        mount_type: mount_type.to_string(),
        source: mount_type.to_string(),
        options: options.iter().map(|o| o.to_string()).collect(),
    };

    vec![
        mount("/proc", "proc", &[]),
        mount("/dev", "tmpfs", &["nosuid", "strictatime", "mode=755"]),
        mount("/dev/pts", "devpts", &["nosuid", "noexec", "newinstance"]),
        mount("/sys", "sysfs", &["nosuid", "noexec", "nodev", "ro"]),
    ]
}

/// Recursively copies the contents of `src` into the existing directory `dst`,
/// preserving permissions and symlinks.
fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            fs::create_dir(&to)?;
            copy_tree(&from, &to)?;
        } else if file_type.is_file() {
            fs::copy(&from, &to)?;
        } else if file_type.is_symlink() {
            copy_symlink(&from, &to)?;
        } else {
            debug!("Skipping special file {}", from.display());
        }
    }

    // Directory modes last, so read-only directories can still be filled
    fs::set_permissions(dst, fs::metadata(src)?.permissions())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(from)?, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, _to: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot copy symlink {}", from.display()),
    ))
}

#[cfg(unix)]
fn set_dir_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_dir_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
