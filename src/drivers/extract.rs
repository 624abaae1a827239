//! Layer tar application with OCI whiteout semantics.
//!
//! Applies one layer blob (gzip or plain tar) onto a directory tree:
//! - `.wh.<name>` removes `<name>` from the lower tree
//! - `.wh..wh..opq` clears the directory's lower contents
//! - everything else is unpacked in place, overwriting lower entries

use crate::constants::{MAX_FILES_PER_LAYER, MAX_ROOTFS_SIZE, OPAQUE_WHITEOUT, WHITEOUT_PREFIX};
use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::collections::HashSet;
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Counts bytes read through it.
struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

/// Applies the layer in `blob` onto `rootfs` and drains the stream.
///
/// Returns the number of blob bytes consumed.
pub(crate) fn apply_layer(id: &str, blob: &mut dyn Read, rootfs: &Path) -> Result<u64> {
    let failed = |reason: String| Error::LayerUnpackFailed {
        id: id.to_string(),
        reason,
    };

    let root = fs::canonicalize(rootfs).map_err(|e| failed(e.to_string()))?;
    let mut counted = CountingReader {
        inner: blob,
        count: 0,
    };

    {
        let mut buffered = BufReader::new(&mut counted);
        let gzip = buffered
            .fill_buf()
            .map_err(|e| failed(e.to_string()))?
            .starts_with(&GZIP_MAGIC);

        if gzip {
            apply_tar(id, GzDecoder::new(&mut buffered), &root)?;
        } else {
            apply_tar(id, &mut buffered, &root)?;
        }

        // Trailing bytes after the archive still belong to the blob
        io::copy(&mut buffered, &mut io::sink()).map_err(|e| failed(e.to_string()))?;
    }

    Ok(counted.count)
}

fn apply_tar<R: Read>(id: &str, reader: R, root: &Path) -> Result<()> {
    let failed = |reason: String| Error::LayerUnpackFailed {
        id: id.to_string(),
        reason,
    };

    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);
    archive.set_unpack_xattrs(false);

    let mut files = 0usize;
    let mut total_size = 0u64;
    // Paths (and their ancestors) this layer has already written
    let mut written: HashSet<PathBuf> = HashSet::new();

    for entry in archive.entries().map_err(|e| failed(e.to_string()))? {
        let mut entry = entry.map_err(|e| failed(e.to_string()))?;
        let path = entry.path().map_err(|e| failed(e.to_string()))?.into_owned();

        // SECURITY: Reject absolute paths and parent components
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(failed(format!(
                "path traversal detected: {}",
                path.display()
            )));
        }

        files += 1;
        if files > MAX_FILES_PER_LAYER {
            return Err(failed(format!(
                "more than {} entries in layer",
                MAX_FILES_PER_LAYER
            )));
        }

        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let parent = path.parent().unwrap_or(Path::new(""));

        if file_name == OPAQUE_WHITEOUT {
            if let Some(dir) = resolve_inside(root, parent).map_err(failed)? {
                clear_lower(&dir, &normalize(parent), &written)
                    .map_err(|e| failed(e.to_string()))?;
            }
            continue;
        }

        if let Some(target_name) = file_name.strip_prefix(WHITEOUT_PREFIX) {
            // SECURITY: ".wh.." would otherwise remove the rootfs or its parent
            if matches!(target_name, "" | "." | "..") || target_name.contains('/') {
                return Err(failed(format!(
                    "path traversal detected: {}",
                    path.display()
                )));
            }
            if let Some(dir) = resolve_inside(root, parent).map_err(failed)? {
                remove_entry(&dir.join(target_name)).map_err(|e| failed(e.to_string()))?;
            }
            continue;
        }

        total_size += entry.size();
        if total_size > MAX_ROOTFS_SIZE {
            return Err(failed(format!(
                "layer exceeds size limit: {} > {} bytes",
                total_size, MAX_ROOTFS_SIZE
            )));
        }

        entry.unpack_in(root).map_err(|e| failed(e.to_string()))?;

        let relative = normalize(&path);
        written.extend(relative.ancestors().map(Path::to_path_buf));
    }

    debug!("Applied {} entries ({} bytes) from layer {}", files, total_size, id);

    let mut rest = archive.into_inner();
    io::copy(&mut rest, &mut io::sink()).map_err(|e| failed(e.to_string()))?;
    Ok(())
}

/// Resolves `relative` under `root`, following symlinks.
///
/// Returns `None` when the directory does not exist, and an error when a
/// symlink leads outside the tree.
fn resolve_inside(root: &Path, relative: &Path) -> std::result::Result<Option<PathBuf>, String> {
    match fs::canonicalize(root.join(relative)) {
        Ok(resolved) if resolved.starts_with(root) => Ok(Some(resolved)),
        Ok(resolved) => Err(format!(
            "whiteout escapes rootfs: {} -> {}",
            relative.display(),
            resolved.display()
        )),
        Err(_) => Ok(None),
    }
}

/// Removes a file, symlink or directory tree if present.
fn remove_entry(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Drops `.` components so tar paths compare equal however they are spelled.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

/// Removes the lower-layer contents of `dir`, keeping what this layer wrote.
///
/// `relative` is `dir` relative to the rootfs.
fn clear_lower(dir: &Path, relative: &Path, written: &HashSet<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let child = relative.join(entry.file_name());

        if !written.contains(&child) {
            remove_entry(&entry.path())?;
        } else if entry.file_type()?.is_dir() {
            clear_lower(&entry.path(), &child, written)?;
        }
    }
    Ok(())
}
