// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Expand a snapshot archive under a root directory.
//!
//! Unpacking is idempotent: regular files are overwritten and symlinks recreated, but entries
//! already present under the root and absent from the archive are left alone.

use crate::SnapshotError;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Unpack `archive` under `root`, returning the number of entries written.
///
/// # Errors
///
/// Returns [`SnapshotError::Archive`] if the archive can not be read or an entry can not be
/// written.
pub fn unpack(archive: &Path, root: &Path) -> Result<usize, SnapshotError> {
    let file = File::open(archive).map_err(SnapshotError::archive(archive))?;
    let written = unpack_from(file, root).map_err(SnapshotError::archive(archive))?;
    debug!(
        archive = %archive.display(),
        root = %root.display(),
        entries = written,
        "archive unpacked"
    );
    Ok(written)
}

/// Unpack a gzip compressed tar stream under `root`.
///
/// # Errors
///
/// Propagates any I/O error from decoding the stream or writing entries.
pub fn unpack_from<R: Read>(reader: R, root: &Path) -> std::io::Result<usize> {
    fs::create_dir_all(root)?;
    let canonical_root = root.canonicalize()?;
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    archive.set_overwrite(true);
    archive.set_preserve_permissions(false);
    let mut written = 0;
    for entry in archive.entries()? {
        let mut entry = entry?;
        let relative = entry.path()?.into_owned();
        let Some(target) = contained(root, &canonical_root, &relative) else {
            warn!(path = %relative.display(), "archive entry escapes the unpack root, skipped");
            continue;
        };
        if entry.header().entry_type().is_symlink()
            && target
                .symlink_metadata()
                .is_ok_and(|meta| !meta.file_type().is_dir())
        {
            fs::remove_file(&target)?;
        }
        if entry.unpack_in(root)? {
            written += 1;
        } else {
            warn!(path = %relative.display(), "archive entry escapes the unpack root, skipped");
        }
    }
    Ok(written)
}

/// Where `relative` lands under `root`, or `None` if it would land outside of it.
///
/// The parent of the target is resolved through the links already unpacked; a parent which does
/// not exist yet is judged by its closest existing ancestor.
fn contained(root: &Path, canonical_root: &Path, relative: &Path) -> Option<PathBuf> {
    let mut target = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => return None,
        }
    }
    if target == root {
        return Some(target);
    }
    let mut dir = target.parent();
    while let Some(ancestor) = dir {
        if let Ok(resolved) = ancestor.canonicalize() {
            return resolved.starts_with(canonical_root).then_some(target);
        }
        dir = ancestor.parent();
    }
    None
}

/// Unpack `archive` under `root` only if `root` is missing or empty.
///
/// Returns `false` (and leaves `root` untouched) if it already has content.
///
/// # Errors
///
/// See [`unpack`].
pub fn unpack_into_empty(archive: &Path, root: &Path) -> Result<bool, SnapshotError> {
    let occupied = match fs::read_dir(root) {
        Ok(mut entries) => entries.next().is_some(),
        Err(_) => false,
    };
    if occupied {
        debug!(root = %root.display(), "unpack root is not empty, reusing its content");
        return Ok(false);
    }
    unpack(archive, root)?;
    Ok(true)
}

/// Unpack `archive` into a fresh temporary directory which is removed when dropped.
///
/// # Errors
///
/// See [`unpack`]; also fails if the temporary directory can not be created.
pub fn unpack_to_temp(archive: &Path) -> Result<TempDir, SnapshotError> {
    let dir = tempfile::Builder::new()
        .prefix("hwinv-snapshot-")
        .tempdir()
        .map_err(SnapshotError::io(std::env::temp_dir()))?;
    unpack(archive, dir.path())?;
    Ok(dir)
}
