// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Write a scratch tree as a gzip compressed tar archive.

use crate::SnapshotError;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Pack `scratch` into a new archive at `archive`.
///
/// Entries are stored relative to `scratch` (the archive root mirrors the host's `/`).
/// Symlinks are stored as links, never followed.
///
/// # Errors
///
/// Returns [`SnapshotError::Archive`] if the archive can not be created or written.
pub fn pack(scratch: &Path, archive: &Path) -> Result<(), SnapshotError> {
    let file = File::create(archive).map_err(SnapshotError::archive(archive))?;
    pack_into(scratch, file).map_err(SnapshotError::archive(archive))?;
    debug!(archive = %archive.display(), "archive written");
    Ok(())
}

/// Pack `scratch` into any writer, returning the writer once the gzip stream is finished.
///
/// # Errors
///
/// Propagates any I/O error from walking `scratch` or writing the stream.
pub fn pack_into<W: Write>(scratch: &Path, writer: W) -> std::io::Result<W> {
    let mut builder = tar::Builder::new(GzEncoder::new(writer, Compression::default()));
    builder.follow_symlinks(false);
    builder.append_dir_all(".", scratch)?;
    builder.into_inner()?.finish()
}
