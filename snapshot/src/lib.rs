// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Capture and replay of the pseudofiles the inventory pipeline reads.
//!
//! A snapshot is made in three steps:
//!
//! 1. [`clone::Cloner`] mirrors the relevant part of a host's `/proc`, `/sys` and `/run` into a
//!    scratch directory, copying kernel pseudofiles as true regular files.
//! 2. [`pack::pack`] writes the scratch directory as a gzip compressed tar archive.
//! 3. [`unpack::unpack`] expands the archive under some other root, which the inventory then uses
//!    as its chroot.
//!
//! [`create`] runs the first two steps in one go.

#![deny(clippy::pedantic, clippy::unwrap_used)]

pub mod clone;
pub mod pack;
pub mod unpack;

use md5::{Digest, Md5};
use std::path::{Path, PathBuf};
use tracing::info;

pub use clone::{CloneReport, Cloner};
pub use pack::pack;
pub use unpack::{unpack, unpack_to_temp};

/// Extension of snapshot archives.
pub const ARCHIVE_EXTENSION: &str = "tar.gz";

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid clone pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to determine host name: {0}")]
    Hostname(#[from] nix::errno::Errno),
}

impl SnapshotError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> SnapshotError {
        let path = path.into();
        move |source| SnapshotError::Io { path, source }
    }

    pub(crate) fn archive(
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> SnapshotError {
        let path = path.into();
        move |source| SnapshotError::Archive { path, source }
    }
}

/// The archive name for a snapshot of this host: `<os>-<arch>-<md5(hostname)>.tar.gz`.
///
/// The host name is hashed so that archives can be shared without disclosing it.
///
/// # Errors
///
/// Returns [`SnapshotError::Hostname`] if the host name can not be read.
pub fn default_archive_name() -> Result<String, SnapshotError> {
    let hostname = nix::unistd::gethostname()?;
    Ok(archive_name_for(hostname.as_encoded_bytes()))
}

fn archive_name_for(hostname: &[u8]) -> String {
    format!(
        "{os}-{arch}-{digest:x}.{ARCHIVE_EXTENSION}",
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        digest = Md5::digest(hostname),
    )
}

/// Clone the host rooted at `source_root` and pack the result into `archive`.
///
/// The scratch directory is a temporary directory which is removed before returning.
///
/// # Errors
///
/// Propagates any [`SnapshotError`] raised while cloning or packing.
pub fn create(source_root: &Path, archive: &Path) -> Result<CloneReport, SnapshotError> {
    let scratch = tempfile::Builder::new()
        .prefix("hwinv-clone-")
        .tempdir()
        .map_err(SnapshotError::io(std::env::temp_dir()))?;
    let report = Cloner::new(source_root, scratch.path()).run()?;
    pack(scratch.path(), archive)?;
    info!(
        archive = %archive.display(),
        files = report.files,
        links = report.links,
        "snapshot created"
    );
    Ok(report)
}
