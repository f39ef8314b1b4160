// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Test fixtures for the inventory pipeline.
//!
//! [`FakeRoot`] is a temporary directory which stands in for the root of a host filesystem.
//! Tests populate it with the pseudofiles (and relative symlinks) the code under test reads,
//! then point the code at it through the chroot mechanism.

#![deny(clippy::pedantic)]
#![allow(clippy::missing_panics_doc, clippy::must_use_candidate)]

pub mod host;

use std::path::{Path, PathBuf};

/// A throwaway host root.
///
/// The directory (and everything in it) is removed when the value is dropped.
#[derive(Debug)]
pub struct FakeRoot {
    dir: tempfile::TempDir,
}

impl Default for FakeRoot {
    fn default() -> Self {
        FakeRoot::new()
    }
}

impl FakeRoot {
    pub fn new() -> FakeRoot {
        let dir = tempfile::Builder::new()
            .prefix("hwinv-root-")
            .tempdir()
            .expect("unable to create temporary host root");
        FakeRoot { dir }
    }

    /// The absolute location of the fake root.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// `rel` resolved under the fake root.
    pub fn join(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Create (or replace) a regular file, creating parent directories as needed.
    pub fn file(&self, rel: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> &Self {
        let path = self.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("unable to create parent directory");
        }
        std::fs::write(&path, contents).expect("unable to write fixture file");
        self
    }

    /// Create a directory (and its parents).
    pub fn dir(&self, rel: impl AsRef<Path>) -> &Self {
        std::fs::create_dir_all(self.join(rel)).expect("unable to create fixture directory");
        self
    }

    /// Create a symlink at `rel` pointing at `target` (usually a relative path, as in sysfs).
    pub fn symlink(&self, rel: impl AsRef<Path>, target: impl AsRef<Path>) -> &Self {
        let path = self.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("unable to create parent directory");
        }
        std::os::unix::fs::symlink(target, &path).expect("unable to create fixture symlink");
        self
    }

    /// Remove a file or symlink if it exists.
    pub fn remove(&self, rel: impl AsRef<Path>) -> &Self {
        let path = self.join(rel);
        if let Err(err) = std::fs::remove_file(&path) {
            tracing::debug!(path = %path.display(), "fixture removal skipped: {err}");
        }
        self
    }
}
