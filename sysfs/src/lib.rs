// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Chroot aware access to the kernel pseudo filesystems.
//!
//! Every path read by the inventory pipeline is composed by [`paths::Paths`] from a configurable
//! root directory (the chroot) and a set of per-subtree overrides.
//! This is what lets the same discovery code run against the live host and against a snapshot
//! of a different host which has been unpacked into a scratch directory.
//!
//! The readers in [`read`] never fail.
//! A missing pseudofile is a normal outcome (the hardware or kernel feature may simply not be
//! present) and produces a sentinel rather than an error.

#![deny(clippy::pedantic, clippy::unwrap_used)]

pub mod mounts;
pub mod paths;
pub mod read;
pub mod tool;
pub mod udev;

pub use paths::{LogicalPath, PathOverrides, Paths, Root};
