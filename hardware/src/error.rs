// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Errors surfaced by discovery.

use crate::host::Section;
use crate::pci::address::InvalidPciAddress;
use crate::pci::db::PciDbError;
use snapshot::SnapshotError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} discovery is not supported on this platform")]
    Unsupported(Section),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("PCI database unavailable: {0}")]
    PciDb(#[from] PciDbError),
    #[error(transparent)]
    InvalidPciAddress(#[from] InvalidPciAddress),
    #[error("{section} discovery failed: {message}")]
    Section { section: Section, message: String },
}
