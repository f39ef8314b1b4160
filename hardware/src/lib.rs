// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors
//
// # Hardware inventory discovery

//! The `hardware` crate discovers the hardware of a Linux host from sysfs, procfs and the udev
//! runtime database, and returns it as plain (optionally serializable) records.
//!
//! ## Overview
//!
//! Every section of the inventory is a type implementing [`Discover`]:
//!
//! - [`block::BlockInfo`]: disks and their partitions
//! - [`cpu::CpuInfo`]: physical packages, cores and logical processors
//! - [`topology::TopologyInfo`]: NUMA nodes, their cores, caches and distances
//! - [`memory::MemoryInfo`]: usable / physical memory and huge pages
//! - [`net::NetworkInfo`]: network interfaces, their offload features and backing PCI function
//! - [`pci::PciInfo`] and [`pci::sriov::SriovInfo`]: PCI functions and the SR-IOV graph
//! - [`gpu::GpuInfo`] and [`accelerator::AcceleratorInfo`]
//! - [`usb::UsbInfo`]
//! - [`dmi::bios::Bios`], [`dmi::baseboard::Baseboard`], [`dmi::chassis::Chassis`],
//!   [`dmi::product::Product`]
//!
//! [`host::HostInfo`] discovers all of them at once.
//!
//! ## Replay
//!
//! Discovery never reads absolute paths directly.
//! All paths are derived from a [`context::Context`], whose chroot may point at a copy of another
//! host's pseudofiles (see the `hwinv-snapshot` crate).
//! Running discovery over such a copy yields the same result as running it on the host the copy
//! was taken from.
//!
//! ## Features
//!
//! - `serde`: Adds serialization support for all types using serde.
//!
//! # Examples
//!
//! ```no_run
//! use hwinv_hardware::Discover;
//! use hwinv_hardware::context::{Context, Options};
//! use hwinv_hardware::memory::MemoryInfo;
//!
//! let ctx = Context::new(Options::from_env().with_tools(false));
//! let memory = MemoryInfo::discover(&ctx).unwrap();
//! println!("{memory}");
//! ```

#![deny(clippy::pedantic, clippy::unwrap_used)]
#![allow(clippy::module_name_repetitions)]

pub mod accelerator;
pub mod block;
pub mod context;
pub mod cpu;
pub mod dmi;
pub mod error;
pub mod gpu;
pub mod host;
pub mod memory;
pub mod net;
pub mod pci;
pub mod support;
pub mod topology;
pub mod usb;

pub use context::{Context, Options};
pub use error::Error;
pub use host::{HostInfo, Section};

/// The value of string fields whose source is missing.
pub const UNKNOWN: &str = "UNKNOWN";

/// One section of the inventory, built from the host a [`Context`] points at.
///
/// Implementations acquire the context (see [`Context::run`]) themselves, so a snapshot backed
/// context is unpacked for the duration of the call.
pub trait Discover: Sized {
    /// Discover this section.
    ///
    /// # Errors
    ///
    /// Missing or malformed pseudofiles never fail discovery (they yield `UNKNOWN`, `-1` or empty
    /// values).
    /// Errors are reserved for the snapshot, the PCI database and unsupported platforms.
    fn discover(ctx: &Context) -> Result<Self, Error>;
}

/// Implement [`Discover`] for a section on platforms without a discovery backend.
macro_rules! unsupported_platform {
    ($info:ty, $section:ident) => {
        #[cfg(not(target_os = "linux"))]
        impl $crate::Discover for $info {
            fn discover(_: &$crate::Context) -> Result<Self, $crate::Error> {
                Err($crate::Error::Unsupported($crate::host::Section::$section))
            }
        }
    };
}
pub(crate) use unsupported_platform;

/// Read a pseudofile as a string field, [`UNKNOWN`] when missing or empty.
pub(crate) fn string_or_unknown(path: impl AsRef<std::path::Path>) -> String {
    sysfs::read::read_trimmed(path)
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}
