// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The whole inventory of a host.

use crate::accelerator::AcceleratorInfo;
use crate::block::BlockInfo;
use crate::context::Context;
use crate::cpu::CpuInfo;
use crate::dmi::baseboard::Baseboard;
use crate::dmi::bios::Bios;
use crate::dmi::chassis::Chassis;
use crate::dmi::product::Product;
use crate::gpu::GpuInfo;
use crate::memory::MemoryInfo;
use crate::net::NetworkInfo;
use crate::pci::PciInfo;
use crate::pci::sriov::SriovInfo;
use crate::topology::TopologyInfo;
use crate::usb::UsbInfo;
use crate::{Discover, Error};
use std::fmt::{Display, Formatter};
use tracing::{info, warn};

/// A section of the inventory.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum Section {
    Block,
    Cpu,
    Memory,
    Topology,
    Net,
    Pci,
    Sriov,
    Gpu,
    Accelerator,
    Usb,
    Bios,
    Baseboard,
    Chassis,
    Product,
}

/// A section which could not be discovered.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct SectionError {
    pub section: Section,
    pub message: String,
}

impl Display for SectionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.section, self.message)
    }
}

impl From<SectionError> for Error {
    fn from(err: SectionError) -> Self {
        Error::Section {
            section: err.section,
            message: err.message,
        }
    }
}

/// Every section of the inventory.
///
/// A section which fails to discover is left empty and its failure recorded in
/// [`HostInfo::errors`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct HostInfo {
    pub block: BlockInfo,
    pub cpu: CpuInfo,
    pub memory: MemoryInfo,
    pub topology: TopologyInfo,
    pub network: NetworkInfo,
    pub pci: PciInfo,
    pub sriov: SriovInfo,
    pub gpu: GpuInfo,
    pub accelerator: AcceleratorInfo,
    pub usb: UsbInfo,
    pub bios: Bios,
    pub baseboard: Baseboard,
    pub chassis: Chassis,
    pub product: Product,
    pub errors: Vec<SectionError>,
}

impl HostInfo {
    /// True if every section was discovered.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// The first recorded failure, as an [`Error`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Section`] if any section failed.
    pub fn check(&self) -> Result<(), Error> {
        match self.errors.first() {
            Some(err) => Err(err.clone().into()),
            None => Ok(()),
        }
    }
}

impl Display for HostInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for line in [
            self.block.to_string(),
            self.cpu.to_string(),
            self.memory.to_string(),
            self.topology.to_string(),
            self.network.to_string(),
            self.pci.to_string(),
            self.sriov.to_string(),
            self.gpu.to_string(),
            self.accelerator.to_string(),
            self.usb.to_string(),
            self.bios.to_string(),
            self.baseboard.to_string(),
            self.chassis.to_string(),
            self.product.to_string(),
        ] {
            writeln!(f, "{line}")?;
        }
        for err in &self.errors {
            writeln!(f, "error: {err}")?;
        }
        Ok(())
    }
}

/// Discover one section, recording its failure (and leaving it empty) instead of returning it.
fn discover_section<T: Discover + Default>(
    ctx: &Context,
    section: Section,
    errors: &mut Vec<SectionError>,
) -> T {
    match T::discover(ctx) {
        Ok(info) => info,
        Err(err) => {
            warn!(%section, "discovery failed: {err}");
            errors.push(SectionError {
                section,
                message: err.to_string(),
            });
            T::default()
        }
    }
}

fn read_host(ctx: &Context) -> HostInfo {
    let mut errors = Vec::new();
    // the PCI database is loaded once; the PCI derived sections reuse the device list
    let pci: PciInfo = discover_section(ctx, Section::Pci, &mut errors);
    let host = HostInfo {
        block: discover_section(ctx, Section::Block, &mut errors),
        cpu: discover_section(ctx, Section::Cpu, &mut errors),
        memory: discover_section(ctx, Section::Memory, &mut errors),
        topology: discover_section(ctx, Section::Topology, &mut errors),
        network: discover_section(ctx, Section::Net, &mut errors),
        sriov: SriovInfo::from_pci(&pci),
        gpu: GpuInfo::read(ctx, &pci),
        accelerator: AcceleratorInfo::from_pci(&pci),
        usb: discover_section(ctx, Section::Usb, &mut errors),
        bios: discover_section(ctx, Section::Bios, &mut errors),
        baseboard: discover_section(ctx, Section::Baseboard, &mut errors),
        chassis: discover_section(ctx, Section::Chassis, &mut errors),
        product: discover_section(ctx, Section::Product, &mut errors),
        pci,
        errors,
    };
    info!(failed = host.errors.len(), "host discovery complete");
    host
}

/// Discovery only fails as a whole if a snapshot can not be unpacked; failures of single
/// sections are recorded in [`HostInfo::errors`].
impl Discover for HostInfo {
    fn discover(ctx: &Context) -> Result<Self, Error> {
        ctx.run(read_host)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;
    use crate::context::Options;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;
    use strum::IntoEnumIterator;
    use test_utils::host;

    #[test]
    fn section_names() {
        for section in Section::iter() {
            assert_eq!(Section::from_str(&section.to_string()).unwrap(), section);
        }
        assert_eq!(Section::Sriov.to_string(), "sriov");
        assert_eq!(
            serde_json::to_value(Section::Accelerator).unwrap(),
            serde_json::json!("accelerator")
        );
    }

    #[test]
    fn sample_host() {
        let root = host::sample_host();
        let ctx = Context::new(Options::default().with_chroot(root.path()));
        let host = HostInfo::discover(&ctx).unwrap();
        assert!(host.is_complete(), "{:?}", host.errors);
        host.check().unwrap();
        assert_eq!(host.block.disks.len(), 2);
        assert_eq!(host.cpu.total_hardware_threads, 4);
        assert_eq!(host.topology.nodes.len(), 2);
        assert_eq!(host.sriov.virtual_functions.len(), 2);
        assert_eq!(host.gpu.graphics_cards.len(), 1);
        assert_eq!(host.accelerator.devices.len(), 1);
        assert_eq!(host.usb.devices.len(), 2);
        assert_eq!(host.chassis.type_description, "Desktop");
        assert_eq!(host.to_string().lines().count(), 14);
    }

    #[test]
    fn pci_failure_does_not_abort_the_rest() {
        let root = host::sample_host();
        let ctx = Context::new(
            Options::default()
                .with_chroot(root.path())
                .with_pci_ids_path("/usr/share/misc/no-such-pci.ids"),
        );
        let host = HostInfo::discover(&ctx).unwrap();
        assert_eq!(host.errors.len(), 1);
        assert_eq!(host.errors[0].section, Section::Pci);
        assert!(host.pci.devices.is_empty());
        assert!(host.sriov.physical_functions.is_empty());
        // the cards are still listed, without their PCI function
        assert_eq!(host.gpu.graphics_cards.len(), 1);
        assert_eq!(host.gpu.graphics_cards[0].device, None);
        assert_eq!(host.block.disks.len(), 2);
        assert!(matches!(
            host.check(),
            Err(Error::Section {
                section: Section::Pci,
                ..
            })
        ));
    }

    #[test]
    fn serialized_sections() {
        let root = host::sample_host();
        let ctx = Context::new(Options::default().with_chroot(root.path()));
        let host = HostInfo::discover(&ctx).unwrap();
        let value = serde_json::to_value(&host).unwrap();
        assert_eq!(value["block"]["disks"][1]["drive_type"], "hdd");
        assert_eq!(value["topology"]["architecture"], "numa");
        assert_eq!(value["pci"]["devices"][0]["address"], host::BRIDGE);
        let decoded: HostInfo = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, host);

        let yaml = serde_yaml_ng::to_string(&host.chassis).unwrap();
        assert!(yaml.contains("type_description: Desktop"), "{yaml}");
        let decoded: Chassis = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(decoded, host.chassis);
    }
}
