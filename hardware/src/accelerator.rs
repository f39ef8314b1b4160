// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Processing accelerators: the PCI functions whose class marks them as compute devices.

use crate::context::Context;
use crate::pci::address::PciAddress;
use crate::pci::ids::{ClassCode, SubclassCode};
use crate::pci::{PciDevice, PciInfo};
use crate::support::counted;
use crate::{Discover, Error, unsupported_platform};
use std::fmt::{Display, Formatter};

/// The (class, subclass) pairs of accelerator functions.
pub const ACCELERATOR_CLASSES: [(ClassCode, SubclassCode); 3] = [
    // processing accelerator
    (ClassCode::new(0x12), SubclassCode::new(0x00)),
    // 3D controller
    (ClassCode::new(0x03), SubclassCode::new(0x02)),
    // display controller (other)
    (ClassCode::new(0x03), SubclassCode::new(0x80)),
];

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct AcceleratorDevice {
    pub address: PciAddress,
    pub pci_device: PciDevice,
}

impl Display for AcceleratorDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "device @{} -> vendor='{}' product='{}'",
            self.address, self.pci_device.vendor.name, self.pci_device.product.name
        )
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct AcceleratorInfo {
    pub devices: Vec<AcceleratorDevice>,
}

impl AcceleratorInfo {
    #[must_use]
    pub fn is_accelerator(device: &PciDevice) -> bool {
        ACCELERATOR_CLASSES.contains(&(device.class.id, device.subclass.id))
    }

    /// The accelerators among an already discovered [`PciInfo`].
    #[must_use]
    pub fn from_pci(pci: &PciInfo) -> AcceleratorInfo {
        AcceleratorInfo {
            devices: pci
                .devices
                .iter()
                .filter(|device| AcceleratorInfo::is_accelerator(device))
                .map(|device| AcceleratorDevice {
                    address: device.address,
                    pci_device: device.clone(),
                })
                .collect(),
        }
    }
}

impl Display for AcceleratorInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "processing accelerators ({})",
            counted(self.devices.len(), "device")
        )
    }
}

#[cfg(target_os = "linux")]
impl Discover for AcceleratorInfo {
    fn discover(ctx: &Context) -> Result<Self, Error> {
        PciInfo::discover(ctx).map(|pci| AcceleratorInfo::from_pci(&pci))
    }
}

unsupported_platform!(AcceleratorInfo, Accelerator);

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;
    use crate::context::Options;
    use crate::pci::db::PciIdsFile;
    use pretty_assertions::assert_eq;
    use test_utils::host::{self, ACCELERATOR};

    #[test]
    fn filters_by_class() {
        let root = host::sample_host();
        let ctx = Context::new(Options::default().with_chroot(root.path()));
        let mut pci = PciInfo::read(&ctx, &PciIdsFile::default());
        let accelerators = AcceleratorInfo::from_pci(&pci);
        let addresses: Vec<String> = accelerators
            .devices
            .iter()
            .map(|device| device.address.to_string())
            .collect();
        // the VGA controller (03:00) is not a compute device
        assert_eq!(addresses, vec![ACCELERATOR]);
        assert_eq!(accelerators.to_string(), "processing accelerators (1 device)");

        for device in &mut pci.devices {
            device.subclass.id = SubclassCode::new(0x02);
            device.class.id = ClassCode::new(0x03);
        }
        assert_eq!(AcceleratorInfo::from_pci(&pci).devices.len(), pci.devices.len());
    }
}
