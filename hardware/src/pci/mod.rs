// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PCI functions.
//!
//! Every entry of `/sys/bus/pci/devices` is a PCI function, named by its address.
//! Its identity comes from the `modalias` pseudofile; the names of the identifiers come from the
//! PCI ID database (see [`db`]).
//! Functions behind a bridge sit below the bridge's directory in `/sys/devices`, which is how
//! [`PciDevice::parent_address`] is found.

pub mod address;
pub mod db;
pub mod ids;
pub mod modalias;
pub mod sriov;

use crate::context::Context;
use crate::support::counted;
use crate::{Discover, Error, UNKNOWN, unsupported_platform};
use address::PciAddress;
use db::PciIdLookup;
use ids::{
    Class, ClassCode, DeviceId, ProgIfCode, Product, ProgrammingInterface, Subclass,
    SubclassCode, Vendor, VendorId,
};
use modalias::Modalias;
use sriov::Function;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use sysfs::Paths;
use sysfs::read::{link_basename, read_dir, read_hex, read_int, read_parsed, read_trimmed};
use tracing::{debug, warn};

/// One PCI function.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PciDevice {
    pub address: PciAddress,
    /// The bridge this function sits behind (`None` for functions on a root bus).
    pub parent_address: Option<PciAddress>,
    pub vendor: Vendor,
    pub product: Product,
    pub revision: String,
    /// The subsystem (board) identity: subsystem vendor and subsystem device.
    pub subsystem: Product,
    pub class: Class,
    pub subclass: Subclass,
    pub programming_interface: ProgrammingInterface,
    /// The bound kernel driver, if any.
    pub driver: Option<String>,
    pub iommu_group: Option<String>,
    /// The NUMA node the function is attached to (see [`crate::topology::Node::id`]).
    pub numa_node: Option<usize>,
    /// The SR-IOV role of this function, if it has one.
    pub function: Option<Function>,
}

impl PciDevice {
    #[must_use]
    pub fn is_physical_function(&self) -> bool {
        matches!(self.function, Some(Function::Physical { .. }))
    }

    #[must_use]
    pub fn is_virtual_function(&self) -> bool {
        matches!(self.function, Some(Function::Virtual { .. }))
    }
}

impl Display for PciDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let vendor = if self.vendor.name == UNKNOWN {
            self.vendor.id.to_string()
        } else {
            self.vendor.name.clone()
        };
        let product = if self.product.name == UNKNOWN {
            self.product.id.to_string()
        } else {
            self.product.name.clone()
        };
        write!(
            f,
            "{} -> driver: '{}' class: '{}' vendor: '{vendor}' product: '{product}'",
            self.address,
            self.driver.as_deref().unwrap_or(""),
            self.class.name,
        )
    }
}

/// The PCI functions of a host.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PciInfo {
    pub devices: Vec<PciDevice>,
}

impl PciInfo {
    /// The function at `address`.
    #[must_use]
    pub fn get_device(&self, address: PciAddress) -> Option<&PciDevice> {
        self.devices.iter().find(|device| device.address == address)
    }

    /// All functions, ordered by address.
    #[must_use]
    pub fn list_devices(&self) -> &[PciDevice] {
        &self.devices
    }

    /// Read every PCI function below `ctx`'s root, naming identifiers with `db`.
    ///
    /// Functions whose identity can not be read at all are skipped.
    /// SR-IOV annotation failures are logged and leave the affected physical function
    /// unannotated.
    #[must_use]
    pub fn read(ctx: &Context, db: &dyn PciIdLookup) -> PciInfo {
        let paths = ctx.paths();
        let topology = ctx.topology_enabled();
        let mut devices: Vec<PciDevice> = read_dir(paths.sys_bus_pci_devices())
            .into_iter()
            .filter_map(|name| match name.parse::<PciAddress>() {
                Ok(address) => Some(address),
                Err(err) => {
                    debug!(name, "skipping PCI entry: {err}");
                    None
                }
            })
            .filter_map(|address| read_device(&paths, db, address, topology))
            .collect();
        for err in sriov::annotate(&mut devices, &paths) {
            warn!("{err}");
        }
        PciInfo { devices }
    }
}

impl Display for PciInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PCI ({})", counted(self.devices.len(), "device"))
    }
}

#[cfg(target_os = "linux")]
impl Discover for PciInfo {
    fn discover(ctx: &Context) -> Result<Self, Error> {
        ctx.run(|ctx| -> Result<PciInfo, Error> {
            let db = db::load(ctx)?;
            Ok(PciInfo::read(ctx, db.as_ref()))
        })?
    }
}

unsupported_platform!(PciInfo, Pci);

/// The sysfs directory of the function at `address`.
pub(crate) fn device_dir(paths: &Paths, address: PciAddress) -> PathBuf {
    paths.sys_bus_pci_devices().join(address.to_string())
}

/// The identity of a function without a (readable) `modalias`, from the individual id files.
fn identity_from_id_files(dir: &Path) -> Option<Modalias> {
    let class = read_hex(dir.join("class"))?;
    let [_, class, subclass, prog_if] = u32::try_from(class).ok()?.to_be_bytes();
    let id = |file: &str| read_hex(dir.join(file)).and_then(|id| u16::try_from(id).ok());
    Some(Modalias {
        vendor: VendorId::new(id("vendor")?),
        device: DeviceId::new(id("device")?),
        subsystem_vendor: VendorId::new(id("subsystem_vendor").unwrap_or_default()),
        subsystem_device: DeviceId::new(id("subsystem_device").unwrap_or_default()),
        class: ClassCode::new(class),
        subclass: SubclassCode::new(subclass),
        prog_if: ProgIfCode::new(prog_if),
    })
}

fn name_or_unknown(name: Option<&str>) -> String {
    name.map_or_else(|| UNKNOWN.to_string(), str::to_string)
}

/// The named identity of a function.
struct Names {
    vendor: Vendor,
    product: Product,
    subsystem: Product,
    class: Class,
    subclass: Subclass,
    programming_interface: ProgrammingInterface,
}

/// Name the identifiers of `alias` with `db`.
fn resolve(db: &dyn PciIdLookup, alias: &Modalias) -> Names {
    Names {
        vendor: Vendor {
            id: alias.vendor,
            name: name_or_unknown(db.vendor(alias.vendor)),
        },
        product: Product {
            vendor_id: alias.vendor,
            id: alias.device,
            name: name_or_unknown(db.device(alias.vendor, alias.device)),
        },
        subsystem: Product {
            vendor_id: alias.subsystem_vendor,
            id: alias.subsystem_device,
            name: name_or_unknown(db.subsystem(
                alias.vendor,
                alias.device,
                alias.subsystem_vendor,
                alias.subsystem_device,
            )),
        },
        class: Class {
            id: alias.class,
            name: name_or_unknown(db.class(alias.class)),
        },
        subclass: Subclass {
            id: alias.subclass,
            name: name_or_unknown(db.subclass(alias.class, alias.subclass)),
        },
        programming_interface: ProgrammingInterface {
            id: alias.prog_if,
            name: name_or_unknown(db.prog_if(alias.class, alias.subclass, alias.prog_if)),
        },
    }
}

/// The nearest ancestor directory of `dir` which is a PCI function.
fn parent_address(paths: &Paths, dir: &Path) -> Option<PciAddress> {
    let canonical = match std::fs::canonicalize(dir) {
        Ok(canonical) => canonical,
        Err(err) => {
            warn!(path = %dir.display(), "unable to resolve PCI device directory: {err}");
            return None;
        }
    };
    let sys = std::fs::canonicalize(paths.sys()).unwrap_or_else(|_| paths.sys());
    canonical
        .ancestors()
        .skip(1)
        .take_while(|ancestor| ancestor.starts_with(&sys) && *ancestor != sys)
        .find_map(|ancestor| ancestor.file_name()?.to_str()?.parse::<PciAddress>().ok())
}

fn read_device(
    paths: &Paths,
    db: &dyn PciIdLookup,
    address: PciAddress,
    topology: bool,
) -> Option<PciDevice> {
    let dir = device_dir(paths, address);
    let Some(alias) =
        read_parsed::<Modalias>(dir.join("modalias")).or_else(|| identity_from_id_files(&dir))
    else {
        warn!(path = %dir.display(), "no identity for PCI function, skipping it");
        return None;
    };
    let names = resolve(db, &alias);
    let numa_node = match read_int(dir.join("numa_node")) {
        node if topology && node >= 0 => usize::try_from(node).ok(),
        _ => None,
    };
    Some(PciDevice {
        address,
        parent_address: parent_address(paths, &dir),
        vendor: names.vendor,
        product: names.product,
        revision: read_trimmed(dir.join("revision")).unwrap_or_else(|| UNKNOWN.to_string()),
        subsystem: names.subsystem,
        class: names.class,
        subclass: names.subclass,
        programming_interface: names.programming_interface,
        driver: link_basename(dir.join("driver")),
        iommu_group: link_basename(dir.join("iommu_group")),
        numa_node,
        function: None,
    })
}
