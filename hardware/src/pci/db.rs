// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PCI ID database lookups.
//!
//! Names for vendors, devices, subsystems and class codes come from the `pci.ids` database.
//! Two sources are supported:
//!
//! - [`EmbeddedPciIds`]: the copy compiled into the `pci-ids` crate (the default), and
//! - [`PciIdsFile`]: a `pci.ids` text file, e.g. a newer one shipped by the distribution.
//!
//! [`load`] picks between them based on the [`Context`].

use crate::context::Context;
use crate::pci::ids::{ClassCode, DeviceId, ProgIfCode, SubclassCode, VendorId};
use pci_ids::FromId;
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sysfs::paths::join_under;
use tracing::{debug, trace};

/// Name lookups against a PCI ID database.
///
/// Every method returns `None` if the database has no entry for the ID(s).
pub trait PciIdLookup: Debug + Send + Sync {
    fn vendor(&self, vendor: VendorId) -> Option<&str>;
    fn device(&self, vendor: VendorId, device: DeviceId) -> Option<&str>;
    /// The name of a subsystem of the device `vendor:device`.
    fn subsystem(
        &self,
        vendor: VendorId,
        device: DeviceId,
        subsystem_vendor: VendorId,
        subsystem_device: DeviceId,
    ) -> Option<&str>;
    fn class(&self, class: ClassCode) -> Option<&str>;
    fn subclass(&self, class: ClassCode, subclass: SubclassCode) -> Option<&str>;
    fn prog_if(
        &self,
        class: ClassCode,
        subclass: SubclassCode,
        prog_if: ProgIfCode,
    ) -> Option<&str>;
}

#[derive(Debug, thiserror::Error)]
pub enum PciDbError {
    #[error("unable to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} contains no PCI ID records", .0.display())]
    Empty(PathBuf),
}

/// The database embedded in the `pci-ids` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbeddedPciIds;

impl PciIdLookup for EmbeddedPciIds {
    fn vendor(&self, vendor: VendorId) -> Option<&str> {
        pci_ids::Vendor::from_id(vendor.value()).map(pci_ids::Vendor::name)
    }

    fn device(&self, vendor: VendorId, device: DeviceId) -> Option<&str> {
        pci_ids::Device::from_vid_pid(vendor.value(), device.value()).map(pci_ids::Device::name)
    }

    fn subsystem(
        &self,
        vendor: VendorId,
        device: DeviceId,
        subsystem_vendor: VendorId,
        subsystem_device: DeviceId,
    ) -> Option<&str> {
        pci_ids::Device::from_vid_pid(vendor.value(), device.value())?
            .subsystems()
            .find(|sub| {
                sub.subvendor() == subsystem_vendor.value()
                    && sub.subdevice() == subsystem_device.value()
            })
            .map(pci_ids::SubSystem::name)
    }

    fn class(&self, class: ClassCode) -> Option<&str> {
        pci_ids::Class::from_id(class.value()).map(pci_ids::Class::name)
    }

    fn subclass(&self, class: ClassCode, subclass: SubclassCode) -> Option<&str> {
        embedded_subclass(class, subclass).map(pci_ids::Subclass::name)
    }

    fn prog_if(
        &self,
        class: ClassCode,
        subclass: SubclassCode,
        prog_if: ProgIfCode,
    ) -> Option<&str> {
        embedded_subclass(class, subclass)?
            .prog_ifs()
            .find(|candidate| candidate.id() == prog_if.value())
            .map(pci_ids::ProgIf::name)
    }
}

fn embedded_subclass(
    class: ClassCode,
    subclass: SubclassCode,
) -> Option<&'static pci_ids::Subclass> {
    pci_ids::Class::from_id(class.value())?
        .subclasses()
        .find(|candidate| candidate.id() == subclass.value())
}

/// A database parsed from a `pci.ids` text file.
///
/// The file is a tab-indented tree:
///
/// ```text
/// 8086  Intel Corporation
/// <TAB>1572  Ethernet Controller X710 for 10GbE SFP+
/// <TAB><TAB>8086 0000  Ethernet Converged Network Adapter X710
/// C 02  Network controller
/// <TAB>00  Ethernet controller
/// ```
///
/// Vendors come first; the `C` lines start the class section.
/// Lines which do not fit the layout are skipped.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PciIdsFile {
    vendors: HashMap<VendorId, String>,
    devices: HashMap<(VendorId, DeviceId), String>,
    subsystems: HashMap<(VendorId, DeviceId, VendorId, DeviceId), String>,
    classes: HashMap<ClassCode, String>,
    subclasses: HashMap<(ClassCode, SubclassCode), String>,
    prog_ifs: HashMap<(ClassCode, SubclassCode, ProgIfCode), String>,
}

#[derive(Clone, Copy, Debug)]
enum Scope {
    Start,
    Vendor(VendorId),
    Device(VendorId, DeviceId),
    Class(ClassCode),
    Subclass(ClassCode, SubclassCode),
    /// A section we do not index (e.g. the `X` device class tree or `L` languages).
    Ignored,
}

/// Split `<id>  <name>` into the parsed id and the name.
fn id_and_name<T: std::str::FromStr>(line: &str) -> Option<(T, &str)> {
    let (id, name) = line.split_once(char::is_whitespace)?;
    Some((id.parse().ok()?, name.trim()))
}

impl PciIdsFile {
    /// Parse the text of a `pci.ids` file.
    #[must_use]
    pub fn parse(contents: &str) -> PciIdsFile {
        let mut db = PciIdsFile::default();
        let mut scope = Scope::Start;
        for line in contents.lines() {
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let depth = line.chars().take_while(|c| *c == '\t').count();
            let body = &line[depth..];
            scope = match (depth, scope) {
                (0, _) => db.top_level(body).unwrap_or(Scope::Ignored),
                (1, Scope::Vendor(vendor) | Scope::Device(vendor, _)) => {
                    db.device_line(vendor, body).unwrap_or(Scope::Vendor(vendor))
                }
                (2, Scope::Device(vendor, device)) => {
                    db.subsystem_line(vendor, device, body);
                    scope
                }
                (1, Scope::Class(class) | Scope::Subclass(class, _)) => {
                    db.subclass_line(class, body).unwrap_or(Scope::Class(class))
                }
                (2, Scope::Subclass(class, subclass)) => {
                    db.prog_if_line(class, subclass, body);
                    scope
                }
                _ => {
                    trace!(line, "skipping pci.ids line");
                    scope
                }
            };
        }
        db
    }

    /// Read and parse a `pci.ids` file.
    ///
    /// # Errors
    ///
    /// Returns [`PciDbError::Io`] if the file can not be read, and [`PciDbError::Empty`] if it
    /// contains no records at all (it is most likely not a `pci.ids` file).
    pub fn read(path: impl AsRef<Path>) -> Result<PciIdsFile, PciDbError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| PciDbError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let db = PciIdsFile::parse(&String::from_utf8_lossy(&bytes));
        if db.is_empty() {
            return Err(PciDbError::Empty(path.to_path_buf()));
        }
        debug!(
            path = %path.display(),
            vendors = db.vendors.len(),
            devices = db.devices.len(),
            classes = db.classes.len(),
            "loaded pci.ids"
        );
        Ok(db)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vendors.is_empty() && self.classes.is_empty()
    }

    fn top_level(&mut self, body: &str) -> Option<Scope> {
        if let Some(class) = body.strip_prefix("C ") {
            let (class, name) = id_and_name::<ClassCode>(class)?;
            self.classes.insert(class, name.to_string());
            return Some(Scope::Class(class));
        }
        let (vendor, name) = id_and_name::<VendorId>(body)?;
        // only plain 4 digit vendor lines, not `X`/`L` section headers which happen to parse
        if body.split_whitespace().next().map(str::len) != Some(4) {
            return None;
        }
        self.vendors.insert(vendor, name.to_string());
        Some(Scope::Vendor(vendor))
    }

    fn device_line(&mut self, vendor: VendorId, body: &str) -> Option<Scope> {
        let (device, name) = id_and_name::<DeviceId>(body)?;
        self.devices.insert((vendor, device), name.to_string());
        Some(Scope::Device(vendor, device))
    }

    fn subsystem_line(&mut self, vendor: VendorId, device: DeviceId, body: &str) {
        let mut parts = body.splitn(3, char::is_whitespace);
        let (Some(sub_vendor), Some(sub_device), Some(name)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return;
        };
        let (Ok(sub_vendor), Ok(sub_device)) = (sub_vendor.parse(), sub_device.parse()) else {
            return;
        };
        self.subsystems
            .insert((vendor, device, sub_vendor, sub_device), name.trim().to_string());
    }

    fn subclass_line(&mut self, class: ClassCode, body: &str) -> Option<Scope> {
        let (subclass, name) = id_and_name::<SubclassCode>(body)?;
        self.subclasses.insert((class, subclass), name.to_string());
        Some(Scope::Subclass(class, subclass))
    }

    fn prog_if_line(&mut self, class: ClassCode, subclass: SubclassCode, body: &str) {
        if let Some((prog_if, name)) = id_and_name::<ProgIfCode>(body) {
            self.prog_ifs
                .insert((class, subclass, prog_if), name.to_string());
        }
    }
}

impl PciIdLookup for PciIdsFile {
    fn vendor(&self, vendor: VendorId) -> Option<&str> {
        self.vendors.get(&vendor).map(String::as_str)
    }

    fn device(&self, vendor: VendorId, device: DeviceId) -> Option<&str> {
        self.devices.get(&(vendor, device)).map(String::as_str)
    }

    fn subsystem(
        &self,
        vendor: VendorId,
        device: DeviceId,
        subsystem_vendor: VendorId,
        subsystem_device: DeviceId,
    ) -> Option<&str> {
        self.subsystems
            .get(&(vendor, device, subsystem_vendor, subsystem_device))
            .map(String::as_str)
    }

    fn class(&self, class: ClassCode) -> Option<&str> {
        self.classes.get(&class).map(String::as_str)
    }

    fn subclass(&self, class: ClassCode, subclass: SubclassCode) -> Option<&str> {
        self.subclasses.get(&(class, subclass)).map(String::as_str)
    }

    fn prog_if(
        &self,
        class: ClassCode,
        subclass: SubclassCode,
        prog_if: ProgIfCode,
    ) -> Option<&str> {
        self.prog_ifs
            .get(&(class, subclass, prog_if))
            .map(String::as_str)
    }
}

/// The database for a discovery run.
///
/// In order of preference: the database injected with
/// [`Options::with_pci_db`](crate::context::Options::with_pci_db), the `pci.ids` file configured
/// with `PCIDB_PATH` (resolved under the chroot), and the embedded database.
///
/// # Errors
///
/// Returns a [`PciDbError`] if a configured `pci.ids` file can not be loaded.
pub fn load(ctx: &Context) -> Result<Arc<dyn PciIdLookup>, PciDbError> {
    let options = ctx.options();
    if let Some(db) = &options.pci_db {
        return Ok(Arc::clone(db));
    }
    if let Some(path) = &options.pci_ids_path {
        let path = join_under(&ctx.chroot(), path);
        return Ok(Arc::new(PciIdsFile::read(path)?));
    }
    Ok(Arc::new(EmbeddedPciIds))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;
    use crate::context::Options;
    use pretty_assertions::assert_eq;
    use test_utils::FakeRoot;

    const SAMPLE: &str = "\
# pci.ids sample
#\tcomments are ignored

10de  NVIDIA Corporation
\t1c82  GP107 [GeForce GTX 1050 Ti]
\t\t1043 8613  Phoenix GeForce GTX 1050 Ti
8086  Intel Corporation
\t1572  Ethernet Controller X710 for 10GbE SFP+
\t\t8086 0000  Ethernet Converged Network Adapter X710
\t154c  Ethernet Virtual Function 700 Series

C 02  Network controller
\t00  Ethernet controller
C 0c  Serial bus controller
\t03  USB controller
\t\t30  XHCI
";

    #[test]
    fn parses_the_vendor_tree() {
        let db = PciIdsFile::parse(SAMPLE);
        let nvidia = VendorId::new(0x10de);
        let gpu = DeviceId::new(0x1c82);
        assert_eq!(db.vendor(nvidia), Some("NVIDIA Corporation"));
        assert_eq!(db.device(nvidia, gpu), Some("GP107 [GeForce GTX 1050 Ti]"));
        assert_eq!(
            db.subsystem(nvidia, gpu, VendorId::new(0x1043), DeviceId::new(0x8613)),
            Some("Phoenix GeForce GTX 1050 Ti")
        );
        assert_eq!(
            db.device(VendorId::new(0x8086), DeviceId::new(0x154c)),
            Some("Ethernet Virtual Function 700 Series")
        );
        assert_eq!(db.vendor(VendorId::new(0x1af4)), None);
        assert_eq!(db.device(nvidia, DeviceId::new(0x1572)), None);
    }

    #[test]
    fn parses_the_class_tree() {
        let db = PciIdsFile::parse(SAMPLE);
        let serial = ClassCode::new(0x0c);
        let usb = SubclassCode::new(0x03);
        assert_eq!(db.class(ClassCode::new(0x02)), Some("Network controller"));
        assert_eq!(db.subclass(serial, usb), Some("USB controller"));
        assert_eq!(db.prog_if(serial, usb, ProgIfCode::new(0x30)), Some("XHCI"));
        // class codes do not leak into the vendor table
        assert_eq!(db.vendor(VendorId::new(0x02)), None);
    }

    #[test]
    fn embedded_database() {
        let db = EmbeddedPciIds;
        assert_eq!(db.vendor(VendorId::new(0x8086)), Some("Intel Corporation"));
        assert!(db.device(VendorId::new(0x8086), DeviceId::new(0x1572)).is_some());
        assert_eq!(db.class(ClassCode::new(0x02)), Some("Network controller"));
        assert_eq!(
            db.subclass(ClassCode::new(0x02), SubclassCode::new(0x00)),
            Some("Ethernet controller")
        );
        assert_eq!(db.vendor(VendorId::new(0xffff)), None);
    }

    #[test]
    fn load_prefers_injected_then_file_then_embedded() {
        let root = FakeRoot::new();
        root.file("usr/share/hwdata/pci.ids", SAMPLE);

        let injected: Arc<dyn PciIdLookup> = Arc::new(PciIdsFile::parse("1234  Injected\n"));
        let ctx = Context::new(
            Options::default()
                .with_chroot(root.path())
                .with_pci_ids_path("/usr/share/hwdata/pci.ids")
                .with_pci_db(Arc::clone(&injected)),
        );
        let db = load(&ctx).unwrap();
        assert_eq!(db.vendor(VendorId::new(0x1234)), Some("Injected"));

        let ctx = Context::new(
            Options::default()
                .with_chroot(root.path())
                .with_pci_ids_path("/usr/share/hwdata/pci.ids"),
        );
        let db = load(&ctx).unwrap();
        assert_eq!(db.vendor(VendorId::new(0x10de)), Some("NVIDIA Corporation"));
        assert_eq!(db.vendor(VendorId::new(0x1af4)), None);

        let ctx = Context::new(Options::default().with_chroot(root.path()));
        let db = load(&ctx).unwrap();
        assert_eq!(db.vendor(VendorId::new(0x1af4)), Some("Red Hat, Inc."));
    }

    #[test]
    fn unusable_files_are_errors() {
        let root = FakeRoot::new();
        root.file("pci.ids", "# nothing here\n");
        let missing = Context::new(
            Options::default()
                .with_chroot(root.path())
                .with_pci_ids_path("/missing.ids"),
        );
        assert!(matches!(load(&missing), Err(PciDbError::Io { .. })));
        let empty = Context::new(
            Options::default()
                .with_chroot(root.path())
                .with_pci_ids_path("pci.ids"),
        );
        assert!(matches!(load(&empty), Err(PciDbError::Empty(_))));
    }
}
