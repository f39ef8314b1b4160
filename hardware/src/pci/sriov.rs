// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! SR-IOV physical and virtual functions.
//!
//! A physical function (PF) advertises `sriov_totalvfs` and `sriov_numvfs` and links to each of
//! its enabled virtual functions (VFs) with a `virtfn<N>` symlink.
//! The PF / VF graph is expressed with addresses: the device records themselves stay in the
//! flat [`PciInfo`] list.

use crate::context::Context;
use crate::pci::address::PciAddress;
use crate::pci::{PciDevice, PciInfo, device_dir};
use crate::{Discover, Error, unsupported_platform};
use std::fmt::{Display, Formatter};
use sysfs::Paths;
use sysfs::read::{link_basename, read_parsed, read_trimmed};
use tracing::debug;

/// The SR-IOV role of a PCI function.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "kind", rename_all = "lowercase")
)]
pub enum Function {
    Physical {
        /// `sriov_totalvfs`: how many VFs the PF can expose.
        max_virtual: u32,
        /// The enabled VFs; `virtual_functions[n]` is the target of `virtfn<n>`.
        virtual_functions: Vec<PciAddress>,
    },
    Virtual {
        parent: PciAddress,
        /// The position of this VF in its parent's `virtual_functions`.
        index: usize,
    },
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum SriovError {
    #[error("{pf}: invalid sriov_numvfs {value:?}")]
    InvalidNumVfs { pf: PciAddress, value: String },
    #[error("{pf}: virtfn{index} is missing or does not name a PCI function")]
    MissingLink { pf: PciAddress, index: u32 },
    #[error("{pf}: virtual function {vf} is not a known PCI function")]
    DanglingVirtualFunction { pf: PciAddress, vf: PciAddress },
}

/// The VFs of one PF, or the reason they could not be found.
fn virtual_functions(
    paths: &Paths,
    devices: &[PciDevice],
    pf: PciAddress,
) -> Option<Result<Function, SriovError>> {
    let dir = device_dir(paths, pf);
    let max_virtual = read_parsed::<u32>(dir.join("sriov_totalvfs"))?;
    let raw = read_trimmed(dir.join("sriov_numvfs")).unwrap_or_default();
    let Ok(enabled) = raw.parse::<u32>() else {
        return Some(Err(SriovError::InvalidNumVfs { pf, value: raw }));
    };
    let mut virtual_functions = Vec::new();
    for index in 0..enabled {
        let Some(vf) = link_basename(dir.join(format!("virtfn{index}")))
            .and_then(|name| name.parse::<PciAddress>().ok())
        else {
            return Some(Err(SriovError::MissingLink { pf, index }));
        };
        if !devices.iter().any(|device| device.address == vf) {
            return Some(Err(SriovError::DanglingVirtualFunction { pf, vf }));
        }
        virtual_functions.push(vf);
    }
    Some(Ok(Function::Physical {
        max_virtual,
        virtual_functions,
    }))
}

/// Annotate `devices` with their SR-IOV roles.
///
/// A PF whose VFs can not all be resolved is left unannotated (as are its VFs) and the reason
/// is returned; the remaining PFs are annotated regardless.
pub fn annotate(devices: &mut [PciDevice], paths: &Paths) -> Vec<SriovError> {
    let mut errors = Vec::new();
    let mut resolved = Vec::new();
    for device in devices.iter() {
        match virtual_functions(paths, devices, device.address) {
            None => {}
            Some(Ok(function)) => resolved.push((device.address, function)),
            Some(Err(err)) => errors.push(err),
        }
    }
    for (pf, function) in resolved {
        if let Function::Physical {
            virtual_functions, ..
        } = &function
        {
            debug!(%pf, vfs = virtual_functions.len(), "SR-IOV physical function");
            for (index, vf) in virtual_functions.iter().enumerate() {
                if let Some(device) = devices.iter_mut().find(|device| device.address == *vf) {
                    device.function = Some(Function::Virtual { parent: pf, index });
                }
            }
        }
        if let Some(device) = devices.iter_mut().find(|device| device.address == pf) {
            device.function = Some(function);
        }
    }
    errors
}

/// The SR-IOV capable functions of a host.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct SriovInfo {
    pub physical_functions: Vec<PciDevice>,
    pub virtual_functions: Vec<PciDevice>,
}

impl SriovInfo {
    /// The SR-IOV view of an already discovered [`PciInfo`].
    #[must_use]
    pub fn from_pci(pci: &PciInfo) -> SriovInfo {
        SriovInfo {
            physical_functions: pci
                .devices
                .iter()
                .filter(|device| device.is_physical_function())
                .cloned()
                .collect(),
            virtual_functions: pci
                .devices
                .iter()
                .filter(|device| device.is_virtual_function())
                .cloned()
                .collect(),
        }
    }

    /// The VFs of the PF at `pf`, in `virtfn` order.
    #[must_use]
    pub fn virtual_functions_of(&self, pf: PciAddress) -> Vec<&PciDevice> {
        let Some(Function::Physical {
            virtual_functions, ..
        }) = self
            .physical_functions
            .iter()
            .find(|device| device.address == pf)
            .and_then(|device| device.function.as_ref())
        else {
            return Vec::new();
        };
        virtual_functions
            .iter()
            .filter_map(|vf| self.virtual_functions.iter().find(|device| device.address == *vf))
            .collect()
    }
}

impl Display for SriovInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SRIOV ({} phys {} virt devices)",
            self.physical_functions.len(),
            self.virtual_functions.len()
        )
    }
}

#[cfg(target_os = "linux")]
impl Discover for SriovInfo {
    fn discover(ctx: &Context) -> Result<Self, Error> {
        PciInfo::discover(ctx).map(|pci| SriovInfo::from_pci(&pci))
    }
}

unsupported_platform!(SriovInfo, Sriov);

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;
    use crate::context::Options;
    use crate::pci::db::PciIdsFile;
    use pretty_assertions::assert_eq;
    use test_utils::host::{self, NIC_PF, NIC_VFS};

    fn address(value: &str) -> PciAddress {
        value.parse().unwrap()
    }

    fn sample_pci(root: &test_utils::FakeRoot) -> (Context, PciInfo) {
        let ctx = Context::new(Options::default().with_chroot(root.path()));
        let pci = PciInfo::read(&ctx, &PciIdsFile::default());
        (ctx, pci)
    }

    #[test]
    fn parent_lists_each_child_at_its_index() {
        let root = host::sample_host();
        let (_ctx, pci) = sample_pci(&root);
        let sriov = SriovInfo::from_pci(&pci);
        assert_eq!(sriov.physical_functions.len(), 1);
        assert_eq!(sriov.virtual_functions.len(), 2);
        for vf in &sriov.virtual_functions {
            let Some(Function::Virtual { parent, index }) = vf.function else {
                panic!("{} is not a VF", vf.address);
            };
            let pf = pci.get_device(parent).unwrap();
            let Some(Function::Physical {
                virtual_functions, ..
            }) = &pf.function
            else {
                panic!("{parent} is not a PF");
            };
            assert_eq!(virtual_functions[index], vf.address);
        }
        assert_eq!(
            pci.get_device(address(NIC_PF)).unwrap().function,
            Some(Function::Physical {
                max_virtual: 8,
                virtual_functions: NIC_VFS.iter().map(|vf| address(vf)).collect(),
            })
        );
        let vfs: Vec<PciAddress> = sriov
            .virtual_functions_of(address(NIC_PF))
            .iter()
            .map(|vf| vf.address)
            .collect();
        assert_eq!(vfs, vec![address(NIC_VFS[0]), address(NIC_VFS[1])]);
        assert_eq!(sriov.to_string(), "SRIOV (1 phys 2 virt devices)");
    }

    #[test]
    fn pf_without_enabled_vfs() {
        let root = host::sample_host();
        let pf = format!("sys/devices/pci0000:00/{NIC_PF}");
        root.file(format!("{pf}/sriov_numvfs"), "0\n");
        let (_ctx, pci) = sample_pci(&root);
        assert_eq!(
            pci.get_device(address(NIC_PF)).unwrap().function,
            Some(Function::Physical {
                max_virtual: 8,
                virtual_functions: vec![],
            })
        );
        // the stale virtfn links are not followed
        assert_eq!(pci.get_device(address(NIC_VFS[0])).unwrap().function, None);
    }

    #[test]
    fn invalid_numvfs_fails_only_that_pf() {
        let root = host::sample_host();
        root.file(format!("sys/devices/pci0000:00/{NIC_PF}/sriov_numvfs"), "lots\n");
        let (ctx, mut pci) = sample_pci(&root);
        for device in &mut pci.devices {
            device.function = None;
        }
        let errors = annotate(&mut pci.devices, &ctx.paths());
        assert_eq!(
            errors,
            vec![SriovError::InvalidNumVfs {
                pf: address(NIC_PF),
                value: "lots".into(),
            }]
        );
        assert!(pci.devices.iter().all(|device| device.function.is_none()));
    }

    #[test]
    fn dangling_vf_names_the_missing_child() {
        let root = host::sample_host();
        let (ctx, mut pci) = sample_pci(&root);
        pci.devices
            .retain(|device| device.address != address(NIC_VFS[1]));
        for device in &mut pci.devices {
            device.function = None;
        }
        let errors = annotate(&mut pci.devices, &ctx.paths());
        assert_eq!(
            errors,
            vec![SriovError::DanglingVirtualFunction {
                pf: address(NIC_PF),
                vf: address(NIC_VFS[1]),
            }]
        );
        assert!(pci.devices.iter().all(|device| device.function.is_none()));
    }

    #[test]
    fn missing_virtfn_link() {
        let root = host::sample_host();
        root.remove(format!("sys/devices/pci0000:00/{NIC_PF}/virtfn1"));
        let (ctx, mut pci) = sample_pci(&root);
        let errors = annotate(&mut pci.devices, &ctx.paths());
        assert_eq!(
            errors,
            vec![SriovError::MissingLink {
                pf: address(NIC_PF),
                index: 1,
            }]
        );
    }

    #[test]
    fn serialized_with_a_kind_tag() {
        let function = Function::Virtual {
            parent: address(NIC_PF),
            index: 1,
        };
        assert_eq!(
            serde_json::to_value(&function).unwrap(),
            serde_json::json!({"kind": "virtual", "parent": NIC_PF, "index": 1})
        );
    }
}
