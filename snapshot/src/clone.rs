// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Mirror the pseudofiles the inventory reads into a scratch directory.
//!
//! Kernel pseudofiles report a meaningless size through `stat` (usually 4096 or 0), so an
//! archiver pointed directly at `/sys` would record truncated or empty entries.
//! The cloner reads every file to end of file and writes a true regular file instead.
//!
//! Paths are mirrored component by component.
//! Every symlink met on the way is recreated in the scratch tree (with its original, usually
//! relative, target) and the walk continues at the link's target, so the copy keeps the
//! `/sys/class/* -> /sys/devices/*` indirections the discovery code relies on.

use crate::SnapshotError;
use std::collections::{BTreeSet, VecDeque};
use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};
use sysfs::read::{is_symlink, read_dir, read_link};
use tracing::{debug, info, warn};

/// Decides whether a path in the source tree is recreated as a symlink.
///
/// Only consulted for the last component of a mirrored path; links in the middle of a path are
/// always recreated.
/// When the hook returns `false` the link is followed and its target copied in its place.
pub type IsSymlinkFn = dyn Fn(&Path) -> bool + Send + Sync;

const MAX_LINK_HOPS: usize = 40;

/// Directories which exist in every snapshot, even on hosts without the matching hardware.
const SKELETON: &[&str] = &["sys/block"];

/// Fixed glob patterns, relative to the source root.
const STATIC_PATTERNS: &[&str] = &[
    "proc/cpuinfo",
    "proc/meminfo",
    "proc/self/mounts",
    "etc/mtab",
    "sys/devices/system/cpu/online",
    "sys/devices/system/cpu/present",
    "sys/devices/system/cpu/possible",
    "sys/devices/system/cpu/cpu[0-9]*/topology/*",
    "sys/devices/system/cpu/cpu[0-9]*/cache/index*/*",
    "sys/devices/system/memory/block_size_bytes",
    "sys/devices/system/memory/memory[0-9]*/online",
    "sys/devices/system/node/online",
    "sys/devices/system/node/possible",
    "sys/devices/system/node/node[0-9]*/cpu*",
    "sys/devices/system/node/node[0-9]*/distance",
    "sys/devices/system/node/node[0-9]*/meminfo",
    "sys/devices/system/node/node[0-9]*/memory[0-9]*",
    "sys/devices/system/node/node[0-9]*/hugepages/hugepages-*/*",
    "sys/kernel/mm/hugepages/hugepages-*/*",
    "sys/class/drm/card[0-9]*",
    "sys/class/dmi/id/*",
    "run/udev/data/b*",
];

/// Per PCI function files the resolver and the SR-IOV graph read.
const PCI_DEVICE_FILES: &[&str] = &[
    "class",
    "device",
    "driver",
    "iommu_group",
    "irq",
    "local_cpulist",
    "modalias",
    "numa_node",
    "revision",
    "vendor",
    "subsystem",
    "sriov_totalvfs",
    "sriov_numvfs",
    "physfn",
];

/// Per interface files. `address` is never cloned: snapshots must not carry MACs.
const NET_DEVICE_FILES: &[&str] = &[
    "addr_assign_type",
    "speed",
    "duplex",
    "device",
    "device/subsystem",
];

const USB_DEVICE_FILES: &[&str] = &["uevent", "interface", "product"];

const BLOCK_DEVICE_FILES: &[&str] = &[
    "dev",
    "size",
    "removable",
    "ro",
    "queue/rotational",
    "queue/physical_block_size",
    "device/vendor",
    "device/model",
    "device/numa_node",
];

const PARTITION_FILES: &[&str] = &["dev", "size", "ro"];

/// What a clone run wrote.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CloneReport {
    /// Regular files copied.
    pub files: usize,
    /// Symlinks recreated.
    pub links: usize,
    /// Directories created for directory leaves.
    pub dirs: usize,
    /// Paths which could not be read and were left out.
    pub skipped: usize,
}

/// Copies the inventory relevant subset of a host tree into a scratch directory.
pub struct Cloner {
    source: PathBuf,
    dest: PathBuf,
    is_symlink: Box<IsSymlinkFn>,
}

impl std::fmt::Debug for Cloner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cloner")
            .field("source", &self.source)
            .field("dest", &self.dest)
            .finish_non_exhaustive()
    }
}

/// A leading `..` is clamped at the root, as the kernel does for `/..`.
fn push_components(queue: &mut VecDeque<OsString>, path: &Path) {
    for component in path.components().rev() {
        match component {
            Component::Normal(part) => queue.push_front(part.to_os_string()),
            Component::ParentDir => queue.push_front(OsString::from("..")),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
}

/// True iff `name` looks like a sysfs PCI function directory (`DDDD:BB:SS.F`).
///
/// The domain may be wider than four digits (e.g. VMD domains).
#[must_use]
pub fn is_pci_address(name: &str) -> bool {
    let hex = |part: &str, len: Option<usize>| {
        !part.is_empty()
            && len.is_none_or(|len| part.len() == len)
            && part.chars().all(|c| c.is_ascii_hexdigit())
    };
    let mut parts = name.splitn(3, ':');
    let (Some(domain), Some(bus), Some(rest)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    let Some((slot, function)) = rest.split_once('.') else {
        return false;
    };
    domain.len() >= 4
        && hex(domain, None)
        && hex(bus, Some(2))
        && hex(slot, Some(2))
        && hex(function, Some(1))
}

impl Cloner {
    /// A cloner copying from the host rooted at `source` into `dest`.
    pub fn new(source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Cloner {
        Cloner {
            source: source.into(),
            dest: dest.into(),
            is_symlink: Box::new(|path: &Path| is_symlink(path)),
        }
    }

    /// Replace the hook deciding which leaf symlinks are preserved.
    #[must_use]
    pub fn with_is_symlink(
        mut self,
        hook: impl Fn(&Path) -> bool + Send + Sync + 'static,
    ) -> Cloner {
        self.is_symlink = Box::new(hook);
        self
    }

    /// Clone everything: skeleton, static patterns, then dynamically discovered devices.
    ///
    /// # Errors
    ///
    /// Fails on an invalid glob pattern or when the scratch tree can not be written.
    /// Unreadable source files are skipped (and counted in [`CloneReport::skipped`]).
    pub fn run(&self) -> Result<CloneReport, SnapshotError> {
        for dir in SKELETON {
            let path = self.dest.join(dir);
            fs::create_dir_all(&path).map_err(SnapshotError::io(path))?;
        }
        let mut wanted = self.static_content()?;
        wanted.extend(self.network_content());
        wanted.extend(self.pci_content());
        wanted.extend(self.usb_content());
        wanted.extend(self.block_content());

        let mut report = CloneReport::default();
        for rel in &wanted {
            self.mirror(rel, &mut report)?;
        }
        info!(
            source = %self.source.display(),
            dest = %self.dest.display(),
            paths = wanted.len(),
            ?report,
            "clone complete"
        );
        Ok(report)
    }

    /// Expand the fixed glob patterns into paths relative to the source root.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Pattern`] if a pattern is rejected by the glob engine.
    pub fn static_content(&self) -> Result<BTreeSet<PathBuf>, SnapshotError> {
        let base = glob::Pattern::escape(&self.source.to_string_lossy());
        let mut out = BTreeSet::new();
        for pattern in STATIC_PATTERNS {
            let full = format!("{}/{pattern}", base.trim_end_matches('/'));
            let matches = glob::glob(&full).map_err(|source| SnapshotError::Pattern {
                pattern: (*pattern).to_string(),
                source,
            })?;
            for found in matches {
                match found {
                    Ok(path) => {
                        if let Ok(rel) = path.strip_prefix(&self.source) {
                            out.insert(rel.to_path_buf());
                        }
                    }
                    Err(err) => warn!(pattern, "glob walk error: {err}"),
                }
            }
        }
        Ok(out)
    }

    fn listed(&self, rel: impl AsRef<Path>) -> Vec<String> {
        read_dir(self.source.join(rel))
    }

    /// Non virtual network interfaces and their backing device links.
    #[must_use]
    pub fn network_content(&self) -> BTreeSet<PathBuf> {
        let class = Path::new("sys/class/net");
        let mut out = BTreeSet::new();
        for name in self.listed(class) {
            let link = class.join(&name);
            let virtual_device = read_link(self.source.join(&link))
                .is_some_and(|target| target.to_string_lossy().contains("devices/virtual/net"));
            if virtual_device {
                debug!(interface = name, "skipping virtual interface");
                continue;
            }
            out.insert(link.clone());
            out.extend(NET_DEVICE_FILES.iter().map(|file| link.join(file)));
        }
        out
    }

    /// Breadth first walk of the PCI tree from `sys/bus/pci/devices`.
    ///
    /// A function with PCI function subdirectories is a bridge; its directory becomes another
    /// root of the walk.
    #[must_use]
    pub fn pci_content(&self) -> BTreeSet<PathBuf> {
        let mut out = BTreeSet::new();
        let mut queue = VecDeque::from([PathBuf::from("sys/bus/pci/devices")]);
        let mut visited = BTreeSet::new();
        while let Some(dir) = queue.pop_front() {
            if !visited.insert(dir.clone()) {
                continue;
            }
            for name in self.listed(&dir) {
                if !is_pci_address(&name) {
                    continue;
                }
                let device = dir.join(&name);
                out.insert(device.clone());
                out.extend(PCI_DEVICE_FILES.iter().map(|file| device.join(file)));
                let children = self.listed(&device);
                out.extend(
                    children
                        .iter()
                        .filter(|child| child.starts_with("virtfn"))
                        .map(|child| device.join(child)),
                );
                let is_bridge = children.iter().any(|child| {
                    is_pci_address(child) && self.source.join(&device).join(child).is_dir()
                });
                if is_bridge {
                    debug!(bridge = name, "descending into PCI bridge");
                    queue.push_back(device);
                }
            }
        }
        out
    }

    /// USB device links and the files the USB section reads.
    #[must_use]
    pub fn usb_content(&self) -> BTreeSet<PathBuf> {
        let bus = Path::new("sys/bus/usb/devices");
        let mut out = BTreeSet::new();
        for name in self.listed(bus) {
            let link = bus.join(&name);
            out.insert(link.clone());
            out.extend(USB_DEVICE_FILES.iter().map(|file| link.join(file)));
        }
        out
    }

    /// Disks, their partitions, and every `numa_node` file on the way up to `/sys`.
    #[must_use]
    pub fn block_content(&self) -> BTreeSet<PathBuf> {
        let class = Path::new("sys/block");
        let mut out = BTreeSet::new();
        for name in self.listed(class) {
            let link = class.join(&name);
            out.insert(link.clone());
            out.extend(BLOCK_DEVICE_FILES.iter().map(|file| link.join(file)));
            for child in self.listed(&link) {
                if child.starts_with(&name) && self.source.join(&link).join(&child).is_dir() {
                    out.extend(PARTITION_FILES.iter().map(|file| link.join(&child).join(file)));
                }
            }
            if let Some(real) = self.resolve(&link) {
                out.extend(
                    real.ancestors()
                        .skip(1)
                        .take_while(|ancestor| {
                            ancestor.starts_with("sys") && *ancestor != Path::new("sys")
                        })
                        .map(|ancestor| ancestor.join("numa_node")),
                );
            }
        }
        out
    }

    /// Resolve every symlink in `rel` (relative to the source root), without touching the
    /// scratch tree.
    fn resolve(&self, rel: &Path) -> Option<PathBuf> {
        let mut pending = VecDeque::new();
        push_components(&mut pending, rel);
        let mut resolved = PathBuf::new();
        let mut hops = 0;
        while let Some(part) = pending.pop_front() {
            if part == ".." {
                resolved.pop();
                continue;
            }
            let candidate = resolved.join(&part);
            let source = self.source.join(&candidate);
            if is_symlink(&source) {
                hops += 1;
                if hops > MAX_LINK_HOPS {
                    return None;
                }
                let target = read_link(&source)?;
                if target.is_absolute() {
                    resolved = PathBuf::new();
                }
                push_components(&mut pending, &target);
            } else {
                resolved = candidate;
            }
        }
        Some(resolved)
    }

    /// Mirror one relative path from the source tree into the scratch tree.
    fn mirror(&self, rel: &Path, report: &mut CloneReport) -> Result<(), SnapshotError> {
        let mut pending = VecDeque::new();
        push_components(&mut pending, rel);
        let mut resolved = PathBuf::new();
        let mut hops = 0;
        while let Some(part) = pending.pop_front() {
            if part == ".." {
                resolved.pop();
                continue;
            }
            let candidate = resolved.join(&part);
            let source = self.source.join(&candidate);
            let last = pending.is_empty();
            let Ok(meta) = source.symlink_metadata() else {
                debug!(path = %source.display(), "not present, not cloned");
                return Ok(());
            };
            if meta.file_type().is_symlink() && (!last || (self.is_symlink)(&source)) {
                let target = fs::read_link(&source).map_err(SnapshotError::io(&source))?;
                self.recreate_link(&candidate, &target, report)?;
                if last {
                    return Ok(());
                }
                hops += 1;
                if hops > MAX_LINK_HOPS {
                    warn!(path = %rel.display(), "too many levels of symbolic links, not cloned");
                    return Ok(());
                }
                if target.is_absolute() {
                    resolved = PathBuf::new();
                }
                push_components(&mut pending, &target);
            } else if last {
                self.copy_leaf(&candidate, &source, report)?;
            } else {
                resolved = candidate;
            }
        }
        Ok(())
    }

    fn recreate_link(
        &self,
        rel: &Path,
        target: &Path,
        report: &mut CloneReport,
    ) -> Result<(), SnapshotError> {
        let dest = self.dest.join(rel);
        if dest.symlink_metadata().is_ok() {
            return Ok(());
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(SnapshotError::io(parent))?;
        }
        std::os::unix::fs::symlink(target, &dest).map_err(SnapshotError::io(&dest))?;
        report.links += 1;
        Ok(())
    }

    fn copy_leaf(
        &self,
        rel: &Path,
        source: &Path,
        report: &mut CloneReport,
    ) -> Result<(), SnapshotError> {
        let dest = self.dest.join(rel);
        if source.is_dir() {
            fs::create_dir_all(&dest).map_err(SnapshotError::io(&dest))?;
            report.dirs += 1;
            return Ok(());
        }
        // read to EOF: stat sizes of pseudofiles are not to be trusted
        let contents = match fs::read(source) {
            Ok(contents) => contents,
            Err(err) => {
                debug!(path = %source.display(), "unreadable, not cloned: {err}");
                report.skipped += 1;
                return Ok(());
            }
        };
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(SnapshotError::io(parent))?;
        }
        fs::write(&dest, contents).map_err(SnapshotError::io(&dest))?;
        report.files += 1;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_utils::FakeRoot;
    use test_utils::host::{self, sample_host};

    fn read(root: &Path, rel: &str) -> String {
        fs::read_to_string(root.join(rel)).unwrap()
    }

    #[test]
    fn pci_address_names() {
        assert!(is_pci_address("0000:00:1f.3"));
        assert!(is_pci_address("10000:e0:06.0"));
        assert!(!is_pci_address("pci0000:00"));
        assert!(!is_pci_address("00:1f.3"));
        assert!(!is_pci_address("0000:00:1f"));
        assert!(!is_pci_address("0000:00:1f.3:extra"));
    }

    #[test]
    fn pci_walk_descends_through_bridges() {
        let host = sample_host();
        let cloner = Cloner::new(host.path(), "/nonexistent");
        let content = cloner.pci_content();
        let bridged = PathBuf::from(format!(
            "sys/bus/pci/devices/{}/{}/modalias",
            host::BRIDGE,
            host::GPU
        ));
        assert!(content.contains(&bridged), "{content:#?}");
        assert!(content.contains(&PathBuf::from(format!(
            "sys/bus/pci/devices/{}/virtfn1",
            host::NIC_PF
        ))));
    }

    #[test]
    fn virtual_interfaces_and_addresses_are_left_out() {
        let host = sample_host();
        let content = Cloner::new(host.path(), "/nonexistent").network_content();
        assert!(content.contains(Path::new("sys/class/net/eth0/addr_assign_type")));
        assert!(!content.iter().any(|path| path.ends_with("address")));
        assert!(!content.iter().any(|path| path.starts_with("sys/class/net/veth0")));
        assert!(!content.iter().any(|path| path.starts_with("sys/class/net/lo")));
    }

    #[test]
    fn clone_preserves_links_and_content() {
        let host = sample_host();
        let scratch = FakeRoot::new();
        let report = Cloner::new(host.path(), scratch.path()).run().unwrap();
        assert!(report.files > 0);
        assert!(report.links > 0);

        let dest = scratch.path();
        assert!(is_symlink(dest.join("sys/class/net/eth0")));
        assert!(is_symlink(dest.join("sys/block/sda")));
        assert!(is_symlink(dest.join("sys/class/dmi/id")));
        assert_eq!(read(dest, "sys/class/net/eth0/addr_assign_type"), "0\n");
        assert!(!dest.join("sys/class/net/eth0/address").exists());
        assert_eq!(read(dest, "sys/block/sda/sda2/size"), "1952474000\n");
        assert_eq!(read(dest, "sys/block/sda/queue/rotational"), "1\n");
        assert_eq!(
            read(dest, &format!("sys/bus/pci/devices/{}/numa_node", host::SATA)),
            "0\n"
        );
        assert_eq!(read(dest, "sys/class/dmi/id/chassis_type"), "3\n");
        assert_eq!(read(dest, "run/udev/data/b8:0"), read(host.path(), "run/udev/data/b8:0"));
        assert_eq!(
            fs::read_link(dest.join(format!("sys/bus/pci/devices/{}/virtfn0", host::NIC_PF)))
                .unwrap(),
            PathBuf::from(format!("../{}", host::NIC_VFS[0]))
        );
        assert!(dest.join("sys/block").is_dir());
    }

    #[test]
    fn hook_can_flatten_leaf_links() {
        let source = FakeRoot::new();
        source
            .file("sys/devices/virtual/dmi/id/bios_vendor", "Acme\n")
            .symlink("sys/class/dmi/id", "../../devices/virtual/dmi/id")
            .file("proc/cpuinfo", "processor\t: 0\n")
            .symlink("etc/mtab", "../proc/cpuinfo");
        let scratch = FakeRoot::new();
        Cloner::new(source.path(), scratch.path())
            .with_is_symlink(|path| !path.ends_with("etc/mtab") && is_symlink(path))
            .run()
            .unwrap();
        // intermediate links are always kept
        assert!(is_symlink(scratch.join("sys/class/dmi/id")));
        assert!(!is_symlink(scratch.join("etc/mtab")));
        assert_eq!(read(scratch.path(), "etc/mtab"), "processor\t: 0\n");
    }

    #[test]
    fn missing_trees_only_produce_the_skeleton() {
        let source = FakeRoot::new();
        let scratch = FakeRoot::new();
        let report = Cloner::new(source.path(), scratch.path()).run().unwrap();
        assert_eq!(report, CloneReport::default());
        assert!(scratch.join("sys/block").is_dir());
    }
}
