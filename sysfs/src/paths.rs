// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Composition of pseudofile paths from a chroot and per-subtree overrides.
//!
//! Call sites never concatenate strings to form a path.
//! They ask [`Paths`] for a [`LogicalPath`] (or one of the parameterized helpers) and join
//! relative components onto the result.
//!
//! # Examples
//!
//! ```
//! use hwinv_sysfs::{PathOverrides, Paths, Root};
//! use std::path::Path;
//!
//! let overrides = PathOverrides::default().with(Root::Proc, "/host-proc");
//! let paths = Paths::new("/snapshot", overrides);
//! assert_eq!(paths.proc_meminfo(), Path::new("/snapshot/host-proc/meminfo"));
//! assert_eq!(paths.sys_block(), Path::new("/snapshot/sys/block"));
//! ```

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// A top level directory of the host filesystem which may be relocated by an override.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    strum::AsRefStr,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
)]
pub enum Root {
    /// `/proc`
    #[strum(serialize = "/proc")]
    Proc,
    /// `/sys`
    #[strum(serialize = "/sys")]
    Sys,
    /// `/run`
    #[strum(serialize = "/run")]
    Run,
    /// `/etc`
    #[strum(serialize = "/etc")]
    Etc,
    /// `/var`
    #[strum(serialize = "/var")]
    Var,
}

impl Root {
    /// The location of this root on an unmodified host.
    #[must_use]
    pub fn default_path(self) -> &'static Path {
        Path::new(match self {
            Root::Proc => "/proc",
            Root::Sys => "/sys",
            Root::Run => "/run",
            Root::Etc => "/etc",
            Root::Var => "/var",
        })
    }
}

/// Replacement locations for some of the [`Root`] directories.
///
/// An override replaces only the root it names.
/// The chroot is prepended to the override unconditionally.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PathOverrides(BTreeMap<Root, PathBuf>);

impl PathOverrides {
    /// Add (or replace) the override for `root`.
    #[must_use]
    pub fn with(mut self, root: Root, path: impl Into<PathBuf>) -> Self {
        self.insert(root, path);
        self
    }

    /// Add (or replace) the override for `root`.
    pub fn insert(&mut self, root: Root, path: impl Into<PathBuf>) {
        self.0.insert(root, path.into());
    }

    /// The override for `root`, if one is set.
    #[must_use]
    pub fn get(&self, root: Root) -> Option<&Path> {
        self.0.get(&root).map(PathBuf::as_path)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Root, PathBuf)> for PathOverrides {
    fn from_iter<T: IntoIterator<Item = (Root, PathBuf)>>(iter: T) -> Self {
        PathOverrides(iter.into_iter().collect())
    }
}

/// The enumerated set of well known pseudofile locations.
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
#[strum(serialize_all = "snake_case")]
pub enum LogicalPath {
    VarLog,
    ProcMeminfo,
    ProcCpuinfo,
    ProcMounts,
    SysKernelMmHugepages,
    SysBlock,
    SysDevicesSystemNode,
    SysDevicesSystemMemory,
    SysDevicesSystemCpu,
    SysBusPciDevices,
    SysBusUsbDevices,
    SysClassDrm,
    SysClassDmi,
    SysClassNet,
    RunUdevData,
}

impl LogicalPath {
    /// The [`Root`] this path lives under.
    #[must_use]
    pub const fn root(self) -> Root {
        match self {
            LogicalPath::VarLog => Root::Var,
            LogicalPath::ProcMeminfo | LogicalPath::ProcCpuinfo | LogicalPath::ProcMounts => {
                Root::Proc
            }
            LogicalPath::RunUdevData => Root::Run,
            LogicalPath::SysKernelMmHugepages
            | LogicalPath::SysBlock
            | LogicalPath::SysDevicesSystemNode
            | LogicalPath::SysDevicesSystemMemory
            | LogicalPath::SysDevicesSystemCpu
            | LogicalPath::SysBusPciDevices
            | LogicalPath::SysBusUsbDevices
            | LogicalPath::SysClassDrm
            | LogicalPath::SysClassDmi
            | LogicalPath::SysClassNet => Root::Sys,
        }
    }

    /// The location of this path relative to its [`Root`].
    #[must_use]
    pub const fn relative(self) -> &'static str {
        match self {
            LogicalPath::VarLog => "log",
            LogicalPath::ProcMeminfo => "meminfo",
            LogicalPath::ProcCpuinfo => "cpuinfo",
            LogicalPath::ProcMounts => "self/mounts",
            LogicalPath::SysKernelMmHugepages => "kernel/mm/hugepages",
            LogicalPath::SysBlock => "block",
            LogicalPath::SysDevicesSystemNode => "devices/system/node",
            LogicalPath::SysDevicesSystemMemory => "devices/system/memory",
            LogicalPath::SysDevicesSystemCpu => "devices/system/cpu",
            LogicalPath::SysBusPciDevices => "bus/pci/devices",
            LogicalPath::SysBusUsbDevices => "bus/usb/devices",
            LogicalPath::SysClassDrm => "class/drm",
            LogicalPath::SysClassDmi => "class/dmi",
            LogicalPath::SysClassNet => "class/net",
            LogicalPath::RunUdevData => "udev/data",
        }
    }
}

/// Join `path` onto `base`, treating `path` as relative even if it is absolute.
///
/// [`PathBuf::join`] replaces the base when handed an absolute path, which is exactly the
/// behavior we must never have when composing paths under a chroot.
#[must_use]
pub fn join_under(base: &Path, path: &Path) -> PathBuf {
    let mut out = base.to_path_buf();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::ParentDir => out.push(".."),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    out
}

/// Concrete pseudofile locations derived from a chroot and a set of overrides.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Paths {
    chroot: PathBuf,
    overrides: PathOverrides,
}

impl Default for Paths {
    fn default() -> Self {
        Paths::new("/", PathOverrides::default())
    }
}

macro_rules! logical_accessors {
    ($($name:ident => $variant:ident),* $(,)?) => {
        $(
            #[doc = concat!("The location of [`LogicalPath::", stringify!($variant), "`].")]
            #[must_use]
            pub fn $name(&self) -> PathBuf {
                self.resolve(LogicalPath::$variant)
            }
        )*
    };
}

impl Paths {
    #[must_use]
    pub fn new(chroot: impl Into<PathBuf>, overrides: PathOverrides) -> Paths {
        Paths {
            chroot: chroot.into(),
            overrides,
        }
    }

    /// The directory every other path is composed under.
    #[must_use]
    pub fn chroot(&self) -> &Path {
        &self.chroot
    }

    #[must_use]
    pub fn overrides(&self) -> &PathOverrides {
        &self.overrides
    }

    /// The effective location of `root` (chroot + override or default location).
    #[must_use]
    pub fn root(&self, root: Root) -> PathBuf {
        let relocated = self
            .overrides
            .get(root)
            .unwrap_or_else(|| root.default_path());
        join_under(&self.chroot, relocated)
    }

    /// The effective location of a [`LogicalPath`].
    #[must_use]
    pub fn resolve(&self, path: LogicalPath) -> PathBuf {
        self.root(path.root()).join(path.relative())
    }

    logical_accessors! {
        var_log => VarLog,
        proc_meminfo => ProcMeminfo,
        proc_cpuinfo => ProcCpuinfo,
        proc_mounts => ProcMounts,
        sys_kernel_mm_hugepages => SysKernelMmHugepages,
        sys_block => SysBlock,
        sys_devices_system_node => SysDevicesSystemNode,
        sys_devices_system_memory => SysDevicesSystemMemory,
        sys_devices_system_cpu => SysDevicesSystemCpu,
        sys_bus_pci_devices => SysBusPciDevices,
        sys_bus_usb_devices => SysBusUsbDevices,
        sys_class_drm => SysClassDrm,
        sys_class_dmi => SysClassDmi,
        sys_class_net => SysClassNet,
        run_udev_data => RunUdevData,
    }

    /// `node<node>` under [`LogicalPath::SysDevicesSystemNode`].
    #[must_use]
    pub fn node(&self, node: usize) -> PathBuf {
        self.sys_devices_system_node().join(format!("node{node}"))
    }

    /// The logical processor `cpu<lp>` as seen from NUMA node `node`.
    #[must_use]
    pub fn node_cpu(&self, node: usize, lp: usize) -> PathBuf {
        self.node(node).join(format!("cpu{lp}"))
    }

    /// Cache descriptor `index<cache_index>` of logical processor `lp` on NUMA node `node`.
    #[must_use]
    pub fn node_cpu_cache_index(&self, node: usize, lp: usize, cache_index: usize) -> PathBuf {
        self.node_cpu(node, lp)
            .join("cache")
            .join(format!("index{cache_index}"))
    }

    /// The logical processor `cpu<lp>` under [`LogicalPath::SysDevicesSystemCpu`].
    #[must_use]
    pub fn system_cpu(&self, lp: usize) -> PathBuf {
        self.sys_devices_system_cpu().join(format!("cpu{lp}"))
    }

    /// The `/sys` directory itself (after overrides).
    #[must_use]
    pub fn sys(&self) -> PathBuf {
        self.root(Root::Sys)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn default_paths_live_under_slash() {
        let paths = Paths::default();
        assert_eq!(paths.sys_block(), PathBuf::from("/sys/block"));
        assert_eq!(paths.proc_mounts(), PathBuf::from("/proc/self/mounts"));
        assert_eq!(paths.run_udev_data(), PathBuf::from("/run/udev/data"));
        assert_eq!(paths.var_log(), PathBuf::from("/var/log"));
    }

    #[test]
    fn chroot_is_prepended() {
        let paths = Paths::new("/tmp/host", PathOverrides::default());
        assert_eq!(
            paths.sys_bus_pci_devices(),
            PathBuf::from("/tmp/host/sys/bus/pci/devices")
        );
        assert_eq!(
            paths.sys_kernel_mm_hugepages(),
            PathBuf::from("/tmp/host/sys/kernel/mm/hugepages")
        );
    }

    #[test]
    fn override_replaces_only_its_root() {
        let overrides = PathOverrides::default().with(Root::Proc, "/host-proc");
        let paths = Paths::new("/", overrides);
        assert_eq!(paths.proc_cpuinfo(), PathBuf::from("/host-proc/cpuinfo"));
        assert_eq!(paths.sys_class_net(), PathBuf::from("/sys/class/net"));
    }

    #[test]
    fn chroot_applies_to_overrides() {
        let overrides = PathOverrides::default()
            .with(Root::Sys, "/host-sys")
            .with(Root::Run, "alt-run");
        let paths = Paths::new("/chroot", overrides);
        assert_eq!(
            paths.sys_class_dmi(),
            PathBuf::from("/chroot/host-sys/class/dmi")
        );
        assert_eq!(
            paths.run_udev_data(),
            PathBuf::from("/chroot/alt-run/udev/data")
        );
    }

    #[test]
    fn parameterized_node_paths() {
        let paths = Paths::new("/c", PathOverrides::default());
        assert_eq!(
            paths.node_cpu(1, 12),
            PathBuf::from("/c/sys/devices/system/node/node1/cpu12")
        );
        assert_eq!(
            paths.node_cpu_cache_index(0, 3, 2),
            PathBuf::from("/c/sys/devices/system/node/node0/cpu3/cache/index2")
        );
    }

    #[test]
    fn every_logical_path_resolves_under_its_root() {
        let paths = Paths::new("/c", PathOverrides::default());
        for logical in LogicalPath::iter() {
            let resolved = paths.resolve(logical);
            assert!(resolved.starts_with(paths.root(logical.root())), "{logical}");
        }
    }

    #[test]
    fn logical_path_names_are_snake_case() {
        assert_eq!(LogicalPath::SysBusPciDevices.to_string(), "sys_bus_pci_devices");
        assert_eq!(
            LogicalPath::from_str("run_udev_data").unwrap(),
            LogicalPath::RunUdevData
        );
    }

    #[test]
    fn roots_parse_from_their_paths() {
        assert_eq!(Root::from_str("/proc").unwrap(), Root::Proc);
        assert!(Root::from_str("/home").is_err());
    }

    #[test]
    fn join_under_never_escapes_the_base() {
        assert_eq!(
            join_under(Path::new("/base"), Path::new("/etc/passwd")),
            PathBuf::from("/base/etc/passwd")
        );
    }
}
