// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Processors: physical packages, their cores and logical processors.
//!
//! The package level attributes (vendor, model, flags) come from `/proc/cpuinfo`.
//! The core layout comes from `/sys/devices/system/cpu/cpu<N>/topology`, falling back to the
//! `core id` attribute of `/proc/cpuinfo` where sysfs has no topology.

use crate::context::Context;
use crate::support::counted;
use crate::{Discover, Error, UNKNOWN, unsupported_platform};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::Path;
use sysfs::read::{key_values, read_dir, read_parsed, read_trimmed};
use tracing::debug;

/// A physical core and the logical processors (hardware threads) it runs.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Core {
    /// The kernel's `core_id` (unique within a package only).
    pub id: usize,
    /// Position of the core within its processor (or NUMA node).
    pub index: usize,
    pub num_threads: usize,
    /// Logical processor ids, ascending.
    pub logical_processors: Vec<usize>,
}

impl Display for Core {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "processor core #{} ({}) {:?}",
            self.index,
            counted(self.num_threads, "thread"),
            self.logical_processors
        )
    }
}

/// A physical package.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Processor {
    /// The `physical id` of the package.
    pub id: usize,
    pub vendor: String,
    pub model: String,
    pub total_cores: usize,
    pub total_hardware_threads: usize,
    /// CPU flags, in the order the kernel lists them.
    pub capabilities: Vec<String>,
    pub cores: Vec<Core>,
}

impl Processor {
    #[must_use]
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|flag| flag == capability)
    }
}

impl Display for Processor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "physical package #{} ({}, {}) {} - {}",
            self.id,
            counted(self.total_cores, "core"),
            counted(self.total_hardware_threads, "hardware thread"),
            self.vendor,
            self.model
        )
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct CpuInfo {
    pub total_cores: usize,
    pub total_hardware_threads: usize,
    pub processors: Vec<Processor>,
}

impl Display for CpuInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cpu ({}, {}, {})",
            counted(self.processors.len(), "physical package"),
            counted(self.total_cores, "core"),
            counted(self.total_hardware_threads, "hardware thread")
        )
    }
}

/// The ids of the `cpu<N>` entries of `dir` (ignoring `cpufreq`, `cpulist`, ...), ascending.
pub(crate) fn logical_processors(dir: &Path) -> Vec<usize> {
    let mut ids: Vec<usize> = read_dir(dir)
        .iter()
        .filter_map(|name| name.strip_prefix("cpu")?.parse().ok())
        .collect();
    ids.sort_unstable();
    ids
}

/// `(physical_package_id, core_id)` of the logical processor whose sysfs directory is `cpu`.
pub(crate) fn core_key(cpu: &Path) -> Option<(usize, usize)> {
    let topology = cpu.join("topology");
    Some((
        read_parsed(topology.join("physical_package_id"))?,
        read_parsed(topology.join("core_id"))?,
    ))
}

/// Group logical processors into cores, ordered by key, with ascending logical processors.
pub(crate) fn build_cores<K: Ord>(
    members: impl IntoIterator<Item = (K, usize, usize)>,
) -> Vec<Core> {
    let mut grouped: BTreeMap<K, (usize, Vec<usize>)> = BTreeMap::new();
    for (key, core_id, lp) in members {
        grouped.entry(key).or_insert_with(|| (core_id, Vec::new())).1.push(lp);
    }
    grouped
        .into_values()
        .enumerate()
        .map(|(index, (id, mut logical_processors))| {
            logical_processors.sort_unstable();
            logical_processors.dedup();
            Core {
                id,
                index,
                num_threads: logical_processors.len(),
                logical_processors,
            }
        })
        .collect()
}

/// One `processor` block of `/proc/cpuinfo`.
struct CpuinfoEntry {
    attributes: BTreeMap<String, String>,
}

impl CpuinfoEntry {
    fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    fn number(&self, key: &str) -> Option<usize> {
        self.get(key)?.parse().ok()
    }

    /// Machines without packages (many VMs, some ARM kernels) omit `physical id`.
    fn package(&self) -> usize {
        self.number("physical id").unwrap_or(0)
    }
}

fn parse_cpuinfo(contents: &str) -> Vec<CpuinfoEntry> {
    contents
        .split("\n\n")
        .map(|block| CpuinfoEntry {
            attributes: key_values(block, ':'),
        })
        .filter(|entry| entry.get("processor").is_some())
        .collect()
}

fn read_cpus(ctx: &Context) -> CpuInfo {
    let paths = ctx.paths();
    let entries = read_trimmed(paths.proc_cpuinfo())
        .map(|contents| parse_cpuinfo(&contents))
        .unwrap_or_default();

    // package -> (package id, core id, logical processor)
    let mut layout: BTreeMap<usize, Vec<((usize, usize), usize, usize)>> = BTreeMap::new();
    let system_cpu = paths.sys_devices_system_cpu();
    for lp in logical_processors(&system_cpu) {
        if let Some((package, core)) = core_key(&paths.system_cpu(lp)) {
            layout.entry(package).or_default().push(((package, core), core, lp));
        }
    }
    if layout.is_empty() {
        debug!("no sysfs cpu topology, using /proc/cpuinfo core ids");
        for entry in &entries {
            let (Some(lp), Some(core)) = (entry.number("processor"), entry.number("core id")) else {
                continue;
            };
            let package = entry.package();
            layout.entry(package).or_default().push(((package, core), core, lp));
        }
    }

    let mut packages: BTreeMap<usize, Option<&CpuinfoEntry>> =
        layout.keys().map(|package| (*package, None)).collect();
    for entry in &entries {
        let first = packages.entry(entry.package()).or_insert(None);
        if first.is_none() {
            *first = Some(entry);
        }
    }

    let processors: Vec<Processor> = packages
        .into_iter()
        .map(|(id, entry)| {
            let cores = build_cores(layout.remove(&id).unwrap_or_default());
            let attribute = |key: &str| {
                entry
                    .and_then(|entry| entry.get(key))
                    .filter(|value| !value.is_empty())
                    .map_or_else(|| UNKNOWN.to_string(), str::to_string)
            };
            let listed = |key: &str| entry.and_then(|entry| entry.number(key)).unwrap_or(0);
            let (total_cores, total_hardware_threads) = if cores.is_empty() {
                (listed("cpu cores"), listed("siblings"))
            } else {
                (cores.len(), cores.iter().map(|core| core.num_threads).sum())
            };
            Processor {
                id,
                vendor: attribute("vendor_id"),
                model: attribute("model name"),
                total_cores,
                total_hardware_threads,
                capabilities: entry
                    .and_then(|entry| entry.get("flags"))
                    .map(|flags| flags.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default(),
                cores,
            }
        })
        .collect();

    CpuInfo {
        total_cores: processors.iter().map(|p| p.total_cores).sum(),
        total_hardware_threads: processors.iter().map(|p| p.total_hardware_threads).sum(),
        processors,
    }
}

#[cfg(target_os = "linux")]
impl Discover for CpuInfo {
    fn discover(ctx: &Context) -> Result<Self, Error> {
        ctx.run(read_cpus)
    }
}

unsupported_platform!(CpuInfo, Cpu);

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;
    use crate::context::Options;
    use pretty_assertions::assert_eq;
    use test_utils::FakeRoot;
    use test_utils::host;

    fn discover(root: &FakeRoot) -> CpuInfo {
        CpuInfo::discover(&Context::new(Options::default().with_chroot(root.path()))).unwrap()
    }

    #[test]
    fn sample_host_package() {
        let cpu = discover(&host::sample_host());
        assert_eq!(cpu.processors.len(), 1);
        let package = &cpu.processors[0];
        assert_eq!(package.vendor, "GenuineIntel");
        assert_eq!(package.model, "Intel(R) Xeon(R) CPU E3-1230 v5 @ 3.40GHz");
        assert_eq!(package.total_cores, 2);
        assert_eq!(package.total_hardware_threads, 4);
        assert!(package.has_capability("sse2"));
        assert!(!package.has_capability("avx512f"));
        assert_eq!(
            package.cores,
            vec![
                Core {
                    id: 0,
                    index: 0,
                    num_threads: 2,
                    logical_processors: vec![0, 2],
                },
                Core {
                    id: 1,
                    index: 1,
                    num_threads: 2,
                    logical_processors: vec![1, 3],
                },
            ]
        );
        assert_eq!(
            cpu.to_string(),
            "cpu (1 physical package, 2 cores, 4 hardware threads)"
        );
    }

    #[test]
    fn cores_from_cpuinfo_without_sysfs_topology() {
        let root = FakeRoot::new();
        root.file(
            "proc/cpuinfo",
            "processor\t: 0\nvendor_id\t: AuthenticAMD\nphysical id\t: 1\ncore id\t: 3\n\n\
             processor\t: 1\nvendor_id\t: AuthenticAMD\nphysical id\t: 1\ncore id\t: 3\n\n\
             processor\t: 2\nvendor_id\t: AuthenticAMD\nphysical id\t: 1\ncore id\t: 0\n",
        );
        let cpu = discover(&root);
        let package = &cpu.processors[0];
        assert_eq!(package.id, 1);
        assert_eq!(package.model, UNKNOWN);
        assert_eq!(package.cores.len(), 2);
        assert_eq!(package.cores[0].id, 0);
        assert_eq!(package.cores[0].logical_processors, vec![2]);
        assert_eq!(package.cores[1].logical_processors, vec![0, 1]);
        assert_eq!(package.total_hardware_threads, 3);
    }

    #[test]
    fn multiple_packages() {
        let root = FakeRoot::new();
        let mut cpuinfo = String::new();
        for lp in 0..4usize {
            let package = lp / 2;
            cpuinfo.push_str(&format!(
                "processor\t: {lp}\nphysical id\t: {package}\nmodel name\t: Test CPU {package}\n\n"
            ));
            root.file(
                format!("sys/devices/system/cpu/cpu{lp}/topology/physical_package_id"),
                format!("{package}\n"),
            )
            .file(
                format!("sys/devices/system/cpu/cpu{lp}/topology/core_id"),
                "0\n",
            );
        }
        root.file("proc/cpuinfo", cpuinfo)
            .file("sys/devices/system/cpu/cpufreq/boost", "1\n");
        let cpu = discover(&root);
        assert_eq!(cpu.processors.len(), 2);
        assert_eq!(cpu.processors[1].model, "Test CPU 1");
        // core ids repeat across packages
        assert_eq!(cpu.processors[1].cores[0].id, 0);
        assert_eq!(cpu.processors[1].cores[0].logical_processors, vec![2, 3]);
        assert_eq!(cpu.total_cores, 2);
        assert_eq!(cpu.total_hardware_threads, 4);
    }

    #[test]
    fn empty_host() {
        let cpu = discover(&FakeRoot::new());
        assert_eq!(cpu, CpuInfo::default());
    }
}
