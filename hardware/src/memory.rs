// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Memory: usable and physical totals and huge pages.

use crate::context::Context;
use crate::support::ByteAmount;
use crate::{Discover, Error, unsupported_platform};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use sysfs::Paths;
use sysfs::read::{key_values, read_bool, read_dir, read_hex, read_parsed, read_trimmed};
use tracing::{debug, warn};

/// Huge page counters of one page size.
///
/// Counters which the kernel does not report are `-1`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct HugePageAmounts {
    pub total: i64,
    pub free: i64,
    pub surplus: i64,
    pub reserved: i64,
}

/// A region of memory: the whole host or one NUMA node.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct MemoryArea {
    pub total_physical_bytes: u64,
    /// Memory the kernel manages (physical memory minus firmware and kernel reservations).
    pub total_usable_bytes: u64,
    pub default_huge_page_size: u64,
    /// Supported huge page sizes (bytes), ascending.
    pub supported_page_sizes: Vec<u64>,
    /// Huge page counters keyed by page size (bytes).
    pub huge_page_amounts_by_size: BTreeMap<u64, HugePageAmounts>,
}

impl Display for MemoryArea {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "memory ({} physical, {} usable)",
            ByteAmount(self.total_physical_bytes),
            ByteAmount(self.total_usable_bytes)
        )
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct MemoryInfo {
    pub area: MemoryArea,
}

impl Display for MemoryInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.area.fmt(f)
    }
}

/// Parse a `/proc/meminfo` style amount (`16303932 kB`) into bytes.
pub(crate) fn meminfo_bytes(value: &str) -> Option<u64> {
    let value = value.trim();
    match value.strip_suffix("kB") {
        Some(kib) => kib.trim().parse::<u64>().ok()?.checked_mul(1024),
        None => value.parse().ok(),
    }
}

/// Parse `hugepages-<size>kB` into the page size in bytes.
fn huge_page_dir_size(name: &str) -> Option<u64> {
    name.strip_prefix("hugepages-")?
        .strip_suffix("kB")?
        .parse::<u64>()
        .ok()?
        .checked_mul(1024)
}

/// Read the huge page counters below `dir` (a `hugepages` directory).
pub(crate) fn huge_pages(dir: &Path) -> BTreeMap<u64, HugePageAmounts> {
    let counter = |entry: &Path, file: &str| read_parsed::<i64>(entry.join(file)).unwrap_or(-1);
    read_dir(dir)
        .into_iter()
        .filter_map(|name| {
            let size = huge_page_dir_size(&name)?;
            let entry = dir.join(&name);
            Some((
                size,
                HugePageAmounts {
                    total: counter(&entry, "nr_hugepages"),
                    free: counter(&entry, "free_hugepages"),
                    surplus: counter(&entry, "surplus_hugepages"),
                    reserved: counter(&entry, "resv_hugepages"),
                },
            ))
        })
        .collect()
}

/// `MemTotal` and `Hugepagesize` of a meminfo file.
///
/// Per node meminfo files prefix every key with `Node <N> `.
fn meminfo_totals(path: &Path) -> (Option<u64>, Option<u64>) {
    let Some(contents) = read_trimmed(path) else {
        return (None, None);
    };
    let fields: BTreeMap<String, String> = key_values(&contents, ':')
        .into_iter()
        .map(|(key, value)| {
            let key = key.rsplit(' ').next().unwrap_or_default().to_string();
            (key, value)
        })
        .collect();
    let bytes = |key: &str| fields.get(key).and_then(|value| meminfo_bytes(value));
    (bytes("MemTotal"), bytes("Hugepagesize"))
}

/// Physical memory from the online memory blocks.
fn physical_from_blocks(paths: &Paths, blocks: impl IntoIterator<Item = String>) -> Option<u64> {
    let memory = paths.sys_devices_system_memory();
    let block_size = read_hex(memory.join("block_size_bytes"))?;
    let online = blocks
        .into_iter()
        .filter(|block| read_bool(memory.join(block).join("online")).unwrap_or(false))
        .count();
    match online {
        0 => None,
        online => block_size.checked_mul(u64::try_from(online).ok()?),
    }
}

/// `memory<N>` entries of `dir`.
fn memory_blocks(dir: &Path) -> Vec<String> {
    read_dir(dir)
        .into_iter()
        .filter(|name| {
            name.strip_prefix("memory")
                .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        })
        .collect()
}

/// Physical memory from the kernel's boot message `Memory: <avail>K/<total>K available`.
///
/// The log is streamed and scanning stops at the first such line.
fn physical_from_syslog(paths: &Paths) -> Option<u64> {
    let path = paths.var_log().join("syslog");
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(err) => {
            debug!(path = %path.display(), "no kernel log: {err}");
            return None;
        }
    };
    BufReader::new(file)
        .split(b'\n')
        .map_while(Result::ok)
        .find_map(|line| boot_memory_total(&String::from_utf8_lossy(&line)))
}

fn boot_memory_total(line: &str) -> Option<u64> {
    let (_, rest) = line.split_once("Memory: ")?;
    let (_, total) = rest.split_once('/')?;
    let (kib, _) = total.split_once("K available")?;
    kib.trim().parse::<u64>().ok()?.checked_mul(1024)
}

#[cfg(target_os = "linux")]
fn physical_from_sysinfo() -> Option<u64> {
    match nix::sys::sysinfo::sysinfo() {
        Ok(info) => Some(info.ram_total()),
        Err(err) => {
            warn!("sysinfo(2) failed: {err}");
            None
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn physical_from_sysinfo() -> Option<u64> {
    None
}

/// The host's memory.
#[must_use]
pub fn read_host_area(ctx: &Context) -> MemoryArea {
    let paths = ctx.paths();
    let (usable, default_huge) = meminfo_totals(&paths.proc_meminfo());
    let usable = usable.unwrap_or_else(|| {
        warn!(path = %paths.proc_meminfo().display(), "no MemTotal");
        0
    });
    let physical = physical_from_blocks(&paths, memory_blocks(&paths.sys_devices_system_memory()))
        .or_else(|| physical_from_syslog(&paths))
        .or_else(|| ctx.is_live().then(physical_from_sysinfo).flatten());
    area(usable, physical, default_huge, huge_pages(&paths.sys_kernel_mm_hugepages()))
}

/// The memory of NUMA node `node`.
#[must_use]
pub fn read_node_area(ctx: &Context, node: usize) -> MemoryArea {
    let paths = ctx.paths();
    let dir = paths.node(node);
    let (usable, _) = meminfo_totals(&dir.join("meminfo"));
    let physical = physical_from_blocks(&paths, memory_blocks(&dir));
    // per node meminfo has no Hugepagesize; the default size is system wide
    let (_, default_huge) = meminfo_totals(&paths.proc_meminfo());
    area(
        usable.unwrap_or(0),
        physical,
        default_huge,
        huge_pages(&dir.join("hugepages")),
    )
}

fn area(
    usable: u64,
    physical: Option<u64>,
    default_huge_page_size: Option<u64>,
    huge_page_amounts_by_size: BTreeMap<u64, HugePageAmounts>,
) -> MemoryArea {
    let physical = match physical {
        Some(physical) if physical >= usable => physical,
        Some(physical) => {
            debug!(physical, usable, "physical memory below usable memory, using usable");
            usable
        }
        None => usable,
    };
    MemoryArea {
        total_physical_bytes: physical,
        total_usable_bytes: usable,
        default_huge_page_size: default_huge_page_size.unwrap_or(0),
        supported_page_sizes: huge_page_amounts_by_size.keys().copied().collect(),
        huge_page_amounts_by_size,
    }
}

#[cfg(target_os = "linux")]
impl Discover for MemoryInfo {
    fn discover(ctx: &Context) -> Result<Self, Error> {
        ctx.run(|ctx| MemoryInfo {
            area: read_host_area(ctx),
        })
    }
}

unsupported_platform!(MemoryInfo, Memory);

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;
    use crate::context::Options;
    use pretty_assertions::assert_eq;
    use test_utils::FakeRoot;
    use test_utils::host;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn ctx(root: &FakeRoot) -> Context {
        Context::new(Options::default().with_chroot(root.path()))
    }

    #[test]
    fn meminfo_amounts() {
        assert_eq!(meminfo_bytes("16303932 kB"), Some(16_303_932 * 1024));
        assert_eq!(meminfo_bytes("  4"), Some(4));
        assert_eq!(meminfo_bytes("lots kB"), None);
    }

    #[test]
    fn host_memory() {
        let root = host::sample_host();
        let memory = MemoryInfo::discover(&ctx(&root)).unwrap();
        assert_eq!(memory.area.total_usable_bytes, 16_303_932 * 1024);
        assert_eq!(memory.area.total_physical_bytes, 16 * GIB);
        assert_eq!(memory.area.default_huge_page_size, 2 * 1024 * 1024);
        assert_eq!(
            memory.area.supported_page_sizes,
            vec![2 * 1024 * 1024, GIB]
        );
        assert_eq!(
            memory.area.huge_page_amounts_by_size[&(2 * 1024 * 1024)],
            HugePageAmounts {
                total: 4,
                free: 4,
                surplus: 0,
                reserved: 0,
            }
        );
        assert_eq!(memory.to_string(), "memory (16GB physical, 15GB usable)");
    }

    #[test]
    fn physical_from_kernel_log() {
        let root = FakeRoot::new();
        root.file("proc/meminfo", "MemTotal:       16303932 kB\n")
            .file(
                "var/log/syslog",
                "Jan  1 00:00:00 host kernel: [    0.000000] Memory: 16267916K/16665296K available \
                 (12300K kernel code, 2482K rwdata)\n",
            );
        let area = read_host_area(&ctx(&root));
        assert_eq!(area.total_physical_bytes, 16_665_296 * 1024);
    }

    #[test]
    fn kernel_log_scan_skips_noise_and_stops_at_the_first_match() {
        let root = FakeRoot::new();
        let mut log = Vec::new();
        for i in 0..1000 {
            log.extend_from_slice(format!("Jan  1 00:00:00 host cron[{i}]: job done\n").as_bytes());
        }
        log.extend_from_slice(b"Jan  1 00:00:01 host app: \xff\xfe binary noise\n");
        log.extend_from_slice(
            b"Jan  1 00:00:02 host kernel: Memory: 8000000K/8388608K available\n\
              Jan  1 00:00:03 host kernel: Memory: 1K/2K available\n",
        );
        root.file("proc/meminfo", "MemTotal:       7999999 kB\n")
            .file("var/log/syslog", log);
        let area = read_host_area(&ctx(&root));
        assert_eq!(area.total_physical_bytes, 8_388_608 * 1024);

        assert_eq!(boot_memory_total("kernel: Memory: 1K/oops available"), None);
        assert_eq!(boot_memory_total("no memory here"), None);
    }

    #[test]
    fn physical_never_below_usable() {
        let root = FakeRoot::new();
        root.file("proc/meminfo", "MemTotal:       16303932 kB\n")
            .file("sys/devices/system/memory/block_size_bytes", "8000000\n")
            .file("sys/devices/system/memory/memory0/online", "1\n")
            .file("sys/devices/system/memory/memory1/online", "0\n");
        let area = read_host_area(&ctx(&root));
        assert_eq!(area.total_physical_bytes, area.total_usable_bytes);
        assert_eq!(area.total_usable_bytes, 16_303_932 * 1024);
    }

    #[test]
    fn nothing_to_read() {
        // a chroot never falls back to the running kernel
        let root = FakeRoot::new();
        let area = read_host_area(&ctx(&root));
        assert_eq!(area, MemoryArea::default());
    }

    #[test]
    fn node_memory() {
        let root = host::sample_host();
        let area = read_node_area(&ctx(&root), 1);
        assert_eq!(area.total_usable_bytes, 8_151_966 * 1024);
        assert_eq!(area.total_physical_bytes, 8 * GIB);
        assert_eq!(area.supported_page_sizes, vec![2 * 1024 * 1024]);
        assert_eq!(
            area.huge_page_amounts_by_size[&(2 * 1024 * 1024)],
            HugePageAmounts {
                total: 2,
                free: 2,
                surplus: 0,
                reserved: -1,
            }
        );
    }

    #[test]
    fn serialized_flat() {
        let root = host::sample_host();
        let memory = MemoryInfo::discover(&ctx(&root)).unwrap();
        let value = serde_json::to_value(&memory).unwrap();
        assert_eq!(value["total_usable_bytes"], 16_303_932u64 * 1024);
        assert!(value.get("area").is_none());
    }
}
