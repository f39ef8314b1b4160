// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! NUMA topology: nodes, their cores, caches, memory and distances.

use crate::context::Context;
use crate::cpu::{Core, build_cores, core_key, logical_processors};
use crate::memory::{MemoryArea, read_node_area};
use crate::support::{ByteAmount, counted};
use crate::{Discover, Error, unsupported_platform};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use sysfs::Paths;
use sysfs::read::{parse_size, read_dir, read_parsed, read_trimmed};
use tracing::{debug, warn};

/// Distance reported for a node to itself.
pub const LOCAL_DISTANCE: i64 = 10;

#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, PartialEq, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum Architecture {
    /// A single memory domain.
    #[default]
    Smp,
    Numa,
}

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum CacheType {
    Unified,
    Instruction,
    Data,
}

/// A cache, shared by one or more logical processors.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct MemoryCache {
    pub level: u8,
    #[cfg_attr(any(test, feature = "serde"), serde(rename = "type"))]
    pub cache_type: CacheType,
    pub size_bytes: u64,
    /// The logical processors sharing the cache, ascending.
    pub logical_processors: Vec<usize>,
}

impl Display for MemoryCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match self.cache_type {
            CacheType::Unified => "",
            CacheType::Instruction => "i",
            CacheType::Data => "d",
        };
        write!(
            f,
            "L{}{kind} {} shared with logical processors: {}",
            self.level,
            ByteAmount(self.size_bytes),
            self.logical_processors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        )
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Node {
    pub id: usize,
    pub cores: Vec<Core>,
    /// Ordered by level, type and first logical processor.
    pub caches: Vec<MemoryCache>,
    /// `distances[n]` is the relative cost of accessing node `n`'s memory from this node.
    pub distances: Vec<i64>,
    pub memory: MemoryArea,
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "node #{} ({})", self.id, counted(self.cores.len(), "core"))
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TopologyInfo {
    pub architecture: Architecture,
    pub nodes: Vec<Node>,
}

impl Display for TopologyInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "topology {} ({})",
            self.architecture.to_string().to_uppercase(),
            counted(self.nodes.len(), "node")
        )
    }
}

/// The ids of the `node<N>` directories, ascending.
fn node_ids(paths: &Paths) -> Vec<usize> {
    let mut ids: Vec<usize> = read_dir(paths.sys_devices_system_node())
        .iter()
        .filter_map(|name| name.strip_prefix("node")?.parse().ok())
        .collect();
    ids.sort_unstable();
    ids
}

/// One `cache/index<N>` directory.
fn read_cache(dir: &Path) -> Option<(MemoryCache, String)> {
    let cache_type = read_parsed::<CacheType>(dir.join("type"))?;
    let level = read_parsed::<u8>(dir.join("level"))?;
    let size_bytes = read_trimmed(dir.join("size"))
        .and_then(|size| parse_size(&size))
        .unwrap_or_default();
    let shared_cpu_map = read_trimmed(dir.join("shared_cpu_map")).unwrap_or_default();
    Some((
        MemoryCache {
            level,
            cache_type,
            size_bytes,
            logical_processors: Vec::new(),
        },
        shared_cpu_map,
    ))
}

/// The caches of the logical processors `lps` (whose sysfs directories `cpu_dir` locates).
///
/// Caches with the same level, type and `shared_cpu_map` are the same cache; its logical
/// processors are those of `lps` which reported it.
fn read_caches(lps: &[usize], cpu_dir: impl Fn(usize) -> PathBuf) -> Vec<MemoryCache> {
    let mut caches: BTreeMap<(u8, CacheType, String), MemoryCache> = BTreeMap::new();
    for &lp in lps {
        let cache_dir = cpu_dir(lp).join("cache");
        for index in read_dir(&cache_dir)
            .iter()
            .filter(|name| name.starts_with("index"))
        {
            let Some((cache, shared_cpu_map)) = read_cache(&cache_dir.join(index)) else {
                debug!(lp, index = %index, "unreadable cache descriptor");
                continue;
            };
            caches
                .entry((cache.level, cache.cache_type, shared_cpu_map))
                .or_insert(cache)
                .logical_processors
                .push(lp);
        }
    }
    let mut caches: Vec<MemoryCache> = caches
        .into_values()
        .map(|mut cache| {
            cache.logical_processors.sort_unstable();
            cache.logical_processors.dedup();
            cache
        })
        .collect();
    caches.sort_by_key(|cache| {
        (
            cache.level,
            cache.cache_type,
            cache.logical_processors.first().copied(),
        )
    });
    caches
}

fn read_distances(dir: &Path) -> Vec<i64> {
    let Some(contents) = read_trimmed(dir.join("distance")) else {
        return Vec::new();
    };
    let distances: Result<Vec<i64>, _> = contents.split_whitespace().map(str::parse).collect();
    distances.unwrap_or_else(|err| {
        warn!(path = %dir.join("distance").display(), "malformed distances: {err}");
        Vec::new()
    })
}

fn cores_of(lps: &[usize], cpu_dir: impl Fn(usize) -> PathBuf) -> Vec<Core> {
    build_cores(lps.iter().filter_map(|&lp| {
        let key = core_key(&cpu_dir(lp))?;
        Some((key, key.1, lp))
    }))
}

fn read_node(ctx: &Context, paths: &Paths, id: usize) -> Node {
    let lps = logical_processors(&paths.node(id));
    let cpu_dir = |lp| paths.node_cpu(id, lp);
    Node {
        id,
        cores: cores_of(&lps, cpu_dir),
        caches: read_caches(&lps, cpu_dir),
        distances: read_distances(&paths.node(id)),
        memory: read_node_area(ctx, id),
    }
}

/// A single node holding every logical processor, for kernels without NUMA support.
fn single_node(ctx: &Context, paths: &Paths) -> Node {
    let lps = logical_processors(&paths.sys_devices_system_cpu());
    let cpu_dir = |lp| paths.system_cpu(lp);
    Node {
        id: 0,
        cores: cores_of(&lps, cpu_dir),
        caches: read_caches(&lps, cpu_dir),
        distances: vec![LOCAL_DISTANCE],
        memory: crate::memory::read_host_area(ctx),
    }
}

fn read_topology(ctx: &Context) -> TopologyInfo {
    if !ctx.topology_enabled() {
        debug!("topology discovery disabled");
        return TopologyInfo::default();
    }
    let paths = ctx.paths();
    let ids = node_ids(&paths);
    let nodes = if ids.is_empty() {
        debug!(path = %paths.sys_devices_system_node().display(), "no NUMA nodes, assuming one");
        vec![single_node(ctx, &paths)]
    } else {
        ids.into_iter().map(|id| read_node(ctx, &paths, id)).collect()
    };
    TopologyInfo {
        architecture: if nodes.len() > 1 {
            Architecture::Numa
        } else {
            Architecture::Smp
        },
        nodes,
    }
}

#[cfg(target_os = "linux")]
impl Discover for TopologyInfo {
    fn discover(ctx: &Context) -> Result<Self, Error> {
        ctx.run(read_topology)
    }
}

unsupported_platform!(TopologyInfo, Topology);
