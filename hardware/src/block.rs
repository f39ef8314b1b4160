// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Block storage: disks and their partitions.
//!
//! Disks are the entries of `/sys/block` (loop devices excepted).
//! Identity strings come from the udev runtime database, with the SCSI `device/vendor` and
//! `device/model` files as fallback; mount points come from the kernel mount table.

use crate::context::Context;
use crate::support::{ByteAmount, counted};
use crate::{Discover, Error, UNKNOWN, unsupported_platform};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use sysfs::Paths;
use sysfs::mounts::{self, MountEntry};
use sysfs::read::{INVALID_INT, read_bool, read_dir, read_int, read_parsed, read_trimmed};
use sysfs::tool::{self, DEFAULT_TIMEOUT, Tool};
use sysfs::udev::{self, DeviceKind, UdevRecord};
use tracing::{debug, warn};

/// The sysfs `size` files count 512 byte sectors regardless of the device's block size.
pub const SECTOR_SIZE: u64 = 512;

#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, PartialEq, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum DriveType {
    #[default]
    Unknown,
    /// Hard disk drive
    Hdd,
    /// Floppy disk drive
    Fdd,
    /// Optical disk drive
    Odd,
    /// Solid state drive
    Ssd,
    Virtual,
    Iscsi,
    /// Device mapper target
    Mapper,
}

#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, PartialEq, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum StorageController {
    #[default]
    Unknown,
    Ide,
    Scsi,
    Nvme,
    Virtio,
    Mmc,
    Loop,
}

/// Classify a block device by its kernel name.
///
/// ```
/// use hwinv_hardware::block::{DriveType, StorageController, classify};
///
/// assert_eq!(classify("nvme0n1"), (DriveType::Ssd, StorageController::Nvme));
/// assert_eq!(classify("dm-0"), (DriveType::Mapper, StorageController::Unknown));
/// ```
#[must_use]
pub fn classify(name: &str) -> (DriveType, StorageController) {
    const PREFIXES: [(&str, DriveType, StorageController); 10] = [
        ("loop", DriveType::Virtual, StorageController::Loop),
        ("fd", DriveType::Fdd, StorageController::Unknown),
        ("sd", DriveType::Hdd, StorageController::Scsi),
        ("xvd", DriveType::Hdd, StorageController::Scsi),
        ("hd", DriveType::Hdd, StorageController::Ide),
        ("vd", DriveType::Hdd, StorageController::Virtio),
        ("nvme", DriveType::Ssd, StorageController::Nvme),
        ("sr", DriveType::Odd, StorageController::Scsi),
        ("mmc", DriveType::Ssd, StorageController::Mmc),
        ("dm-", DriveType::Mapper, StorageController::Unknown),
    ];
    PREFIXES
        .iter()
        .find(|(prefix, _, _)| name.starts_with(prefix))
        .map_or(
            (DriveType::Unknown, StorageController::Unknown),
            |&(_, drive_type, controller)| (drive_type, controller),
        )
}

/// The disk an NVMe partition belongs to: `nvme0n1p1` yields `nvme0n1`.
///
/// Returns `None` for names which are not of the form `nvme<N>n<N>p<N>`.
#[must_use]
pub fn nvme_partition_disk(name: &str) -> Option<&str> {
    fn digits(value: &str) -> Option<&str> {
        let end = value
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(value.len());
        (end > 0).then_some(&value[end..])
    }
    let rest = digits(name.strip_prefix("nvme")?)?;
    let rest = digits(rest.strip_prefix('n')?)?;
    let partition = rest.strip_prefix('p')?;
    if digits(partition)?.is_empty() {
        Some(&name[..name.len() - rest.len()])
    } else {
        None
    }
}

/// True iff `partition` is named as a partition of `disk`.
#[must_use]
pub fn is_partition_of(disk: &str, partition: &str) -> bool {
    match nvme_partition_disk(partition) {
        Some(parent) => parent == disk,
        None => partition.len() > disk.len() && partition.starts_with(disk),
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Partition {
    /// The name of the disk holding the partition.
    pub disk: String,
    pub name: String,
    /// The partition table label (`ID_PART_ENTRY_NAME`).
    pub label: String,
    /// The filesystem label (`ID_FS_LABEL`).
    pub filesystem_label: String,
    /// Empty if the partition is not mounted.
    pub mount_point: String,
    pub size_bytes: u64,
    #[cfg_attr(any(test, feature = "serde"), serde(rename = "type"))]
    pub fs_type: String,
    pub is_read_only: bool,
    pub uuid: String,
}

impl Display for Partition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}) [{}]", self.name, ByteAmount(self.size_bytes), self.fs_type)?;
        if !self.mount_point.is_empty() {
            write!(f, " mounted@{}", self.mount_point)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Disk {
    pub name: String,
    pub size_bytes: u64,
    pub physical_block_size_bytes: u64,
    pub drive_type: DriveType,
    pub storage_controller: StorageController,
    pub is_removable: bool,
    /// The udev `ID_PATH` of the device.
    pub bus_path: String,
    /// The NUMA node of the controller, `-1` if unknown.
    pub numa_node_id: i64,
    pub vendor: String,
    pub model: String,
    pub serial_number: String,
    pub wwn: String,
    pub partitions: Vec<Partition>,
}

impl Display for Disk {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} ({}) {} [@{}",
            self.name,
            self.drive_type.to_string().to_uppercase(),
            ByteAmount(self.size_bytes),
            self.storage_controller.to_string().to_uppercase(),
            self.bus_path,
        )?;
        if self.numa_node_id >= 0 {
            write!(f, " (node #{})", self.numa_node_id)?;
        }
        write!(
            f,
            "] vendor={} model={} serial={} WWN={}",
            self.vendor, self.model, self.serial_number, self.wwn
        )
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct BlockInfo {
    pub total_physical_bytes: u64,
    pub disks: Vec<Disk>,
}

impl BlockInfo {
    /// Every partition of every disk, in disk order.
    pub fn partitions(&self) -> impl Iterator<Item = &Partition> {
        self.disks.iter().flat_map(|disk| disk.partitions.iter())
    }

    #[must_use]
    pub fn disk(&self, name: &str) -> Option<&Disk> {
        self.disks.iter().find(|disk| disk.name == name)
    }
}

impl Display for BlockInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "block storage ({}, {} physical storage)",
            counted(self.disks.len(), "disk"),
            ByteAmount(self.total_physical_bytes)
        )
    }
}

/// Extract the `PARTUUID` from the output of `blkid -s PARTUUID <device>`.
#[must_use]
pub fn parse_blkid(output: &str) -> Option<String> {
    let (_, rest) = output.split_once("PARTUUID=\"")?;
    let (uuid, _) = rest.split_once('"')?;
    (!uuid.is_empty()).then(|| uuid.to_string())
}

fn udev_or_unknown(record: &UdevRecord, keys: &[&str]) -> String {
    record
        .first_of(keys)
        .map_or_else(|| UNKNOWN.to_string(), str::to_string)
}

fn sectors_to_bytes(dir: &Path) -> u64 {
    let Some(sectors) = read_parsed::<u64>(dir.join("size")) else {
        return 0;
    };
    sectors.checked_mul(SECTOR_SIZE).unwrap_or_else(|| {
        warn!(dir = %dir.display(), sectors, "sector count out of range, size unknown");
        0
    })
}

/// The NUMA node of the first ancestor of the (canonical) device directory with a `numa_node`
/// file, never looking above `/sys`.
fn numa_node_id(sys: &Path, dir: &Path) -> i64 {
    let (Ok(sys), Ok(dir)) = (std::fs::canonicalize(sys), std::fs::canonicalize(dir)) else {
        return INVALID_INT;
    };
    dir.ancestors()
        .take_while(|ancestor| ancestor.starts_with(&sys))
        .map(|ancestor| ancestor.join("numa_node"))
        .find(|candidate| candidate.exists())
        .map_or(INVALID_INT, read_int)
}

/// The partition UUID as reported by `blkid`, which needs the real `/dev`.
fn blkid_uuid(ctx: &Context, name: &str) -> Option<String> {
    if !ctx.tools_available() {
        return None;
    }
    let device = format!("/dev/{name}");
    match tool::run(Tool::Blkid, &["-s", "PARTUUID", &device], DEFAULT_TIMEOUT) {
        Ok(output) => parse_blkid(&output),
        Err(err) => {
            warn!(partition = name, "unable to query partition uuid: {err}");
            None
        }
    }
}

fn read_partition(
    ctx: &Context,
    paths: &Paths,
    mounts: &[MountEntry],
    disk: &str,
    dir: &Path,
    name: &str,
) -> Partition {
    let record = udev::read_for_dev_file(paths, DeviceKind::Block, &dir.join("dev"));
    let device = format!("/dev/{name}");
    let mount = mounts.iter().find(|entry| entry.device == device);
    let fs_type = match mount {
        Some(entry) => entry.fs_type.clone(),
        None => udev_or_unknown(&record, &["ID_FS_TYPE"]),
    };
    let is_read_only = match mount {
        Some(entry) => entry.is_read_only(),
        None => read_bool(dir.join("ro")).unwrap_or_default(),
    };
    let uuid = record
        .first_of(&["ID_PART_ENTRY_UUID"])
        .map(str::to_string)
        .or_else(|| blkid_uuid(ctx, name))
        .unwrap_or_else(|| UNKNOWN.to_string());
    Partition {
        disk: disk.to_string(),
        name: name.to_string(),
        label: udev_or_unknown(&record, &["ID_PART_ENTRY_NAME"]),
        filesystem_label: udev_or_unknown(&record, &["ID_FS_LABEL"]),
        mount_point: mount.map(|entry| entry.mount_point.clone()).unwrap_or_default(),
        size_bytes: sectors_to_bytes(dir),
        fs_type,
        is_read_only,
        uuid,
    }
}

/// A string from udev, else from a sysfs `device/` attribute, else [`UNKNOWN`].
fn identity(record: &UdevRecord, keys: &[&str], fallback: PathBuf) -> String {
    record
        .first_of(keys)
        .map(str::to_string)
        .or_else(|| read_trimmed(fallback).filter(|value| !value.is_empty()))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn read_disk(ctx: &Context, paths: &Paths, mounts: &[MountEntry], name: &str) -> Disk {
    let dir = paths.sys_block().join(name);
    let record = udev::read_for_dev_file(paths, DeviceKind::Block, &dir.join("dev"));
    if record.is_empty() {
        debug!(disk = name, "no udev record");
    }
    let bus_path = udev_or_unknown(&record, &["ID_PATH"]);
    let (mut drive_type, storage_controller) = classify(name);
    if drive_type == DriveType::Hdd && read_int(dir.join("queue/rotational")) == 0 {
        drive_type = DriveType::Ssd;
    }
    if bus_path.contains("-iscsi-") {
        drive_type = DriveType::Iscsi;
    }
    let partitions = read_dir(&dir)
        .iter()
        .filter(|entry| is_partition_of(name, entry))
        .map(|partition| read_partition(ctx, paths, mounts, name, &dir.join(partition), partition))
        .collect();
    Disk {
        name: name.to_string(),
        size_bytes: sectors_to_bytes(&dir),
        physical_block_size_bytes: read_parsed(dir.join("queue/physical_block_size"))
            .unwrap_or_default(),
        drive_type,
        storage_controller,
        is_removable: read_bool(dir.join("removable")).unwrap_or_default(),
        bus_path,
        numa_node_id: numa_node_id(&paths.sys(), &dir),
        vendor: identity(&record, &["ID_VENDOR"], dir.join("device/vendor")),
        model: identity(&record, &["ID_MODEL"], dir.join("device/model")),
        serial_number: udev_or_unknown(&record, &["ID_SERIAL_SHORT", "ID_SERIAL"]),
        wwn: udev_or_unknown(&record, &["ID_WWN_WITH_EXTENSION", "ID_WWN"]),
        partitions,
    }
}

fn read_block(ctx: &Context) -> BlockInfo {
    let paths = ctx.paths();
    let mounts = mounts::read(paths.proc_mounts());
    let disks: Vec<Disk> = read_dir(paths.sys_block())
        .iter()
        .filter(|name| !name.starts_with("loop"))
        .map(|name| read_disk(ctx, &paths, &mounts, name))
        .collect();
    BlockInfo {
        total_physical_bytes: disks
            .iter()
            .fold(0, |total: u64, disk| total.saturating_add(disk.size_bytes)),
        disks,
    }
}

#[cfg(target_os = "linux")]
impl Discover for BlockInfo {
    fn discover(ctx: &Context) -> Result<Self, Error> {
        ctx.run(read_block)
    }
}

unsupported_platform!(BlockInfo, Block);
