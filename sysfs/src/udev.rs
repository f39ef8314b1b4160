// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The udev runtime database (`/run/udev/data/<kind><major>:<minor>`).

use crate::paths::Paths;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which device namespace a udev record describes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::Display)]
pub enum DeviceKind {
    #[strum(serialize = "b")]
    Block,
    #[strum(serialize = "c")]
    Char,
}

/// A `major:minor` device number as printed in sysfs `dev` files.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DeviceNumber {
    pub major: u32,
    pub minor: u32,
}

impl std::fmt::Display for DeviceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// Error returned when a `dev` file does not contain `major:minor`.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("invalid device number: {0:?}")]
pub struct InvalidDeviceNumber(pub String);

impl FromStr for DeviceNumber {
    type Err = InvalidDeviceNumber;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidDeviceNumber(value.to_string());
        let (major, minor) = value.trim().split_once(':').ok_or_else(invalid)?;
        Ok(DeviceNumber {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

/// The `E:` properties of one udev database record.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UdevRecord(BTreeMap<String, String>);

impl UdevRecord {
    /// Parse the text of a udev database record.
    ///
    /// Only property lines (`E:KEY=VALUE`) are retained.
    #[must_use]
    pub fn parse(contents: &str) -> UdevRecord {
        UdevRecord(
            contents
                .lines()
                .filter_map(|line| line.strip_prefix("E:"))
                .filter_map(|property| property.split_once('='))
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        )
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// The first of `keys` which is present and non-empty.
    #[must_use]
    pub fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|key| self.get(key))
            .find(|value| !value.is_empty())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Location of the udev record for a device.
#[must_use]
pub fn record_path(paths: &Paths, kind: DeviceKind, number: DeviceNumber) -> PathBuf {
    paths.run_udev_data().join(format!("{kind}{number}"))
}

/// Read the udev record for the device whose sysfs `dev` file is at `dev_file`.
///
/// Returns an empty record if either file is missing.
#[must_use]
pub fn read_for_dev_file(paths: &Paths, kind: DeviceKind, dev_file: &Path) -> UdevRecord {
    let Some(number) = crate::read::read_parsed::<DeviceNumber>(dev_file) else {
        return UdevRecord::default();
    };
    crate::read::read_trimmed(record_path(paths, kind, number))
        .map(|contents| UdevRecord::parse(&contents))
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;
    use crate::paths::PathOverrides;
    use pretty_assertions::assert_eq;
    use test_utils::FakeRoot;

    const RECORD: &str = "S:disk/by-id/wwn-0x5000c500a1b2c3d4\n\
        W:42\n\
        E:ID_MODEL=ST1000DM010-2EP102\n\
        E:ID_SERIAL=ST1000DM010-2EP102_Z9A5\n\
        E:ID_SERIAL_SHORT=Z9A5\n\
        E:ID_WWN=0x5000c500a1b2c3d4\n\
        E:ID_PATH=pci-0000:00:17.0-ata-1\n\
        E:EMPTY=\n";

    #[test]
    fn only_properties_are_kept() {
        let record = UdevRecord::parse(RECORD);
        assert_eq!(record.get("ID_MODEL"), Some("ST1000DM010-2EP102"));
        assert_eq!(record.get("S"), None);
        assert_eq!(
            record.first_of(&["ID_SERIAL_SHORT", "ID_SERIAL"]),
            Some("Z9A5")
        );
        assert_eq!(record.first_of(&["EMPTY", "ID_WWN"]), Some("0x5000c500a1b2c3d4"));
    }

    #[test]
    fn device_numbers() {
        let number: DeviceNumber = "259:0\n".parse().unwrap();
        assert_eq!(number, DeviceNumber { major: 259, minor: 0 });
        assert_eq!(number.to_string(), "259:0");
        assert!("259".parse::<DeviceNumber>().is_err());
        assert!("a:b".parse::<DeviceNumber>().is_err());
    }

    #[test]
    fn record_lookup_through_dev_file() {
        let root = FakeRoot::new();
        root.file("sys/block/sda/dev", "8:0\n")
            .file("run/udev/data/b8:0", RECORD);
        let paths = Paths::new(root.path(), PathOverrides::default());
        let record = read_for_dev_file(&paths, DeviceKind::Block, &root.join("sys/block/sda/dev"));
        assert_eq!(record.get("ID_PATH"), Some("pci-0000:00:17.0-ata-1"));

        let missing = read_for_dev_file(&paths, DeviceKind::Block, &root.join("sys/block/sdb/dev"));
        assert!(missing.is_empty());
    }
}
