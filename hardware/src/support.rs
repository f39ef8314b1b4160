// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Small helpers shared by the section summaries.

use std::fmt::{Display, Formatter};

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;
const TB: u64 = GB * 1024;
const PB: u64 = TB * 1024;

/// A byte count shown in the largest base 1024 unit it reaches (rounded down).
///
/// ```
/// use hwinv_hardware::support::ByteAmount;
///
/// assert_eq!(ByteAmount(512).to_string(), "512B");
/// assert_eq!(ByteAmount(32 * 1024).to_string(), "32KB");
/// assert_eq!(ByteAmount(1_512_315_076_608).to_string(), "1TB");
/// ```
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct ByteAmount(pub u64);

impl Display for ByteAmount {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (unit, suffix) in [(PB, "PB"), (TB, "TB"), (GB, "GB"), (MB, "MB"), (KB, "KB")] {
            if self.0 >= unit {
                return write!(f, "{}{suffix}", self.0 / unit);
            }
        }
        write!(f, "{}B", self.0)
    }
}

/// `count` followed by `noun`, pluralized with an `s` unless `count == 1`.
pub(crate) fn counted(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;

    #[test]
    fn units() {
        assert_eq!(ByteAmount(0).to_string(), "0B");
        assert_eq!(ByteAmount(1023).to_string(), "1023B");
        assert_eq!(ByteAmount(1024).to_string(), "1KB");
        assert_eq!(ByteAmount(16 * GB + 1).to_string(), "16GB");
        assert_eq!(ByteAmount(3 * PB).to_string(), "3PB");
    }

    #[test]
    fn plurals() {
        assert_eq!(counted(1, "disk"), "1 disk");
        assert_eq!(counted(0, "disk"), "0 disks");
        assert_eq!(counted(2, "core"), "2 cores");
    }
}
