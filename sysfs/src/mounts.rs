// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Parser for the kernel mount table (`/proc/self/mounts`, `/etc/mtab`).
//!
//! Each line has the form `device mountpoint fstype options dump pass`.
//! Whitespace inside a field is written as an octal escape (`\040` for space, `\011` for tab,
//! `\012` for newline and `\134` for backslash).

use std::path::Path;
use tracing::warn;

/// One line of the mount table.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MountEntry {
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
    pub options: Vec<String>,
}

impl MountEntry {
    /// True iff the mount options include `ro`.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.options.iter().any(|option| option == "ro")
    }
}

/// Error returned for a line which does not have at least four fields.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("invalid mount table entry: {0:?}")]
pub struct InvalidMountEntry(pub String);

/// Decode the octal escapes the kernel uses in mount table fields.
///
/// `\\` decodes to a single backslash; a backslash not followed by three octal digits is kept
/// verbatim.
#[must_use]
pub fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if bytes.get(i + 1) == Some(&b'\\') {
                out.push(b'\\');
                i += 2;
                continue;
            }
            if let Some(octal) = bytes.get(i + 1..i + 4)
                && octal.iter().all(|digit| (b'0'..=b'7').contains(digit))
            {
                let value = octal
                    .iter()
                    .fold(0u32, |acc, digit| acc * 8 + u32::from(digit - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parse a single mount table line.
///
/// # Errors
///
/// Returns [`InvalidMountEntry`] if the line has fewer than four whitespace separated fields.
pub fn parse_line(line: &str) -> Result<MountEntry, InvalidMountEntry> {
    let mut fields = line.split_whitespace();
    let (Some(device), Some(mount_point), Some(fs_type), Some(options)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(InvalidMountEntry(line.to_string()));
    };
    Ok(MountEntry {
        device: unescape(device),
        mount_point: unescape(mount_point),
        fs_type: fs_type.to_string(),
        options: options.split(',').map(str::to_string).collect(),
    })
}

/// Parse a complete mount table, skipping (and logging) malformed lines.
#[must_use]
pub fn parse(contents: &str) -> Vec<MountEntry> {
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match parse_line(line) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("{err}");
                None
            }
        })
        .collect()
}

/// Read and parse the mount table at `path`; a missing table yields no entries.
#[must_use]
pub fn read(path: impl AsRef<Path>) -> Vec<MountEntry> {
    crate::read::read_trimmed(path)
        .map(|contents| parse(&contents))
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_entry() {
        let entry =
            parse_line("/dev/sda6 / ext4 rw,relatime,errors=remount-ro,data=ordered 0 0").unwrap();
        assert_eq!(
            entry,
            MountEntry {
                device: "/dev/sda6".into(),
                mount_point: "/".into(),
                fs_type: "ext4".into(),
                options: vec![
                    "rw".into(),
                    "relatime".into(),
                    "errors=remount-ro".into(),
                    "data=ordered".into()
                ],
            }
        );
        assert!(!entry.is_read_only());
    }

    #[test]
    fn escaped_mount_point() {
        let entry = parse_line("/dev/sda8 /home/Name\\040with\\040spaces ext4 ro 0 0").unwrap();
        assert_eq!(entry.mount_point, "/home/Name with spaces");
        assert!(entry.is_read_only());
    }

    #[test]
    fn escapes() {
        assert_eq!(unescape("a\\011b"), "a\tb");
        assert_eq!(unescape("a\\012b"), "a\nb");
        assert_eq!(unescape("a\\134b"), "a\\b");
        assert_eq!(unescape("a\\\\b"), "a\\b");
        assert_eq!(unescape("trailing\\"), "trailing\\");
        assert_eq!(unescape("\\9zz"), "\\9zz");
    }

    #[test]
    fn short_lines_are_rejected() {
        assert!(parse_line("/dev/sda1 /boot").is_err());
        let table = parse("/dev/sda1 /boot vfat rw 0 0\ngarbage\n\n");
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].fs_type, "vfat");
    }
}
