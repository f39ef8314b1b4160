// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Best effort readers for small kernel text files.
//!
//! None of these functions return an error to the caller.
//! A missing file is logged at `debug` (absence is normal), any other failure is logged at
//! `warn` with the offending path, and the caller receives `None`, an empty collection, or the
//! sentinel documented on the function.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Sentinel returned by [`read_int`] when the file is missing or malformed.
pub const INVALID_INT: i64 = -1;

fn log_failure(path: &Path, err: &std::io::Error, what: &str) {
    if err.kind() == ErrorKind::NotFound {
        debug!(path = %path.display(), "{what}: not present");
    } else {
        warn!(path = %path.display(), "{what}: {err}");
    }
}

/// Read a pseudofile and trim surrounding whitespace (including the trailing newline).
///
/// The whole file is read until end of file; the size reported by `stat` is ignored because
/// it is meaningless for most pseudofiles.
#[must_use]
pub fn read_trimmed(path: impl AsRef<Path>) -> Option<String> {
    let path = path.as_ref();
    match std::fs::read(path) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).trim().to_string()),
        Err(err) => {
            log_failure(path, &err, "unable to read");
            None
        }
    }
}

/// Read a pseudofile and parse the trimmed content with [`FromStr`].
///
/// Parse failures are logged at `warn`.
#[must_use]
pub fn read_parsed<T>(path: impl AsRef<Path>) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let path = path.as_ref();
    let contents = read_trimmed(path)?;
    match contents.parse() {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(path = %path.display(), "malformed pseudofile ({contents:?}): {err}");
            None
        }
    }
}

/// Read a decimal integer, returning [`INVALID_INT`] on absence or parse failure.
#[must_use]
pub fn read_int(path: impl AsRef<Path>) -> i64 {
    read_parsed(path).unwrap_or(INVALID_INT)
}

/// Read an unsigned integer which the kernel prints in hex (with or without the `0x` prefix).
#[must_use]
pub fn read_hex(path: impl AsRef<Path>) -> Option<u64> {
    let path = path.as_ref();
    let contents = read_trimmed(path)?;
    let digits = contents
        .strip_prefix("0x")
        .or_else(|| contents.strip_prefix("0X"))
        .unwrap_or(&contents);
    match u64::from_str_radix(digits, 16) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(path = %path.display(), "malformed hex pseudofile ({contents:?}): {err}");
            None
        }
    }
}

/// Error returned by [`parse_bool`].
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("not a boolean: {0:?}")]
pub struct ParseBoolError(pub String);

/// Parse `0/1/true/false/yes/no/on/off` (case-insensitive).
///
/// # Errors
///
/// Returns [`ParseBoolError`] for anything else.
pub fn parse_bool(value: &str) -> Result<bool, ParseBoolError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ParseBoolError(value.to_string())),
    }
}

/// Read a boolean pseudofile, see [`parse_bool`] for the accepted spellings.
#[must_use]
pub fn read_bool(path: impl AsRef<Path>) -> Option<bool> {
    let path = path.as_ref();
    let contents = read_trimmed(path)?;
    match parse_bool(&contents) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(path = %path.display(), "{err}");
            None
        }
    }
}

/// List the entry names of a directory, sorted by name.
///
/// The kernel's directory order is not reproducible once a tree has been copied into a
/// snapshot, so the names are sorted to keep repeated runs comparable.
#[must_use]
pub fn read_dir(path: impl AsRef<Path>) -> Vec<String> {
    let path = path.as_ref();
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(err) => {
            log_failure(path, &err, "unable to list directory");
            return Vec::new();
        }
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.file_name().to_string_lossy().into_owned()),
            Err(err) => {
                warn!(path = %path.display(), "unable to read directory entry: {err}");
                None
            }
        })
        .collect();
    names.sort();
    names
}

/// Read the target of a symbolic link.
#[must_use]
pub fn read_link(path: impl AsRef<Path>) -> Option<PathBuf> {
    let path = path.as_ref();
    match std::fs::read_link(path) {
        Ok(target) => Some(target),
        Err(err) => {
            log_failure(path, &err, "unable to read link");
            None
        }
    }
}

/// The final component of a symbolic link's target (e.g. the driver name of a `driver` link).
#[must_use]
pub fn link_basename(path: impl AsRef<Path>) -> Option<String> {
    read_link(path)?
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// True iff `path` is itself a symbolic link (the link is not followed).
#[must_use]
pub fn is_symlink(path: impl AsRef<Path>) -> bool {
    std::fs::symlink_metadata(path).is_ok_and(|meta| meta.file_type().is_symlink())
}

/// Split `KEY<delimiter>VALUE` lines into a map, trimming both sides.
///
/// Lines without the delimiter are ignored.
/// When a key repeats, the first occurrence wins.
#[must_use]
pub fn key_values(contents: &str, delimiter: char) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for line in contents.lines() {
        if let Some((key, value)) = line.split_once(delimiter) {
            out.entry(key.trim().to_string())
                .or_insert_with(|| value.trim().to_string());
        }
    }
    out
}

/// Parse a size such as `32K`, `8M`, `1G` or a bare number of bytes.
///
/// The suffix is a single (case-insensitive) letter and the multipliers are powers of 1024.
#[must_use]
pub fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim();
    let (digits, multiplier) = match value.chars().last()? {
        'k' | 'K' => (&value[..value.len() - 1], 1024),
        'm' | 'M' => (&value[..value.len() - 1], 1024 * 1024),
        'g' | 'G' => (&value[..value.len() - 1], 1024 * 1024 * 1024),
        _ => (value, 1),
    };
    digits.trim().parse::<u64>().ok()?.checked_mul(multiplier)
}
