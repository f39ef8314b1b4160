// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The PCI `modalias` encoding.
//!
//! The kernel describes each PCI function to module loaders with a fixed layout string:
//!
//! ```text
//! pci:v<8 hex>d<8 hex>sv<8 hex>sd<8 hex>bc<2 hex>sc<2 hex>i<2 hex>
//! ```
//!
//! The vendor, device, subsystem vendor and subsystem device fields are 32 bits wide on the
//! wire but only the low 16 bits carry information.

use crate::pci::ids::{ClassCode, DeviceId, ProgIfCode, SubclassCode, VendorId};
use std::str::FromStr;

/// The identifiers encoded in a PCI `modalias`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Modalias {
    pub vendor: VendorId,
    pub device: DeviceId,
    pub subsystem_vendor: VendorId,
    pub subsystem_device: DeviceId,
    pub class: ClassCode,
    pub subclass: SubclassCode,
    pub prog_if: ProgIfCode,
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("malformed PCI modalias {0:?}")]
pub struct InvalidModalias(pub String);

/// Each field of the layout: its tag and its width in hex digits.
const LAYOUT: [(&str, usize); 7] = [
    ("pci:v", 8),
    ("d", 8),
    ("sv", 8),
    ("sd", 8),
    ("bc", 2),
    ("sc", 2),
    ("i", 2),
];

/// Split `value` into the hex fields of [`LAYOUT`].
fn fields(value: &str) -> Option<[u32; 7]> {
    let mut rest = value;
    let mut out = [0u32; 7];
    for (slot, (tag, width)) in out.iter_mut().zip(LAYOUT) {
        rest = rest.strip_prefix(tag)?;
        let digits = rest.get(..width)?;
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        *slot = u32::from_str_radix(digits, 16).ok()?;
        rest = &rest[width..];
    }
    // some kernels append fields we do not use
    Some(out)
}

#[allow(clippy::cast_possible_truncation)] // masked
fn low16(value: u32) -> u16 {
    (value & 0xffff) as u16
}

#[allow(clippy::cast_possible_truncation)] // masked
fn low8(value: u32) -> u8 {
    (value & 0xff) as u8
}

impl FromStr for Modalias {
    type Err = InvalidModalias;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let [vendor, device, sub_vendor, sub_device, class, subclass, prog_if] =
            fields(trimmed).ok_or_else(|| InvalidModalias(trimmed.to_string()))?;
        Ok(Modalias {
            vendor: VendorId::new(low16(vendor)),
            device: DeviceId::new(low16(device)),
            subsystem_vendor: VendorId::new(low16(sub_vendor)),
            subsystem_device: DeviceId::new(low16(sub_device)),
            class: ClassCode::new(low8(class)),
            subclass: SubclassCode::new(low8(subclass)),
            prog_if: ProgIfCode::new(low8(prog_if)),
        })
    }
}
