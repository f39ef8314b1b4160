// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PCI function addresses.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// The address of a PCI function: `domain:bus:slot.function`.
///
/// # Canonical form
///
/// Addresses are shown (and serialized) as lowercase `DDDD:BB:SS.F`.
/// Parsing is case-insensitive and also accepts the short form `BB:SS.F`, which implies domain
/// `0000`.
///
/// ```
/// use hwinv_hardware::pci::address::PciAddress;
///
/// let short: PciAddress = "03:00.1".parse().unwrap();
/// let long: PciAddress = "0000:03:00.1".parse().unwrap();
/// assert_eq!(short, long);
/// assert_eq!(long.to_string(), "0000:03:00.1");
///
/// let upper: PciAddress = "0000:AF:1F.7".parse().unwrap();
/// assert_eq!(upper.to_string(), "0000:af:1f.7");
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct PciAddress {
    domain: u32,
    bus: u8,
    slot: u8,
    function: u8,
}

/// Errors that can occur when parsing or building a [`PciAddress`].
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum InvalidPciAddress {
    #[error("{0:?} is not a PCI address (expected DDDD:BB:SS.F or BB:SS.F)")]
    Syntax(String),
    /// Slots are five bits wide.
    #[error("slot {0:#x} is out of range (max is {max:#x})", max = PciAddress::MAX_SLOT)]
    Slot(u8),
    /// Functions are three bits wide.
    #[error("function {0} is out of range (max is {max})", max = PciAddress::MAX_FUNCTION)]
    Function(u8),
}

impl PciAddress {
    pub const MAX_SLOT: u8 = 0x1f;
    pub const MAX_FUNCTION: u8 = 7;

    /// Build an address from its parts.
    ///
    /// # Errors
    ///
    /// Returns an [`InvalidPciAddress`] if `slot` or `function` is out of range.
    pub fn new(
        domain: u32,
        bus: u8,
        slot: u8,
        function: u8,
    ) -> Result<PciAddress, InvalidPciAddress> {
        if slot > PciAddress::MAX_SLOT {
            return Err(InvalidPciAddress::Slot(slot));
        }
        if function > PciAddress::MAX_FUNCTION {
            return Err(InvalidPciAddress::Function(function));
        }
        Ok(PciAddress {
            domain,
            bus,
            slot,
            function,
        })
    }

    #[must_use]
    pub fn domain(self) -> u32 {
        self.domain
    }

    #[must_use]
    pub fn bus(self) -> u8 {
        self.bus
    }

    #[must_use]
    pub fn slot(self) -> u8 {
        self.slot
    }

    #[must_use]
    pub fn function(self) -> u8 {
        self.function
    }
}

impl Display for PciAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.slot, self.function
        )
    }
}

fn hex_field(field: &str, width: std::ops::RangeInclusive<usize>) -> Option<u32> {
    if !width.contains(&field.len()) || !field.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(field, 16).ok()
}

fn hex_byte(field: &str, width: std::ops::RangeInclusive<usize>) -> Option<u8> {
    hex_field(field, width).and_then(|value| u8::try_from(value).ok())
}

impl FromStr for PciAddress {
    type Err = InvalidPciAddress;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let syntax = || InvalidPciAddress::Syntax(value.to_string());
        let (head, function) = value.rsplit_once('.').ok_or_else(syntax)?;
        let parts: Vec<&str> = head.split(':').collect();
        let (domain, bus, slot) = match parts.as_slice() {
            [bus, slot] => (0, *bus, *slot),
            // sysfs shows domains wider than 16 bits (e.g. VMD) with more digits
            [domain, bus, slot] => (hex_field(domain, 4..=8).ok_or_else(syntax)?, *bus, *slot),
            _ => return Err(syntax()),
        };
        PciAddress::new(
            domain,
            hex_byte(bus, 2..=2).ok_or_else(syntax)?,
            hex_byte(slot, 2..=2).ok_or_else(syntax)?,
            hex_byte(function, 1..=1).ok_or_else(syntax)?,
        )
    }
}

impl From<PciAddress> for String {
    fn from(address: PciAddress) -> String {
        address.to_string()
    }
}

impl TryFrom<String> for PciAddress {
    type Error = InvalidPciAddress;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<&str> for PciAddress {
    type Error = InvalidPciAddress;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}
