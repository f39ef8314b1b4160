// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PCI identifiers.
//!
//! Vendor and device IDs are 16 bit values assigned by the PCI-SIG and by the vendors
//! themselves.
//! Class, subclass and programming interface codes are the three bytes of a function's class
//! code.
//!
//! # Examples
//!
//! ```
//! use hwinv_hardware::pci::ids::{ClassCode, VendorId};
//!
//! // Intel vendor ID
//! let intel = VendorId::new(0x8086);
//! assert_eq!(format!("{}", intel), "8086");
//!
//! // Parse from hex string
//! let vendor = VendorId::try_from("10de".to_string()).unwrap();
//! assert_eq!(vendor, VendorId::new(0x10de));  // NVIDIA
//!
//! // Network controller
//! assert_eq!(ClassCode::new(0x02).to_string(), "02");
//! ```

/// Define a hex formatted PCI identifier newtype.
macro_rules! pci_id {
    ($(#[$meta:meta])* $name:ident($repr:ty), $width:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
        #[cfg_attr(
            any(test, feature = "serde"),
            derive(serde::Serialize, serde::Deserialize),
            serde(try_from = "String", into = "String")
        )]
        #[repr(transparent)]
        pub struct $name($repr);

        impl $name {
            #[must_use]
            pub const fn new(id: $repr) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn value(self) -> $repr {
                self.0
            }
        }

        impl std::fmt::LowerHex for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:0width$x}", self.0, width = $width)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{self:x}")
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.to_string()
            }
        }

        impl TryFrom<String> for $name {
            type Error = std::num::ParseIntError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            /// Parse from (case-insensitive) hex digits, with or without leading zeros.
            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Ok(Self(<$repr>::from_str_radix(value, 16)?))
            }
        }
    };
}

pci_id!(
    /// A 16-bit PCI vendor identifier.
    ///
    /// The special value `0xFFFF` is reserved and indicates an invalid / non-existent device.
    VendorId(u16),
    4
);

pci_id!(
    /// A 16-bit PCI device (product) identifier, scoped by its [`VendorId`].
    DeviceId(u16),
    4
);

pci_id!(
    /// The base class byte of a PCI class code (e.g. `02` for network controllers).
    ClassCode(u8),
    2
);

pci_id!(
    /// The subclass byte of a PCI class code, scoped by its [`ClassCode`].
    SubclassCode(u8),
    2
);

pci_id!(
    /// The programming interface byte of a PCI class code.
    ProgIfCode(u8),
    2
);

impl VendorId {
    /// Checks if this vendor ID is the reserved invalid value.
    #[must_use]
    pub fn is_invalid(self) -> bool {
        self.0 == 0xFFFF
    }
}

/// A resolved PCI vendor.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Vendor {
    pub id: VendorId,
    pub name: String,
}

/// A resolved PCI device (or subsystem) record.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Product {
    pub vendor_id: VendorId,
    pub id: DeviceId,
    pub name: String,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Class {
    pub id: ClassCode,
    pub name: String,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Subclass {
    pub id: SubclassCode,
    pub name: String,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ProgrammingInterface {
    pub id: ProgIfCode,
    pub name: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ids_are_zero_padded_lowercase_hex() {
        assert_eq!(VendorId::new(0x10DE).to_string(), "10de");
        assert_eq!(DeviceId::new(0x1c).to_string(), "001c");
        assert_eq!(ClassCode::new(0x3).to_string(), "03");
        assert_eq!(format!("{:x}", ProgIfCode::new(0x30)), "30");
    }

    #[test]
    fn ids_parse_without_leading_zeros() {
        assert_eq!(VendorId::try_from("46a".to_string()).unwrap(), VendorId::new(0x046a));
        assert_eq!("0C".parse::<ClassCode>().unwrap(), ClassCode::new(0x0c));
        assert!("GGGG".parse::<VendorId>().is_err());
        assert!("100".parse::<SubclassCode>().is_err());
    }

    #[test]
    fn reserved_vendor() {
        assert!(VendorId::new(0xFFFF).is_invalid());
        assert!(!VendorId::new(0x8086).is_invalid());
    }

    #[test]
    fn serialized_as_strings() {
        let vendor = Vendor {
            id: VendorId::new(0x8086),
            name: "Intel Corporation".into(),
        };
        assert_eq!(
            serde_json::to_string(&vendor).unwrap(),
            r#"{"id":"8086","name":"Intel Corporation"}"#
        );
    }
}
