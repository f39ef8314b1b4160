// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::context::Context;
use crate::dmi::field;
use crate::{Discover, Error, UNKNOWN, unsupported_platform};
use std::fmt::{Display, Formatter};

/// SMBIOS chassis types, indexed from 1.
const CHASSIS_TYPES: [&str; 36] = [
    "Other",
    "Unknown",
    "Desktop",
    "Low profile desktop",
    "Pizza box",
    "Mini tower",
    "Tower",
    "Portable",
    "Laptop",
    "Notebook",
    "Hand held",
    "Docking station",
    "All in one",
    "Sub notebook",
    "Space-saving",
    "Lunch box",
    "Main server chassis",
    "Expansion chassis",
    "Sub chassis",
    "Bus expansion chassis",
    "Peripheral chassis",
    "RAID chassis",
    "Rack mount chassis",
    "Sealed-case PC",
    "Multi-system chassis",
    "Compact PCI",
    "Advanced TCA",
    "Blade",
    "Blade enclosure",
    "Tablet",
    "Convertible",
    "Detachable",
    "IoT gateway",
    "Embedded PC",
    "Mini PC",
    "Stick PC",
];

/// The description of an SMBIOS chassis type, [`UNKNOWN`] if out of range.
#[must_use]
pub fn chassis_type_description(chassis_type: &str) -> &'static str {
    chassis_type
        .parse::<usize>()
        .ok()
        .and_then(|index| index.checked_sub(1))
        .and_then(|index| CHASSIS_TYPES.get(index))
        .copied()
        .unwrap_or(UNKNOWN)
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Chassis {
    pub asset_tag: String,
    pub serial_number: String,
    /// The raw SMBIOS chassis type number.
    #[cfg_attr(any(test, feature = "serde"), serde(rename = "type"))]
    pub chassis_type: String,
    pub type_description: String,
    pub vendor: String,
    pub version: String,
}

impl Display for Chassis {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "chassis type={} vendor={} version={}",
            self.type_description, self.vendor, self.version
        )
    }
}

#[cfg(target_os = "linux")]
impl Discover for Chassis {
    fn discover(ctx: &Context) -> Result<Self, Error> {
        ctx.run(|ctx| {
            let chassis_type = field(ctx, "chassis_type");
            Chassis {
                asset_tag: field(ctx, "chassis_asset_tag"),
                serial_number: field(ctx, "chassis_serial"),
                type_description: chassis_type_description(&chassis_type).to_string(),
                chassis_type,
                vendor: field(ctx, "chassis_vendor"),
                version: field(ctx, "chassis_version"),
            }
        })
    }
}

unsupported_platform!(Chassis, Chassis);
