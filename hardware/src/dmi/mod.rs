// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Firmware provided (DMI / SMBIOS) identity strings.
//!
//! Every field is the trimmed content of one file in `/sys/class/dmi/id`, [`UNKNOWN`] when the
//! file is missing (or unreadable: serial numbers and UUIDs are often root only).
//!
//! [`UNKNOWN`]: crate::UNKNOWN

pub mod baseboard;
pub mod bios;
pub mod chassis;
pub mod product;

use crate::context::Context;
use crate::{Discover, Error, string_or_unknown};
use std::fmt::{Display, Formatter};

/// The DMI field `name` of the host `ctx` points at.
pub(crate) fn field(ctx: &Context, name: &str) -> String {
    string_or_unknown(ctx.paths().sys_class_dmi().join("id").join(name))
}

/// All of the DMI records.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct DmiInfo {
    pub bios: bios::Bios,
    pub baseboard: baseboard::Baseboard,
    pub chassis: chassis::Chassis,
    pub product: product::Product,
}

impl Display for DmiInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.bios)?;
        writeln!(f, "{}", self.baseboard)?;
        writeln!(f, "{}", self.chassis)?;
        write!(f, "{}", self.product)
    }
}

impl Discover for DmiInfo {
    fn discover(ctx: &Context) -> Result<Self, Error> {
        ctx.run(|ctx| -> Result<DmiInfo, Error> {
            Ok(DmiInfo {
                bios: bios::Bios::discover(ctx)?,
                baseboard: baseboard::Baseboard::discover(ctx)?,
                chassis: chassis::Chassis::discover(ctx)?,
                product: product::Product::discover(ctx)?,
            })
        })?
    }
}
