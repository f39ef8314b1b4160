// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::context::Context;
use crate::dmi::field;
use crate::{Discover, Error, unsupported_platform};
use std::fmt::{Display, Formatter};

/// The mainboard.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Baseboard {
    pub asset_tag: String,
    pub serial_number: String,
    pub vendor: String,
    pub version: String,
    pub product: String,
}

impl Display for Baseboard {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "baseboard vendor={} product={} version={}",
            self.vendor, self.product, self.version
        )
    }
}

#[cfg(target_os = "linux")]
impl Discover for Baseboard {
    fn discover(ctx: &Context) -> Result<Self, Error> {
        ctx.run(|ctx| Baseboard {
            asset_tag: field(ctx, "board_asset_tag"),
            serial_number: field(ctx, "board_serial"),
            vendor: field(ctx, "board_vendor"),
            version: field(ctx, "board_version"),
            product: field(ctx, "board_name"),
        })
    }
}

unsupported_platform!(Baseboard, Baseboard);
