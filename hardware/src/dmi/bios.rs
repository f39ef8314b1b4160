// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::context::Context;
use crate::dmi::field;
use crate::{Discover, Error, unsupported_platform};
use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Bios {
    pub vendor: String,
    pub version: String,
    /// The release date, as the firmware formats it.
    pub date: String,
}

impl Display for Bios {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "bios vendor={} version={} date={}",
            self.vendor, self.version, self.date
        )
    }
}

#[cfg(target_os = "linux")]
impl Discover for Bios {
    fn discover(ctx: &Context) -> Result<Self, Error> {
        ctx.run(|ctx| Bios {
            vendor: field(ctx, "bios_vendor"),
            version: field(ctx, "bios_version"),
            date: field(ctx, "bios_date"),
        })
    }
}

unsupported_platform!(Bios, Bios);
