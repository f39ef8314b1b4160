// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::context::Context;
use crate::dmi::field;
use crate::{Discover, Error, unsupported_platform};
use std::fmt::{Display, Formatter};

/// The system as a whole, as named by its manufacturer.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Product {
    pub family: String,
    pub name: String,
    pub serial_number: String,
    pub uuid: String,
    pub sku: String,
    pub vendor: String,
    pub version: String,
}

impl Display for Product {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "product family={} name={} vendor={} SKU={} version={}",
            self.family, self.name, self.vendor, self.sku, self.version
        )
    }
}

#[cfg(target_os = "linux")]
impl Discover for Product {
    fn discover(ctx: &Context) -> Result<Self, Error> {
        ctx.run(|ctx| Product {
            family: field(ctx, "product_family"),
            name: field(ctx, "product_name"),
            serial_number: field(ctx, "product_serial"),
            uuid: field(ctx, "product_uuid"),
            sku: field(ctx, "product_sku"),
            vendor: field(ctx, "sys_vendor"),
            version: field(ctx, "product_version"),
        })
    }
}

unsupported_platform!(Product, Product);
