// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Graphics cards, from the DRM class.

use crate::context::Context;
use crate::pci::address::PciAddress;
use crate::pci::{PciDevice, PciInfo};
use crate::support::counted;
use crate::{Discover, Error, unsupported_platform};
use std::fmt::{Display, Formatter};
use std::path::Path;
use sysfs::read::{read_dir, read_link};
use tracing::{debug, warn};

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct GraphicsCard {
    /// The `N` of `card<N>`.
    pub index: usize,
    pub address: PciAddress,
    /// The PCI function behind the card, if it was discovered.
    pub device: Option<PciDevice>,
}

impl Display for GraphicsCard {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.device {
            Some(device) => write!(
                f,
                "card #{} @{} -> vendor='{}' product='{}'",
                self.index, self.address, device.vendor.name, device.product.name
            ),
            None => write!(f, "card #{} @{}", self.index, self.address),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct GpuInfo {
    pub graphics_cards: Vec<GraphicsCard>,
}

impl Display for GpuInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "gpu ({})", counted(self.graphics_cards.len(), "graphics card"))
    }
}

/// The index of a `card<N>` entry; connectors (`card0-HDMI-A-1`) and render nodes yield `None`.
fn card_index(name: &str) -> Option<usize> {
    let index = name.strip_prefix("card")?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    index.parse().ok()
}

/// The PCI address of a card from its class link, `../../devices/.../<address>/drm/card<N>`.
fn card_address(link: &Path) -> Option<PciAddress> {
    let target = read_link(link)?;
    let segments: Vec<_> = target.components().collect();
    let segment = segments.len().checked_sub(3).and_then(|at| segments.get(at))?;
    segment.as_os_str().to_str()?.parse().ok()
}

impl GpuInfo {
    /// Read the graphics cards under `ctx`'s root, attaching their functions from `pci`.
    #[must_use]
    pub fn read(ctx: &Context, pci: &PciInfo) -> GpuInfo {
        let class_drm = ctx.paths().sys_class_drm();
        let graphics_cards = read_dir(&class_drm)
            .iter()
            .filter_map(|name| {
                let index = card_index(name)?;
                let Some(address) = card_address(&class_drm.join(name)) else {
                    warn!(card = name, "unable to determine the PCI address");
                    return None;
                };
                let device = pci.get_device(address).cloned();
                if device.is_none() {
                    debug!(card = name, %address, "no PCI function for card");
                }
                Some(GraphicsCard {
                    index,
                    address,
                    device,
                })
            })
            .collect();
        GpuInfo { graphics_cards }
    }
}

#[cfg(target_os = "linux")]
impl Discover for GpuInfo {
    fn discover(ctx: &Context) -> Result<Self, Error> {
        ctx.run(|ctx| -> Result<GpuInfo, Error> {
            let pci = PciInfo::discover(ctx)?;
            Ok(GpuInfo::read(ctx, &pci))
        })?
    }
}

unsupported_platform!(GpuInfo, Gpu);
