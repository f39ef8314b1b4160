// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Network interfaces.

use crate::context::Context;
use crate::pci::address::PciAddress;
use crate::support::counted;
use crate::{Discover, Error, string_or_unknown, unsupported_platform};
use std::fmt::{Display, Formatter};
use std::path::Path;
use sysfs::read::{read_dir, read_int, read_link, read_trimmed};
use sysfs::tool::{self, DEFAULT_TIMEOUT, Tool};
use tracing::{debug, warn};

/// `addr_assign_type` of a permanent (burned in) address.
const ADDR_ASSIGN_PERMANENT: i64 = 0;

/// An offload or other feature of a NIC, as reported by `ethtool -k`.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct NicCapability {
    pub name: String,
    pub is_enabled: bool,
    /// False for features the driver reports as `[fixed]`.
    pub can_enable: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Nic {
    pub name: String,
    /// The permanent MAC address; empty if the address is random, stolen or set by userspace.
    pub mac_address: String,
    /// True for software interfaces (bridges, veths, tunnels, ...).
    pub is_virtual: bool,
    pub speed: String,
    pub duplex: String,
    pub capabilities: Vec<NicCapability>,
    /// The PCI function backing the interface, if any.
    pub pci_address: Option<PciAddress>,
}

impl Display for Nic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_virtual { "virtual " } else { "" };
        write!(f, "{} {kind}NIC", self.name)?;
        if let Some(address) = &self.pci_address {
            write!(f, " ({address})")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct NetworkInfo {
    pub nics: Vec<Nic>,
}

impl Display for NetworkInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "net ({})", counted(self.nics.len(), "NIC"))
    }
}

/// Parse the output of `ethtool -k <interface>`.
///
/// The first line is a header; every other line is `name: on|off` optionally followed by
/// `[fixed]` or `[requested on]`.
#[must_use]
pub fn parse_ethtool_features(output: &str) -> Vec<NicCapability> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let (name, state) = line.split_once(':')?;
            let state = state.trim();
            let is_enabled = match state.split_whitespace().next()? {
                "on" => true,
                "off" => false,
                _ => return None,
            };
            Some(NicCapability {
                name: name.trim().to_string(),
                is_enabled,
                can_enable: !state.contains("[fixed]"),
            })
        })
        .collect()
}

/// The PCI function backing the network device at `dir`.
///
/// Walks up from the `device` link target to the first directory whose `subsystem` is the
/// PCI bus, never looking above `/sys`.
fn pci_address(sys: &Path, dir: &Path) -> Option<PciAddress> {
    let sys = std::fs::canonicalize(sys).ok()?;
    let device = std::fs::canonicalize(dir.join("device")).ok()?;
    device
        .ancestors()
        .take_while(|ancestor| ancestor.starts_with(&sys))
        .find_map(|ancestor| {
            let subsystem = read_link(ancestor.join("subsystem"))?;
            if !subsystem.ends_with("bus/pci") {
                return None;
            }
            ancestor.file_name()?.to_str()?.parse().ok()
        })
}

fn capabilities(ctx: &Context, name: &str) -> Vec<NicCapability> {
    if !ctx.tools_available() {
        return Vec::new();
    }
    match tool::run(Tool::Ethtool, &["-k", name], DEFAULT_TIMEOUT) {
        Ok(output) => parse_ethtool_features(&output),
        Err(err) => {
            warn!(interface = name, "unable to query features: {err}");
            Vec::new()
        }
    }
}

fn read_nic(ctx: &Context, class_net: &Path, name: &str) -> Nic {
    let link = class_net.join(name);
    let is_virtual = read_link(&link)
        .is_some_and(|target| target.to_string_lossy().contains("devices/virtual/net"));
    let mac_address = if read_int(link.join("addr_assign_type")) == ADDR_ASSIGN_PERMANENT {
        read_trimmed(link.join("address")).unwrap_or_default()
    } else {
        debug!(interface = name, "address is not permanent");
        String::new()
    };
    Nic {
        name: name.to_string(),
        mac_address,
        is_virtual,
        speed: string_or_unknown(link.join("speed")),
        duplex: string_or_unknown(link.join("duplex")),
        capabilities: capabilities(ctx, name),
        pci_address: if is_virtual {
            None
        } else {
            pci_address(&ctx.paths().sys(), &link)
        },
    }
}

fn read_network(ctx: &Context) -> NetworkInfo {
    let class_net = ctx.paths().sys_class_net();
    NetworkInfo {
        nics: read_dir(&class_net)
            .iter()
            .filter(|name| *name != "lo")
            .map(|name| read_nic(ctx, &class_net, name))
            .collect(),
    }
}

#[cfg(target_os = "linux")]
impl Discover for NetworkInfo {
    fn discover(ctx: &Context) -> Result<Self, Error> {
        ctx.run(read_network)
    }
}

unsupported_platform!(NetworkInfo, Net);
