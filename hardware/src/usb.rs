// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! USB devices and interfaces, from `/sys/bus/usb/devices/*/uevent`.

use crate::context::Context;
use crate::support::counted;
use crate::{Discover, Error, UNKNOWN, string_or_unknown, unsupported_platform};
use std::fmt::{Display, Formatter};
use std::path::Path;
use sysfs::read::{key_values, read_dir, read_trimmed};
use tracing::debug;

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct UsbDevice {
    /// The sysfs entry name (`1-1`, `1-1:1.0`, `usb1`, ...).
    pub name: String,
    pub driver: String,
    /// `TYPE` as `class/subclass/protocol`.
    #[cfg_attr(any(test, feature = "serde"), serde(rename = "type"))]
    pub device_type: String,
    pub vendor_id: String,
    pub product_id: String,
    pub revision_id: String,
    pub product: String,
    pub interface: String,
    pub bus_number: Option<u32>,
    pub device_number: Option<u32>,
}

impl UsbDevice {
    /// A device described by the contents of its `uevent` file, with `name` and the sibling
    /// file strings left for the caller.
    #[must_use]
    pub fn from_uevent(contents: &str) -> UsbDevice {
        let values = key_values(contents, '=');
        let value = |key: &str| {
            values
                .get(key)
                .filter(|value| !value.is_empty())
                .cloned()
                .unwrap_or_else(|| UNKNOWN.to_string())
        };
        let mut ids = values
            .get("PRODUCT")
            .map(|product| product.split('/').map(str::to_string).collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter();
        let mut id = || ids.next().unwrap_or_else(|| UNKNOWN.to_string());
        let (vendor_id, product_id, revision_id) = (id(), id(), id());
        let number = |key: &str| values.get(key).and_then(|value| value.parse().ok());
        UsbDevice {
            name: String::new(),
            driver: value("DRIVER"),
            device_type: value("TYPE"),
            vendor_id,
            product_id,
            revision_id,
            product: UNKNOWN.to_string(),
            interface: UNKNOWN.to_string(),
            bus_number: number("BUSNUM"),
            device_number: number("DEVNUM"),
        }
    }
}

impl Display for UsbDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}:{} [{}] driver={}",
            self.name, self.vendor_id, self.product_id, self.product, self.driver
        )
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct UsbInfo {
    pub devices: Vec<UsbDevice>,
}

impl Display for UsbInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "USB ({})", counted(self.devices.len(), "device"))
    }
}

fn read_device(dir: &Path, name: &str) -> Option<UsbDevice> {
    let Some(uevent) = read_trimmed(dir.join("uevent")) else {
        debug!(device = name, "no uevent");
        return None;
    };
    Some(UsbDevice {
        name: name.to_string(),
        product: string_or_unknown(dir.join("product")),
        interface: string_or_unknown(dir.join("interface")),
        ..UsbDevice::from_uevent(&uevent)
    })
}

fn read_usb(ctx: &Context) -> UsbInfo {
    let devices_dir = ctx.paths().sys_bus_usb_devices();
    UsbInfo {
        devices: read_dir(&devices_dir)
            .iter()
            .filter_map(|name| read_device(&devices_dir.join(name), name))
            .collect(),
    }
}

#[cfg(target_os = "linux")]
impl Discover for UsbInfo {
    fn discover(ctx: &Context) -> Result<Self, Error> {
        ctx.run(read_usb)
    }
}

unsupported_platform!(UsbInfo, Usb);

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;
    use crate::context::Options;
    use pretty_assertions::assert_eq;
    use test_utils::host;

    #[test]
    fn uevent_fields() {
        let device = UsbDevice::from_uevent(
            "DEVTYPE=usb_interface\nDRIVER=usbhid\nPRODUCT=46a/a087/101\nTYPE=0/0/0\n\
             INTERFACE=3/1/1\n",
        );
        assert_eq!(device.driver, "usbhid");
        assert_eq!(device.device_type, "0/0/0");
        assert_eq!(device.vendor_id, "46a");
        assert_eq!(device.product_id, "a087");
        assert_eq!(device.revision_id, "101");
        assert_eq!(device.bus_number, None);
    }

    #[test]
    fn short_product_line() {
        let device = UsbDevice::from_uevent("PRODUCT=1d6b/2\n");
        assert_eq!(device.vendor_id, "1d6b");
        assert_eq!(device.product_id, "2");
        assert_eq!(device.revision_id, UNKNOWN);
        assert_eq!(device.driver, UNKNOWN);
    }

    #[test]
    fn sample_devices() {
        let root = host::sample_host();
        let ctx = Context::new(Options::default().with_chroot(root.path()));
        let usb = UsbInfo::discover(&ctx).unwrap();
        assert_eq!(usb.to_string(), "USB (2 devices)");
        let receiver = &usb.devices[0];
        assert_eq!(receiver.name, "1-1");
        assert_eq!(receiver.product, "USB Receiver");
        assert_eq!(receiver.interface, UNKNOWN);
        assert_eq!(receiver.bus_number, Some(1));
        assert_eq!(receiver.device_number, Some(2));
        let keyboard = &usb.devices[1];
        assert_eq!(keyboard.name, "1-1:1.0");
        assert_eq!(keyboard.driver, "usbhid");
        assert_eq!(keyboard.interface, "Keyboard");
        assert_eq!(keyboard.to_string(), "1-1:1.0 46a:a087 [UNKNOWN] driver=usbhid");
    }
}
