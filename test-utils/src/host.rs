// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A small but complete fake host.
//!
//! The sample machine has one package with two cores (two threads each) spread over two NUMA
//! nodes, a PCI tree with a bridge, a GPU, an SR-IOV capable NIC with two virtual functions,
//! an accelerator, SATA and NVMe disks with partitions, a couple of network interfaces, USB
//! devices and DMI strings.

use crate::FakeRoot;

/// PCI address of the root port the GPU hangs off.
pub const BRIDGE: &str = "0000:00:01.0";
/// PCI address of the GPU.
pub const GPU: &str = "0000:01:00.0";
/// PCI address of the SR-IOV physical function.
pub const NIC_PF: &str = "0000:00:03.0";
/// PCI addresses of the virtual functions, in `virtfn<n>` order.
pub const NIC_VFS: [&str; 2] = ["0000:00:0a.0", "0000:00:0a.1"];
/// PCI address of the processing accelerator.
pub const ACCELERATOR: &str = "0000:00:04.0";
/// PCI address of the NVMe controller.
pub const NVME: &str = "0000:00:05.0";
/// PCI address of the SATA controller.
pub const SATA: &str = "0000:00:17.0";
/// PCI address of the USB host controller.
pub const USB_HOST: &str = "0000:00:14.0";

const PCI_ROOT: &str = "sys/devices/pci0000:00";

/// Relative path from a directory `depth` levels below `sys/` back up to `sys/`.
fn to_sys(depth: usize) -> String {
    "../".repeat(depth)
}

/// Description of one PCI function in the fixture.
pub struct PciFixture<'a> {
    /// Canonical directory relative to the fake root.
    pub dir: String,
    pub address: &'a str,
    pub modalias: &'a str,
    pub driver: Option<&'a str>,
    pub numa_node: i32,
    pub iommu_group: Option<u32>,
    pub revision: &'a str,
}

impl PciFixture<'_> {
    fn depth(&self) -> usize {
        // components below "sys"
        self.dir.split('/').count() - 1
    }
}

/// Write a PCI function's sysfs directory and its `bus/pci/devices` link.
pub fn pci_device(root: &FakeRoot, device: &PciFixture<'_>) {
    let dir = &device.dir;
    let up = to_sys(device.depth());
    root.file(format!("{dir}/modalias"), format!("{}\n", device.modalias))
        .file(format!("{dir}/revision"), format!("{}\n", device.revision))
        .file(format!("{dir}/numa_node"), format!("{}\n", device.numa_node))
        .file(format!("{dir}/irq"), "16\n")
        .file(format!("{dir}/local_cpulist"), "0-3\n")
        .symlink(format!("{dir}/subsystem"), format!("{up}bus/pci"));
    if let Some((class, vendor, product)) = ids_from_modalias(device.modalias) {
        root.file(format!("{dir}/class"), format!("0x{class}\n"))
            .file(format!("{dir}/vendor"), format!("0x{vendor}\n"))
            .file(format!("{dir}/device"), format!("0x{product}\n"));
    }
    if let Some(driver) = device.driver {
        root.symlink(
            format!("{dir}/driver"),
            format!("{up}bus/pci/drivers/{driver}"),
        );
    }
    if let Some(group) = device.iommu_group {
        root.symlink(
            format!("{dir}/iommu_group"),
            format!("{up}kernel/iommu_groups/{group}"),
        );
    }
    let link_target = dir.strip_prefix("sys/").unwrap_or(dir);
    root.symlink(
        format!("sys/bus/pci/devices/{}", device.address),
        format!("../../../{link_target}"),
    );
}

fn ids_from_modalias(modalias: &str) -> Option<(String, String, String)> {
    let vendor = modalias.get(9..13)?.to_ascii_lowercase();
    let product = modalias.get(18..22)?.to_ascii_lowercase();
    let class_at = modalias.find("bc")?;
    let class = modalias.get(class_at + 2..class_at + 4)?;
    let subclass = modalias.get(class_at + 6..class_at + 8)?;
    let prog_if = modalias.get(class_at + 9..class_at + 11)?;
    Some((
        format!("{class}{subclass}{prog_if}").to_ascii_lowercase(),
        vendor,
        product,
    ))
}

fn cpus(root: &FakeRoot) {
    root.file(
        "proc/cpuinfo",
        (0..4)
            .map(|lp| {
                format!(
                    "processor\t: {lp}\n\
                     vendor_id\t: GenuineIntel\n\
                     cpu family\t: 6\n\
                     model\t\t: 94\n\
                     model name\t: Intel(R) Xeon(R) CPU E3-1230 v5 @ 3.40GHz\n\
                     physical id\t: 0\n\
                     siblings\t: 4\n\
                     core id\t\t: {core}\n\
                     cpu cores\t: 2\n\
                     flags\t\t: fpu vme de pse sse sse2 ht\n\n",
                    core = lp % 2
                )
            })
            .collect::<String>(),
    );
    for lp in 0..4 {
        let core = lp % 2;
        let cpu = format!("sys/devices/system/cpu/cpu{lp}");
        let core_mask = if core == 0 { "05" } else { "0a" };
        root.file(format!("{cpu}/topology/physical_package_id"), "0\n")
            .file(format!("{cpu}/topology/core_id"), format!("{core}\n"));
        for (index, level, kind, size, map) in [
            (0, 1, "Data", "32K", core_mask),
            (1, 1, "Instruction", "32K", core_mask),
            (2, 2, "Unified", "256K", core_mask),
            (3, 3, "Unified", "8192K", "0f"),
        ] {
            let cache = format!("{cpu}/cache/index{index}");
            root.file(format!("{cache}/level"), format!("{level}\n"))
                .file(format!("{cache}/type"), format!("{kind}\n"))
                .file(format!("{cache}/size"), format!("{size}\n"))
                .file(format!("{cache}/shared_cpu_map"), format!("{map}\n"));
        }
    }
}

fn numa(root: &FakeRoot) {
    let nodes = "sys/devices/system/node";
    root.file(format!("{nodes}/online"), "0-1\n")
        .file(format!("{nodes}/possible"), "0-1\n");
    for node in 0..2usize {
        let dir = format!("{nodes}/node{node}");
        let distance = if node == 0 { "10 21\n" } else { "21 10\n" };
        root.file(format!("{dir}/distance"), distance)
            .file(format!("{dir}/cpulist"), if node == 0 { "0,2\n" } else { "1,3\n" })
            .file(
                format!("{dir}/meminfo"),
                format!(
                    "Node {node} MemTotal:        8151966 kB\nNode {node} MemFree:         4000000 kB\n"
                ),
            );
        // the even logical processors live on node 0, the odd ones on node 1
        for lp in [node, node + 2] {
            root.symlink(format!("{dir}/cpu{lp}"), format!("../../cpu/cpu{lp}"));
        }
        for block in (node * 8)..(node * 8 + 8) {
            root.symlink(
                format!("{dir}/memory{block}"),
                format!("../../memory/memory{block}"),
            );
        }
        let huge = format!("{dir}/hugepages/hugepages-2048kB");
        root.file(format!("{huge}/nr_hugepages"), "2\n")
            .file(format!("{huge}/free_hugepages"), "2\n")
            .file(format!("{huge}/surplus_hugepages"), "0\n");
    }
}

fn memory(root: &FakeRoot) {
    root.file(
        "proc/meminfo",
        "MemTotal:       16303932 kB\n\
         MemFree:         8000000 kB\n\
         MemAvailable:   12000000 kB\n\
         HugePages_Total:       4\n\
         Hugepagesize:       2048 kB\n",
    );
    // sixteen one GiB blocks
    root.file("sys/devices/system/memory/block_size_bytes", "40000000\n");
    for block in 0..16 {
        root.file(
            format!("sys/devices/system/memory/memory{block}/online"),
            "1\n",
        );
    }
    for (size, total) in [("2048kB", "4"), ("1048576kB", "0")] {
        let dir = format!("sys/kernel/mm/hugepages/hugepages-{size}");
        root.file(format!("{dir}/nr_hugepages"), format!("{total}\n"))
            .file(format!("{dir}/free_hugepages"), format!("{total}\n"))
            .file(format!("{dir}/surplus_hugepages"), "0\n")
            .file(format!("{dir}/resv_hugepages"), "0\n");
    }
}

fn pci(root: &FakeRoot) {
    let bridge_dir = format!("{PCI_ROOT}/{BRIDGE}");
    let devices = [
        PciFixture {
            dir: bridge_dir.clone(),
            address: BRIDGE,
            modalias: "pci:v00008086d00001901sv00001043sd00008694bc06sc04i00",
            driver: Some("pcieport"),
            numa_node: 0,
            iommu_group: Some(1),
            revision: "0x07",
        },
        PciFixture {
            dir: format!("{bridge_dir}/{GPU}"),
            address: GPU,
            modalias: "pci:v000010DEd00001C82sv00001043sd00008613bc03sc00i00",
            driver: Some("nvidia"),
            numa_node: 0,
            iommu_group: Some(1),
            revision: "0xa1",
        },
        PciFixture {
            dir: format!("{PCI_ROOT}/{NIC_PF}"),
            address: NIC_PF,
            modalias: "pci:v00008086d00001572sv00008086sd00000000bc02sc00i00",
            driver: Some("i40e"),
            numa_node: 1,
            iommu_group: Some(2),
            revision: "0x01",
        },
        PciFixture {
            dir: format!("{PCI_ROOT}/{}", NIC_VFS[0]),
            address: NIC_VFS[0],
            modalias: "pci:v00008086d0000154Csv00008086sd00000000bc02sc00i00",
            driver: Some("iavf"),
            numa_node: 1,
            iommu_group: Some(20),
            revision: "0x01",
        },
        PciFixture {
            dir: format!("{PCI_ROOT}/{}", NIC_VFS[1]),
            address: NIC_VFS[1],
            modalias: "pci:v00008086d0000154Csv00008086sd00000000bc02sc00i00",
            driver: None,
            numa_node: 1,
            iommu_group: Some(21),
            revision: "0x01",
        },
        PciFixture {
            dir: format!("{PCI_ROOT}/{ACCELERATOR}"),
            address: ACCELERATOR,
            modalias: "pci:v00001AE0d00000027sv00001AE0sd00000000bc12sc00i00",
            driver: None,
            numa_node: -1,
            iommu_group: None,
            revision: "0x00",
        },
        PciFixture {
            dir: format!("{PCI_ROOT}/{NVME}"),
            address: NVME,
            modalias: "pci:v0000144Dd0000A808sv0000144Dsd0000A801bc01sc08i02",
            driver: Some("nvme"),
            numa_node: 1,
            iommu_group: Some(3),
            revision: "0x00",
        },
        PciFixture {
            dir: format!("{PCI_ROOT}/{SATA}"),
            address: SATA,
            modalias: "pci:v00008086d0000A352sv00001043sd00008694bc01sc06i01",
            driver: Some("ahci"),
            numa_node: 0,
            iommu_group: Some(4),
            revision: "0x10",
        },
        PciFixture {
            dir: format!("{PCI_ROOT}/{USB_HOST}"),
            address: USB_HOST,
            modalias: "pci:v00008086d0000A36Dsv00001043sd00008694bc0Csc03i30",
            driver: Some("xhci_hcd"),
            numa_node: 0,
            iommu_group: Some(5),
            revision: "0x10",
        },
    ];
    for device in &devices {
        pci_device(root, device);
    }

    let pf = format!("{PCI_ROOT}/{NIC_PF}");
    root.file(format!("{pf}/sriov_totalvfs"), "8\n")
        .file(format!("{pf}/sriov_numvfs"), "2\n");
    for (index, vf) in NIC_VFS.iter().enumerate() {
        root.symlink(format!("{pf}/virtfn{index}"), format!("../{vf}"))
            .symlink(format!("{PCI_ROOT}/{vf}/physfn"), format!("../{NIC_PF}"));
    }
}

fn drm(root: &FakeRoot) {
    let gpu = format!("devices/pci0000:00/{BRIDGE}/{GPU}");
    root.dir(format!("sys/{gpu}/drm/card0"))
        .dir(format!("sys/{gpu}/drm/card0/card0-HDMI-A-1"))
        .dir(format!("sys/{gpu}/drm/renderD128"))
        .symlink("sys/class/drm/card0", format!("../../{gpu}/drm/card0"))
        .symlink(
            "sys/class/drm/card0-HDMI-A-1",
            format!("../../{gpu}/drm/card0/card0-HDMI-A-1"),
        )
        .symlink("sys/class/drm/renderD128", format!("../../{gpu}/drm/renderD128"));
}

fn net(root: &FakeRoot) {
    let eth0 = format!("devices/pci0000:00/{NIC_PF}/net/eth0");
    root.file(format!("sys/{eth0}/addr_assign_type"), "0\n")
        .file(format!("sys/{eth0}/address"), "3c:fd:fe:aa:bb:cc\n")
        .file(format!("sys/{eth0}/speed"), "10000\n")
        .file(format!("sys/{eth0}/duplex"), "full\n")
        .symlink(format!("sys/{eth0}/device"), "../../../0000:00:03.0")
        .symlink("sys/class/net/eth0", format!("../../{eth0}"));

    for (name, assign) in [("lo", "0"), ("veth0", "3")] {
        let dir = format!("devices/virtual/net/{name}");
        root.file(format!("sys/{dir}/addr_assign_type"), format!("{assign}\n"))
            .file(format!("sys/{dir}/address"), "00:00:00:00:00:00\n")
            .symlink(format!("sys/class/net/{name}"), format!("../../{dir}"));
    }
}

fn block(root: &FakeRoot) {
    let sda = format!("devices/pci0000:00/{SATA}/ata1/host0/target0:0:0/0:0:0:0/block/sda");
    root.file(format!("sys/{sda}/dev"), "8:0\n")
        .file(format!("sys/{sda}/size"), "1953525168\n")
        .file(format!("sys/{sda}/removable"), "0\n")
        .file(format!("sys/{sda}/ro"), "0\n")
        .file(format!("sys/{sda}/queue/rotational"), "1\n")
        .file(format!("sys/{sda}/queue/physical_block_size"), "4096\n")
        .file(format!("sys/{sda}/device/vendor"), "ATA     \n")
        .file(format!("sys/{sda}/device/model"), "ST1000DM010-2EP1\n")
        .file(format!("sys/{sda}/sda1/dev"), "8:1\n")
        .file(format!("sys/{sda}/sda1/size"), "1048576\n")
        .file(format!("sys/{sda}/sda1/ro"), "0\n")
        .file(format!("sys/{sda}/sda2/dev"), "8:2\n")
        .file(format!("sys/{sda}/sda2/size"), "1952474000\n")
        .file(format!("sys/{sda}/sda2/ro"), "0\n")
        .dir(format!("sys/{sda}/queue/iosched"))
        .symlink("sys/block/sda", format!("../{sda}"));

    let nvme = format!("devices/pci0000:00/{NVME}/nvme/nvme0/nvme0n1");
    root.file(format!("sys/{nvme}/dev"), "259:0\n")
        .file(format!("sys/{nvme}/size"), "1000215216\n")
        .file(format!("sys/{nvme}/removable"), "0\n")
        .file(format!("sys/{nvme}/ro"), "0\n")
        .file(format!("sys/{nvme}/queue/rotational"), "0\n")
        .file(format!("sys/{nvme}/queue/physical_block_size"), "512\n")
        .file(format!("sys/{nvme}/nvme0n1p1/dev"), "259:1\n")
        .file(format!("sys/{nvme}/nvme0n1p1/size"), "1000212480\n")
        .file(format!("sys/{nvme}/nvme0n1p1/ro"), "0\n")
        .symlink("sys/block/nvme0n1", format!("../{nvme}"));

    let loop0 = "devices/virtual/block/loop0";
    root.file(format!("sys/{loop0}/dev"), "7:0\n")
        .file(format!("sys/{loop0}/size"), "0\n")
        .symlink("sys/block/loop0", format!("../{loop0}"));

    root.file(
        "run/udev/data/b8:0",
        "E:ID_MODEL=ST1000DM010-2EP102\n\
         E:ID_SERIAL=ST1000DM010-2EP102_Z9A5XXXX\n\
         E:ID_SERIAL_SHORT=Z9A5XXXX\n\
         E:ID_WWN=0x5000c500a1b2c3d4\n\
         E:ID_PATH=pci-0000:00:17.0-ata-1\n",
    )
    .file(
        "run/udev/data/b8:1",
        "E:ID_FS_TYPE=vfat\n\
         E:ID_FS_LABEL=EFI\n\
         E:ID_PART_ENTRY_NAME=EFI System Partition\n\
         E:ID_PART_ENTRY_UUID=6c5c1f44-2d9b-4f0e-8a8e-0d4b3c2a1f00\n",
    )
    .file(
        "run/udev/data/b8:2",
        "E:ID_FS_TYPE=ext4\n\
         E:ID_PART_ENTRY_UUID=0a1b2c3d-0000-4000-8000-000000000002\n",
    )
    .file(
        "run/udev/data/b259:0",
        "E:ID_MODEL=Samsung SSD 970 EVO Plus 500GB\n\
         E:ID_SERIAL=Samsung_SSD_970_EVO_Plus_500GB_S4EVNX0N\n\
         E:ID_SERIAL_SHORT=S4EVNX0N\n\
         E:ID_WWN_WITH_EXTENSION=eui.0025385b91b0a1c2\n\
         E:ID_WWN=eui.0025385b91b0a1c2\n\
         E:ID_PATH=pci-0000:00:05.0-nvme-1\n",
    )
    .file(
        "run/udev/data/b259:1",
        "E:ID_FS_TYPE=ext4\n\
         E:ID_FS_LABEL=root\n\
         E:ID_PART_ENTRY_UUID=11111111-2222-3333-4444-555555555555\n",
    );

    root.file(
        "proc/self/mounts",
        "sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0\n\
         /dev/nvme0n1p1 / ext4 rw,relatime,errors=remount-ro 0 0\n\
         /dev/sda1 /boot/efi vfat rw,relatime 0 0\n\
         /dev/sda2 /home/Name\\040with\\040spaces ext4 ro,relatime 0 0\n",
    );
}

fn usb(root: &FakeRoot) {
    let dev = format!("devices/pci0000:00/{USB_HOST}/usb1/1-1");
    root.file(
        format!("sys/{dev}/uevent"),
        "MAJOR=189\nMINOR=1\nDEVNAME=bus/usb/001/002\nDEVTYPE=usb_device\n\
         DRIVER=usb\nPRODUCT=46d/c52b/1211\nTYPE=0/0/0\nBUSNUM=001\nDEVNUM=002\n",
    )
    .file(format!("sys/{dev}/product"), "USB Receiver\n")
    .symlink("sys/bus/usb/devices/1-1", format!("../../../{dev}"));

    let intf = format!("{dev}/1-1:1.0");
    root.file(
        format!("sys/{intf}/uevent"),
        "DEVTYPE=usb_interface\nDRIVER=usbhid\nPRODUCT=46a/a087/101\nTYPE=0/0/0\nINTERFACE=3/1/1\n",
    )
    .file(format!("sys/{intf}/interface"), "Keyboard\n")
    .symlink("sys/bus/usb/devices/1-1:1.0", format!("../../../{intf}"));
}

fn dmi(root: &FakeRoot) {
    let id = "sys/devices/virtual/dmi/id";
    for (name, value) in [
        ("bios_vendor", "American Megatrends Inc."),
        ("bios_version", "3805"),
        ("bios_date", "05/16/2018"),
        ("board_vendor", "ASUSTeK COMPUTER INC."),
        ("board_name", "PRIME Z270-A"),
        ("board_version", "Rev 1.xx"),
        ("board_asset_tag", "Default string"),
        ("chassis_type", "3"),
        ("chassis_vendor", "Default string"),
        ("chassis_version", "Default string"),
        ("chassis_asset_tag", "Default string"),
        ("product_family", "To be filled by O.E.M."),
        ("product_name", "System Product Name"),
        ("sys_vendor", "System manufacturer"),
        ("product_version", "System Version"),
        ("product_sku", "SKU"),
        ("product_uuid", "2c9d8f3e-1e4b-11e8-9f6a-e0d55e0a1b2c"),
    ] {
        root.file(format!("{id}/{name}"), format!("{value}\n"));
    }
    root.symlink("sys/class/dmi/id", "../../devices/virtual/dmi/id");
}

/// Populate `root` with the complete sample host.
pub fn populate(root: &FakeRoot) {
    cpus(root);
    numa(root);
    memory(root);
    pci(root);
    drm(root);
    net(root);
    block(root);
    usb(root);
    dmi(root);
}

/// A fresh [`FakeRoot`] holding the sample host.
pub fn sample_host() -> FakeRoot {
    let root = FakeRoot::new();
    populate(&root);
    root
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn modalias_ids() {
        assert_eq!(
            ids_from_modalias("pci:v000010DEd00001C82sv00001043sd00008613bc03sc00i00"),
            Some((
                "030000".to_string(),
                "10de".to_string(),
                "1c82".to_string()
            ))
        );
    }

    #[test]
    fn sample_host_links_resolve() {
        let root = sample_host();
        for link in [
            format!("sys/bus/pci/devices/{GPU}/modalias"),
            "sys/class/net/eth0/device/modalias".to_string(),
            "sys/block/sda/sda1/size".to_string(),
            "sys/devices/system/node/node1/cpu3/topology/core_id".to_string(),
            "sys/class/dmi/id/bios_vendor".to_string(),
        ] {
            assert!(root.join(&link).exists(), "{link}");
        }
    }
}
