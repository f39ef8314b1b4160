// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Discovery over an unpacked snapshot matches discovery over the tree it was taken from.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use hwinv_hardware::block::BlockInfo;
use hwinv_hardware::cpu::CpuInfo;
use hwinv_hardware::dmi::DmiInfo;
use hwinv_hardware::gpu::GpuInfo;
use hwinv_hardware::memory::MemoryInfo;
use hwinv_hardware::net::NetworkInfo;
use hwinv_hardware::pci::PciInfo;
use hwinv_hardware::pci::sriov::SriovInfo;
use hwinv_hardware::topology::TopologyInfo;
use hwinv_hardware::usb::UsbInfo;
use hwinv_hardware::{Context, Discover, HostInfo, Options};
use pretty_assertions::assert_eq;
use std::fmt::Debug;
use std::path::Path;
use test_utils::FakeRoot;
use test_utils::host;

fn packed(root: &FakeRoot, dir: &Path) -> std::path::PathBuf {
    let archive = dir.join("host.tar.gz");
    let report = snapshot::create(root.path(), &archive).unwrap();
    assert!(report.files > 0);
    assert!(report.links > 0);
    archive
}

fn same<T: Discover + Debug + PartialEq>(live: &Context, replay: &Context) {
    let expected = T::discover(live).unwrap();
    let replayed = T::discover(replay).unwrap();
    assert_eq!(replayed, expected);
}

#[test]
fn replay_matches_the_source_tree() {
    let root = host::sample_host();
    let scratch = tempfile::tempdir().unwrap();
    let archive = packed(&root, scratch.path());

    let live = Context::new(Options::default().with_chroot(root.path()));
    let replay = Context::new(Options::default().with_snapshot(&archive));

    same::<CpuInfo>(&live, &replay);
    same::<MemoryInfo>(&live, &replay);
    same::<TopologyInfo>(&live, &replay);
    same::<PciInfo>(&live, &replay);
    same::<SriovInfo>(&live, &replay);
    same::<GpuInfo>(&live, &replay);
    same::<UsbInfo>(&live, &replay);
    same::<DmiInfo>(&live, &replay);
    same::<BlockInfo>(&live, &replay);
}

#[test]
fn snapshots_leave_out_virtual_interfaces_and_addresses() {
    let root = host::sample_host();
    let scratch = tempfile::tempdir().unwrap();
    let archive = packed(&root, scratch.path());
    let replay = Context::new(Options::default().with_snapshot(&archive));

    let net = NetworkInfo::discover(&replay).unwrap();
    let [eth0] = net.nics.as_slice() else {
        panic!("unexpected interfaces {:?}", net.nics);
    };
    assert_eq!(eth0.name, "eth0");
    assert_eq!(eth0.mac_address, "");
    assert_eq!(eth0.pci_address, Some(host::NIC_PF.parse().unwrap()));
}

#[test]
fn unpacked_tree_lives_for_one_run() {
    let root = host::sample_host();
    let scratch = tempfile::tempdir().unwrap();
    let archive = packed(&root, scratch.path());
    let replay = Context::new(Options::default().with_snapshot(&archive));

    assert!(!replay.is_ready());
    let unpacked = replay
        .run(|ctx| {
            assert!(ctx.is_ready());
            let host = HostInfo::discover(ctx).unwrap();
            assert!(host.is_complete(), "{:?}", host.errors);
            ctx.chroot()
        })
        .unwrap();
    assert!(!replay.is_ready());
    assert!(!unpacked.exists());
}

#[test]
fn missing_archive_fails_discovery() {
    let replay = Context::new(Options::default().with_snapshot("/nonexistent/host.tar.gz"));
    assert!(matches!(
        CpuInfo::discover(&replay),
        Err(hwinv_hardware::Error::Snapshot(_))
    ));
    // the aggregate fails as a whole: no section could be read
    assert!(HostInfo::discover(&replay).is_err());
}
