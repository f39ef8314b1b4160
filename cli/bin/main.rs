// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all, clippy::pedantic)]

mod cmdline;
mod output;

use crate::cmdline::{Cmdline, Command, InventoryArgs, SnapshotCommand, Target};
use crate::output::{RenderError, render};
use clap::Parser;
use hardware::accelerator::AcceleratorInfo;
use hardware::block::BlockInfo;
use hardware::cpu::CpuInfo;
use hardware::dmi::DmiInfo;
use hardware::dmi::baseboard::Baseboard;
use hardware::dmi::bios::Bios;
use hardware::dmi::chassis::Chassis;
use hardware::dmi::product::Product;
use hardware::gpu::GpuInfo;
use hardware::memory::MemoryInfo;
use hardware::net::NetworkInfo;
use hardware::pci::PciInfo;
use hardware::pci::sriov::SriovInfo;
use hardware::topology::TopologyInfo;
use hardware::usb::UsbInfo;
use hardware::{Context, Discover, HostInfo};
use serde::Serialize;
use snapshot::SnapshotError;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Discovery(#[from] hardware::Error),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

fn show<T: Discover + Serialize + Display>(
    ctx: &Context,
    name: &str,
    args: &InventoryArgs,
) -> Result<(), CliError> {
    let value = T::discover(ctx)?;
    println!("{}", render(name, &value, args.format(), args.pretty)?);
    Ok(())
}

fn inventory(ctx: &Context, args: &InventoryArgs) -> Result<(), CliError> {
    let Some(section) = args.section else {
        let host = HostInfo::discover(ctx)?;
        println!("{}", render("host", &host, args.format(), args.pretty)?);
        return Ok(host.check()?);
    };
    match section {
        Target::Block => show::<BlockInfo>(ctx, "block", args),
        Target::Cpu => show::<CpuInfo>(ctx, "cpu", args),
        Target::Memory => show::<MemoryInfo>(ctx, "memory", args),
        Target::Topology => show::<TopologyInfo>(ctx, "topology", args),
        Target::Net => show::<NetworkInfo>(ctx, "network", args),
        Target::Pci => show::<PciInfo>(ctx, "pci", args),
        Target::Sriov => show::<SriovInfo>(ctx, "sriov", args),
        Target::Gpu => show::<GpuInfo>(ctx, "gpu", args),
        Target::Accelerator => show::<AcceleratorInfo>(ctx, "accelerator", args),
        Target::Usb => show::<UsbInfo>(ctx, "usb", args),
        Target::Bios => show::<Bios>(ctx, "bios", args),
        Target::Baseboard => show::<Baseboard>(ctx, "baseboard", args),
        Target::Chassis => show::<Chassis>(ctx, "chassis", args),
        Target::Product => show::<Product>(ctx, "product", args),
        Target::Dmi => show::<DmiInfo>(ctx, "dmi", args),
    }
}

fn create_snapshot(source_root: &Path, output: Option<&PathBuf>) -> Result<(), CliError> {
    let archive = match output {
        Some(path) => path.clone(),
        None => PathBuf::from(snapshot::default_archive_name()?),
    };
    let report = snapshot::create(source_root, &archive)?;
    info!(
        files = report.files,
        links = report.links,
        dirs = report.dirs,
        skipped = report.skipped,
        "snapshot written"
    );
    println!("{}", archive.display());
    Ok(())
}

fn run(cmdline: &Cmdline) -> Result<(), CliError> {
    let options = cmdline.options();
    // a subscriber installed earlier (e.g. by an embedding process) is kept
    let _ = tracectl::init(&options.log);
    let source_root = options.chroot.clone();
    let ctx = Context::new(options);
    match &cmdline.command {
        Command::Inventory(args)
        | Command::Snapshot(SnapshotCommand::Read {
            inventory: args, ..
        }) => inventory(&ctx, args),
        Command::Snapshot(SnapshotCommand::Create { output }) => {
            create_snapshot(&source_root, output.as_ref())
        }
    }
}

fn main() -> ExitCode {
    let cmdline = Cmdline::parse();
    match run(&cmdline) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("hwinv: {err}");
            ExitCode::FAILURE
        }
    }
}
