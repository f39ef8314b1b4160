// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Command line of the `hwinv` tool

use clap::{Args, Parser, Subcommand, ValueEnum};
use hardware::Options;
use std::path::PathBuf;
use tracectl::LogLevel;

#[derive(Parser, Debug)]
#[command(name = "hwinv")]
#[command(about = "Hardware inventory of a Linux host", long_about = None)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cmdline {
    #[arg(
        long,
        global = true,
        value_name = "DIR",
        help = "Root of the host filesystem to inspect (overrides CHROOT)"
    )]
    pub chroot: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "ARCHIVE",
        help = "Inspect a snapshot archive instead of the host (overrides SNAPSHOT_PATH)"
    )]
    pub snapshot: Option<PathBuf>,

    #[arg(long, global = true, help = "Never run ethtool or blkid")]
    pub disable_tools: bool,

    #[arg(long, global = true, help = "Skip NUMA topology discovery and assume SMP")]
    pub disable_topology: bool,

    #[arg(long, global = true, help = "Only log errors")]
    pub disable_warnings: bool,

    #[arg(
        long,
        global = true,
        value_name = "LEVEL",
        help = "Log level: debug, info, warn or error (overrides LOG_LEVEL)"
    )]
    pub log_level: Option<LogLevel>,

    #[arg(long, global = true, help = "Plain key=value log lines")]
    pub logfmt: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the hardware inventory (all sections unless one is named)
    Inventory(InventoryArgs),
    /// Create or read snapshots of the pseudofiles discovery reads
    #[command(subcommand)]
    Snapshot(SnapshotCommand),
}

#[derive(Subcommand, Debug)]
pub enum SnapshotCommand {
    /// Capture the host (or --chroot) into a snapshot archive
    Create {
        #[arg(
            short,
            long,
            value_name = "ARCHIVE",
            help = "Archive to write (default <os>-<arch>-<md5(hostname)>.tar.gz)"
        )]
        output: Option<PathBuf>,
    },
    /// Show the inventory recorded in a snapshot archive
    Read {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,
        #[command(flatten)]
        inventory: InventoryArgs,
    },
}

/// The sections which can be shown on their own.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum Target {
    Block,
    Cpu,
    Memory,
    Topology,
    Net,
    Pci,
    Sriov,
    Gpu,
    Accelerator,
    Usb,
    Bios,
    Baseboard,
    Chassis,
    Product,
    /// bios, baseboard, chassis and product
    Dmi,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum Format {
    #[default]
    Text,
    Json,
    Yaml,
}

#[derive(Args, Debug)]
pub struct InventoryArgs {
    #[arg(value_enum, value_name = "SECTION")]
    pub section: Option<Target>,

    #[arg(long, value_enum, default_value_t = Format::Text, help = "Output format")]
    pub format: Format,

    #[arg(long, conflicts_with_all = ["yaml", "format"], help = "Same as --format json")]
    pub json: bool,

    #[arg(long, conflicts_with = "format", help = "Same as --format yaml")]
    pub yaml: bool,

    #[arg(long, help = "Indent JSON output")]
    pub pretty: bool,
}

impl InventoryArgs {
    /// The format asked for, with `--json` / `--yaml` taken into account.
    pub fn format(&self) -> Format {
        if self.json {
            Format::Json
        } else if self.yaml {
            Format::Yaml
        } else {
            self.format
        }
    }
}

impl Cmdline {
    /// Discovery options: the environment, overridden by the flags given.
    pub fn options(&self) -> Options {
        self.apply(Options::from_env())
    }

    fn apply(&self, mut options: Options) -> Options {
        if let Some(chroot) = &self.chroot {
            options = options.with_chroot(chroot);
        }
        if let Some(snapshot) = self.snapshot_path() {
            options = options.with_snapshot(snapshot);
        }
        if self.disable_tools {
            options = options.with_tools(false);
        }
        if self.disable_topology {
            options = options.with_topology(false);
        }
        if self.disable_warnings {
            options = options.with_warnings(false);
        }
        if let Some(level) = self.log_level {
            options = options.with_log_level(level);
        }
        if self.logfmt {
            options = options.with_logfmt(true);
        }
        options
    }

    /// The archive to read: `snapshot read <archive>` wins over `--snapshot`.
    fn snapshot_path(&self) -> Option<&PathBuf> {
        match &self.command {
            Command::Snapshot(SnapshotCommand::Read { archive, .. }) => Some(archive),
            _ => self.snapshot.as_ref(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn parse(args: &[&str]) -> Cmdline {
        Cmdline::try_parse_from(std::iter::once("hwinv").chain(args.iter().copied())).unwrap()
    }

    fn empty_env() -> Options {
        Options::from_vars(Vec::<(String, String)>::new())
    }

    #[test]
    fn command_is_well_formed() {
        Cmdline::command().debug_assert();
    }

    #[test]
    fn inventory_section_and_format() {
        let cmdline = parse(&["inventory", "block", "--json", "--pretty"]);
        let Command::Inventory(args) = &cmdline.command else {
            panic!("not an inventory command");
        };
        assert_eq!(args.section, Some(Target::Block));
        assert_eq!(args.format(), Format::Json);
        assert!(args.pretty);

        let cmdline = parse(&["inventory", "--format", "yaml"]);
        let Command::Inventory(args) = &cmdline.command else {
            panic!("not an inventory command");
        };
        assert_eq!(args.section, None);
        assert_eq!(args.format(), Format::Yaml);

        assert!(Cmdline::try_parse_from(["hwinv", "inventory", "--json", "--yaml"]).is_err());
        assert!(Cmdline::try_parse_from(["hwinv", "inventory", "disks"]).is_err());
    }

    #[test]
    fn global_flags_override_the_environment() {
        let cmdline = parse(&[
            "inventory",
            "--chroot",
            "/mnt/host",
            "--disable-tools",
            "--disable-topology",
            "--log-level",
            "debug",
        ]);
        let options = cmdline.apply(empty_env());
        assert_eq!(options.chroot, Path::new("/mnt/host"));
        assert!(!options.tools_enabled);
        assert!(!options.topology_enabled);
        assert_eq!(options.log.level, LogLevel::Debug);
        assert!(options.snapshot.is_none());
    }

    #[test]
    fn snapshot_read_sets_the_archive() {
        let cmdline = parse(&["snapshot", "read", "host.tar.gz", "cpu", "--format", "json"]);
        let options = cmdline.apply(empty_env());
        assert_eq!(options.snapshot.unwrap().path, Path::new("host.tar.gz"));

        let cmdline = parse(&["snapshot", "create", "-o", "out.tar.gz"]);
        let Command::Snapshot(SnapshotCommand::Create { output }) = &cmdline.command else {
            panic!("not a snapshot create command");
        };
        assert_eq!(output.as_deref(), Some(Path::new("out.tar.gz")));
    }
}
