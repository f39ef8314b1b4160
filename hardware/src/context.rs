// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Discovery configuration.
//!
//! [`Options`] is assembled from the environment ([`Options::from_env`]) and then refined with
//! the `with_*` modifiers; later modifiers win.
//! [`Context::new`] freezes the options for a discovery run.
//!
//! | variable             | effect                                                        |
//! |----------------------|---------------------------------------------------------------|
//! | `CHROOT`             | root of the host filesystem (default `/`)                     |
//! | `SNAPSHOT_PATH`      | discover from this snapshot archive instead of the host       |
//! | `SNAPSHOT_ROOT`      | unpack the snapshot here instead of a temporary directory     |
//! | `SNAPSHOT_EXCLUSIVE` | only unpack into `SNAPSHOT_ROOT` if it is empty               |
//! | `SNAPSHOT_PRESERVE`  | keep the unpacked snapshot after the run                      |
//! | `DISABLE_WARNINGS`   | only log errors                                               |
//! | `DISABLE_TOOLS`      | never run `ethtool` / `blkid`                                 |
//! | `DISABLE_TOPOLOGY`   | skip NUMA topology discovery (assume SMP)                     |
//! | `LOG_LEVEL`          | `debug`, `info`, `warn` or `error`                            |
//! | `LOG_LOGFMT`         | plain `key=value` log lines                                   |
//! | `PCIDB_PATH`         | `pci.ids` file to use instead of the embedded PCI database    |
//!
//! Boolean variables accept `0/1/true/false/yes/no/on/off`.

use crate::error::Error;
use crate::pci::db::PciIdLookup;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sysfs::read::parse_bool;
use sysfs::{PathOverrides, Paths};
use tempfile::TempDir;
use tracectl::{LogLevel, LogSettings};
use tracing::{debug, warn};

pub const ENV_CHROOT: &str = "CHROOT";
pub const ENV_SNAPSHOT_PATH: &str = "SNAPSHOT_PATH";
pub const ENV_SNAPSHOT_ROOT: &str = "SNAPSHOT_ROOT";
pub const ENV_SNAPSHOT_EXCLUSIVE: &str = "SNAPSHOT_EXCLUSIVE";
pub const ENV_SNAPSHOT_PRESERVE: &str = "SNAPSHOT_PRESERVE";
pub const ENV_DISABLE_WARNINGS: &str = "DISABLE_WARNINGS";
pub const ENV_DISABLE_TOOLS: &str = "DISABLE_TOOLS";
pub const ENV_DISABLE_TOPOLOGY: &str = "DISABLE_TOPOLOGY";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
pub const ENV_LOG_LOGFMT: &str = "LOG_LOGFMT";
pub const ENV_PCIDB_PATH: &str = "PCIDB_PATH";

/// Where a snapshot archive is unpacked and what happens to it afterwards.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SnapshotOptions {
    /// The archive.
    pub path: PathBuf,
    /// Unpack here instead of into a temporary directory.
    pub root: Option<PathBuf>,
    /// Only unpack if `root` is empty (otherwise reuse its content).
    pub exclusive: bool,
    /// Keep the unpacked tree after the last user releases it.
    pub preserve: bool,
}

impl SnapshotOptions {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> SnapshotOptions {
        SnapshotOptions {
            path: path.into(),
            ..SnapshotOptions::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct Options {
    pub chroot: PathBuf,
    pub overrides: PathOverrides,
    pub snapshot: Option<SnapshotOptions>,
    pub tools_enabled: bool,
    pub topology_enabled: bool,
    pub log: LogSettings,
    /// A `pci.ids` file, resolved under the chroot.
    pub pci_ids_path: Option<PathBuf>,
    /// A preloaded PCI database, shared between runs.
    pub pci_db: Option<Arc<dyn PciIdLookup>>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            chroot: PathBuf::from("/"),
            overrides: PathOverrides::default(),
            snapshot: None,
            tools_enabled: true,
            topology_enabled: true,
            log: LogSettings::default(),
            pci_ids_path: None,
            pci_db: None,
        }
    }
}

fn env_flag(key: &str, value: &str) -> Option<bool> {
    match parse_bool(value) {
        Ok(flag) => Some(flag),
        Err(err) => {
            warn!(variable = key, "ignoring environment variable: {err}");
            None
        }
    }
}

impl Options {
    /// Options from the process environment.
    #[must_use]
    pub fn from_env() -> Options {
        Options::from_vars(std::env::vars())
    }

    /// Options from an explicit set of `(variable, value)` pairs.
    ///
    /// Unknown variables are ignored, as are variables with empty values.
    #[must_use]
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Options
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = Options::default();
        let mut snapshot = SnapshotOptions::default();
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());
            if value.is_empty() {
                continue;
            }
            match key {
                ENV_CHROOT => options.chroot = PathBuf::from(value),
                ENV_SNAPSHOT_PATH => snapshot.path = PathBuf::from(value),
                ENV_SNAPSHOT_ROOT => snapshot.root = Some(PathBuf::from(value)),
                ENV_SNAPSHOT_EXCLUSIVE => {
                    snapshot.exclusive = env_flag(key, value).unwrap_or(snapshot.exclusive);
                }
                ENV_SNAPSHOT_PRESERVE => {
                    snapshot.preserve = env_flag(key, value).unwrap_or(snapshot.preserve);
                }
                ENV_DISABLE_WARNINGS => {
                    if let Some(disable) = env_flag(key, value) {
                        options.log.warnings = !disable;
                    }
                }
                ENV_DISABLE_TOOLS => {
                    if let Some(disable) = env_flag(key, value) {
                        options.tools_enabled = !disable;
                    }
                }
                ENV_DISABLE_TOPOLOGY => {
                    if let Some(disable) = env_flag(key, value) {
                        options.topology_enabled = !disable;
                    }
                }
                ENV_LOG_LEVEL => match value.parse::<LogLevel>() {
                    Ok(level) => options.log.level = level,
                    Err(err) => warn!(variable = key, value, "ignoring log level: {err}"),
                },
                ENV_LOG_LOGFMT => {
                    options.log.logfmt = env_flag(key, value).unwrap_or(options.log.logfmt);
                }
                ENV_PCIDB_PATH => options.pci_ids_path = Some(PathBuf::from(value)),
                _ => {}
            }
        }
        if !snapshot.path.as_os_str().is_empty() {
            options.snapshot = Some(snapshot);
        }
        options
    }

    #[must_use]
    pub fn with_chroot(mut self, chroot: impl Into<PathBuf>) -> Self {
        self.chroot = chroot.into();
        self
    }

    /// Discover from the snapshot archive at `path` (keeping any root / exclusive / preserve
    /// settings already configured).
    #[must_use]
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        let mut snapshot = self.snapshot.take().unwrap_or_default();
        snapshot.path = path.into();
        self.snapshot = Some(snapshot);
        self
    }

    #[must_use]
    pub fn with_snapshot_options(mut self, snapshot: SnapshotOptions) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    #[must_use]
    pub fn with_path_overrides(mut self, overrides: PathOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    #[must_use]
    pub fn with_tools(mut self, enabled: bool) -> Self {
        self.tools_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_topology(mut self, enabled: bool) -> Self {
        self.topology_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_warnings(mut self, enabled: bool) -> Self {
        self.log.warnings = enabled;
        self
    }

    #[must_use]
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log.level = level;
        self
    }

    #[must_use]
    pub fn with_logfmt(mut self, logfmt: bool) -> Self {
        self.log.logfmt = logfmt;
        self
    }

    #[must_use]
    pub fn with_pci_db(mut self, db: Arc<dyn PciIdLookup>) -> Self {
        self.pci_db = Some(db);
        self
    }

    #[must_use]
    pub fn with_pci_ids_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.pci_ids_path = Some(path.into());
        self
    }
}

#[derive(Debug)]
enum UnpackedRoot {
    Temporary(TempDir),
    Directory { path: PathBuf, preserve: bool },
}

impl UnpackedRoot {
    fn unpack(snapshot: &SnapshotOptions) -> Result<UnpackedRoot, Error> {
        if let Some(root) = &snapshot.root {
            if snapshot.exclusive {
                snapshot::unpack::unpack_into_empty(&snapshot.path, root)?;
            } else {
                snapshot::unpack(&snapshot.path, root)?;
            }
            return Ok(UnpackedRoot::Directory {
                path: root.clone(),
                preserve: snapshot.preserve,
            });
        }
        let dir = snapshot::unpack_to_temp(&snapshot.path)?;
        if snapshot.preserve {
            Ok(UnpackedRoot::Directory {
                path: dir.keep(),
                preserve: true,
            })
        } else {
            Ok(UnpackedRoot::Temporary(dir))
        }
    }

    fn path(&self) -> &Path {
        match self {
            UnpackedRoot::Temporary(dir) => dir.path(),
            UnpackedRoot::Directory { path, .. } => path,
        }
    }

    fn teardown(self) {
        match self {
            UnpackedRoot::Temporary(dir) => {
                let path = dir.path().to_path_buf();
                if let Err(err) = dir.close() {
                    warn!(path = %path.display(), "unable to remove unpacked snapshot: {err}");
                }
            }
            UnpackedRoot::Directory {
                path,
                preserve: false,
            } => {
                if let Err(err) = std::fs::remove_dir_all(&path) {
                    warn!(path = %path.display(), "unable to remove unpacked snapshot: {err}");
                }
            }
            UnpackedRoot::Directory {
                path,
                preserve: true,
            } => debug!(path = %path.display(), "keeping unpacked snapshot"),
        }
    }
}

#[derive(Debug, Default)]
struct SnapshotState {
    users: usize,
    root: Option<UnpackedRoot>,
}

/// The frozen configuration of a discovery run.
///
/// With a snapshot configured, the archive is unpacked by the outermost [`Context::run`] and
/// removed again when it returns; nested `run` calls share the unpacked tree.
#[derive(Debug)]
pub struct Context {
    options: Options,
    snapshot: Mutex<SnapshotState>,
}

/// Releases one snapshot user when dropped.
struct Acquired<'ctx> {
    ctx: &'ctx Context,
    counted: bool,
}

impl Drop for Acquired<'_> {
    fn drop(&mut self) {
        if !self.counted {
            return;
        }
        let mut state = self.ctx.snapshot.lock();
        state.users = state.users.saturating_sub(1);
        if state.users == 0
            && let Some(root) = state.root.take()
        {
            debug!(root = %root.path().display(), "releasing snapshot");
            root.teardown();
        }
    }
}

impl Context {
    #[must_use]
    pub fn new(options: Options) -> Context {
        Context {
            options,
            snapshot: Mutex::new(SnapshotState::default()),
        }
    }

    /// A context configured from the process environment only.
    #[must_use]
    pub fn from_env() -> Context {
        Context::new(Options::from_env())
    }

    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Run `f` with the context acquired.
    ///
    /// Without a snapshot this simply calls `f`.
    /// With one, the first (outermost) call unpacks the archive and points the chroot at it;
    /// the matching return removes it again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Snapshot`] if the archive can not be unpacked.
    pub fn run<T>(&self, f: impl FnOnce(&Context) -> T) -> Result<T, Error> {
        let _acquired = self.acquire()?;
        Ok(f(self))
    }

    fn acquire(&self) -> Result<Acquired<'_>, Error> {
        let Some(snapshot) = &self.options.snapshot else {
            return Ok(Acquired {
                ctx: self,
                counted: false,
            });
        };
        let mut state = self.snapshot.lock();
        if state.users == 0 {
            let root = UnpackedRoot::unpack(snapshot)?;
            debug!(
                archive = %snapshot.path.display(),
                root = %root.path().display(),
                "snapshot unpacked"
            );
            state.root = Some(root);
        }
        state.users += 1;
        Ok(Acquired {
            ctx: self,
            counted: true,
        })
    }

    /// True when discovery can read the configured tree: always without a snapshot, and only
    /// inside [`Context::run`] with one.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.options.snapshot.is_none() || self.snapshot.lock().users > 0
    }

    /// The effective root: the unpacked snapshot while acquired, else the configured chroot.
    #[must_use]
    pub fn chroot(&self) -> PathBuf {
        self.snapshot
            .lock()
            .root
            .as_ref()
            .map_or_else(|| self.options.chroot.clone(), |root| root.path().to_path_buf())
    }

    /// The pseudofile locations for this run.
    #[must_use]
    pub fn paths(&self) -> Paths {
        Paths::new(self.chroot(), self.options.overrides.clone())
    }

    #[must_use]
    pub fn topology_enabled(&self) -> bool {
        self.options.topology_enabled
    }

    /// True if the helper tools may be run.
    ///
    /// The tools query the live kernel, so they are only used when discovery reads the live
    /// root: never for a snapshot or a chroot.
    #[must_use]
    pub fn tools_available(&self) -> bool {
        self.options.tools_enabled
            && self.options.snapshot.is_none()
            && self.options.chroot == Path::new("/")
    }

    /// True if discovery reads the running host (not a chroot or a snapshot).
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.options.snapshot.is_none()
            && self.options.chroot == Path::new("/")
            && self.options.overrides.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_utils::FakeRoot;
    use tracing_test::traced_test;

    #[test]
    fn defaults() {
        let options = Options::from_vars(Vec::<(String, String)>::new());
        assert_eq!(options.chroot, Path::new("/"));
        assert!(options.tools_enabled);
        assert!(options.topology_enabled);
        assert!(options.snapshot.is_none());
        assert_eq!(options.log, LogSettings::default());
    }

    #[test]
    fn environment_variables() {
        let options = Options::from_vars([
            ("CHROOT", "/host"),
            ("DISABLE_TOOLS", "yes"),
            ("DISABLE_TOPOLOGY", "1"),
            ("DISABLE_WARNINGS", "on"),
            ("LOG_LEVEL", "debug"),
            ("LOG_LOGFMT", "true"),
            ("PCIDB_PATH", "/usr/share/hwdata/pci.ids"),
            ("SNAPSHOT_PATH", "/tmp/host.tar.gz"),
            ("SNAPSHOT_ROOT", "/tmp/unpacked"),
            ("SNAPSHOT_PRESERVE", "1"),
            ("UNRELATED", "whatever"),
        ]);
        assert_eq!(options.chroot, Path::new("/host"));
        assert!(!options.tools_enabled);
        assert!(!options.topology_enabled);
        assert!(!options.log.warnings);
        assert!(options.log.logfmt);
        assert_eq!(options.log.level, LogLevel::Debug);
        assert_eq!(
            options.pci_ids_path.as_deref(),
            Some(Path::new("/usr/share/hwdata/pci.ids"))
        );
        assert_eq!(
            options.snapshot,
            Some(SnapshotOptions {
                path: "/tmp/host.tar.gz".into(),
                root: Some("/tmp/unpacked".into()),
                exclusive: false,
                preserve: true,
            })
        );
    }

    #[test]
    #[traced_test]
    fn malformed_values_are_ignored() {
        let options = Options::from_vars([("DISABLE_TOOLS", "sometimes"), ("LOG_LEVEL", "loud")]);
        assert!(options.tools_enabled);
        assert_eq!(options.log.level, LogLevel::Warn);
        assert!(logs_contain("ignoring environment variable"));
    }

    #[test]
    fn modifiers_override_the_environment() {
        let options = Options::from_vars([("CHROOT", "/host"), ("DISABLE_TOOLS", "1")])
            .with_chroot("/other")
            .with_tools(true)
            .with_snapshot("/tmp/a.tar.gz");
        assert_eq!(options.chroot, Path::new("/other"));
        assert!(options.tools_enabled);
        assert_eq!(
            options.snapshot.map(|snapshot| snapshot.path),
            Some(PathBuf::from("/tmp/a.tar.gz"))
        );
    }

    #[test]
    fn plain_context_is_always_ready() {
        let root = FakeRoot::new();
        let ctx = Context::new(Options::default().with_chroot(root.path()));
        assert!(ctx.is_ready());
        assert!(!ctx.tools_available());
        assert!(!ctx.is_live());
        let chroot = ctx.run(Context::chroot).unwrap();
        assert_eq!(chroot, root.path());
    }

    fn archive_of(content: &FakeRoot, dir: &FakeRoot) -> PathBuf {
        let archive = dir.join("snap.tar.gz");
        snapshot::pack(content.path(), &archive).unwrap();
        archive
    }

    #[test]
    fn nested_runs_share_one_unpacked_root() {
        let content = FakeRoot::new();
        content.file("proc/meminfo", "MemTotal: 1 kB\n");
        let dir = FakeRoot::new();
        let ctx = Context::new(Options::default().with_snapshot(archive_of(&content, &dir)));
        assert!(!ctx.is_ready());

        let (outer, inner) = ctx
            .run(|ctx| {
                assert!(ctx.is_ready());
                let outer = ctx.chroot();
                assert!(outer.join("proc/meminfo").exists());
                let inner = ctx.run(Context::chroot).unwrap();
                // still there after the inner release
                assert!(outer.join("proc/meminfo").exists());
                (outer, inner)
            })
            .unwrap();
        assert_eq!(outer, inner);
        assert!(!ctx.is_ready());
        assert!(!outer.exists());
    }

    #[test]
    fn preserved_roots_survive_release() {
        let content = FakeRoot::new();
        content.file("proc/meminfo", "MemTotal: 1 kB\n");
        let dir = FakeRoot::new();
        let unpack_root = dir.join("unpacked");
        let ctx = Context::new(Options::default().with_snapshot_options(SnapshotOptions {
            path: archive_of(&content, &dir),
            root: Some(unpack_root.clone()),
            exclusive: false,
            preserve: true,
        }));
        let chroot = ctx.run(Context::chroot).unwrap();
        assert_eq!(chroot, unpack_root);
        assert!(unpack_root.join("proc/meminfo").exists());
    }

    #[test]
    fn missing_archive_is_an_error() {
        let ctx = Context::new(Options::default().with_snapshot("/nonexistent/snap.tar.gz"));
        assert!(matches!(ctx.run(|_| ()), Err(Error::Snapshot(_))));
        assert!(!ctx.is_ready());
    }
}
