// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Crate to set up logging for the inventory tools.
//!
//! Libraries in this workspace only emit `tracing` events.
//! Binaries call [`init`] once with the [`LogSettings`] derived from their configuration.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// re-exports
pub use tracing_subscriber::filter::LevelFilter;

/// Default level when nothing else is configured.
pub const DEFAULT_LOGLEVEL: LogLevel = LogLevel::Warn;

/// The log levels a user can ask for (`LOG_LEVEL`).
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    strum::AsRefStr,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogLevel {
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LogSettings {
    pub level: LogLevel,
    /// Plain `key=value` output: no colours, no timestamps.
    pub logfmt: bool,
    /// `false` silences warnings (only errors are shown).
    pub warnings: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            level: DEFAULT_LOGLEVEL,
            logfmt: false,
            warnings: true,
        }
    }
}

impl LogSettings {
    /// The level actually applied once `warnings` is taken into account.
    #[must_use]
    pub fn effective_level(&self) -> LevelFilter {
        if self.warnings {
            self.level.into()
        } else {
            LevelFilter::from(self.level).min(LevelFilter::ERROR)
        }
    }

    /// The filter installed by [`init`]: the effective level, then any `RUST_LOG` directives.
    #[must_use]
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(self.effective_level().into())
            .from_env_lossy()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TraceCtlError {
    #[error("a global subscriber is already installed: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Install the global subscriber (logs go to stderr).
///
/// Calling this a second time returns [`TraceCtlError::AlreadyInitialized`] and changes nothing.
pub fn init(settings: &LogSettings) -> Result<(), TraceCtlError> {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(!settings.logfmt)
        .with_ansi(!settings.logfmt);
    let registry = tracing_subscriber::registry().with(settings.filter());
    if settings.logfmt {
        registry.with(layer.without_time()).try_init()?;
    } else {
        registry.with(layer).try_init()?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("verbose".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Error.to_string(), "error");
    }

    #[test]
    fn disabling_warnings_caps_the_level() {
        let settings = LogSettings {
            level: LogLevel::Debug,
            warnings: false,
            ..LogSettings::default()
        };
        assert_eq!(settings.effective_level(), LevelFilter::ERROR);
        assert_eq!(LogSettings::default().effective_level(), LevelFilter::WARN);
    }

    #[test]
    fn second_init_is_refused() {
        let settings = LogSettings::default();
        // another test binary may have installed one first; either way the second call fails
        let _ = init(&settings);
        assert!(init(&settings).is_err());
    }
}
