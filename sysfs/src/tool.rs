// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Bounded invocation of the optional read-only helper tools (`ethtool`, `blkid`).
//!
//! A tool which is missing, slow, or unhappy degrades the field it was asked about.
//! Callers log the [`ToolError`] and carry on.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;

/// Upper bound on how long a helper tool may run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The helper tools the inventory may invoke.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::AsRefStr, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Tool {
    Ethtool,
    Blkid,
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{0} is not installed or not on PATH")]
    NotFound(Tool),
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: Tool,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} did not finish within {timeout:?}")]
    Timeout { tool: Tool, timeout: Duration },
    #[error("{tool} exited with {status}")]
    Failed {
        tool: Tool,
        status: std::process::ExitStatus,
    },
    #[error("{0} produced output which is not UTF-8")]
    NotUtf8(Tool),
}

/// Locate `tool` on `PATH`.
///
/// # Errors
///
/// Returns [`ToolError::NotFound`] if the tool is not installed.
pub fn locate(tool: Tool) -> Result<PathBuf, ToolError> {
    which::which(tool.as_ref()).map_err(|_| ToolError::NotFound(tool))
}

/// Run `tool` with `args` and return its standard output.
///
/// The tool is killed if it has not exited within `timeout`.
///
/// # Errors
///
/// See [`ToolError`].
pub fn run(tool: Tool, args: &[&str], timeout: Duration) -> Result<String, ToolError> {
    let program = locate(tool)?;
    run_program(&program, tool, args, timeout)
}

/// Run the binary at `program` on behalf of `tool`; failures are reported against `tool`.
///
/// # Errors
///
/// See [`ToolError`]; never [`ToolError::NotFound`].
pub fn run_program(
    program: &Path,
    tool: Tool,
    args: &[&str],
    timeout: Duration,
) -> Result<String, ToolError> {
    debug!(%tool, program = %program.display(), ?args, "running helper tool");
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| ToolError::Spawn { tool, source })?;

    // drain stdout concurrently so a chatty tool can not block on a full pipe
    let reader = child.stdout.take().map(|mut stdout| {
        std::thread::spawn(move || {
            let mut buffer = Vec::new();
            stdout.read_to_end(&mut buffer).map(|_| buffer)
        })
    });

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if started.elapsed() >= timeout => {
                // the child may have exited between try_wait and kill; either way we give up
                let _ = child.kill();
                let _ = child.wait();
                return Err(ToolError::Timeout { tool, timeout });
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(source) => return Err(ToolError::Spawn { tool, source }),
        }
    };
    if !status.success() {
        return Err(ToolError::Failed { tool, status });
    }
    let output = match reader.map(std::thread::JoinHandle::join) {
        Some(Ok(Ok(buffer))) => buffer,
        Some(Ok(Err(source))) => return Err(ToolError::Spawn { tool, source }),
        Some(Err(_)) | None => Vec::new(),
    };
    String::from_utf8(output).map_err(|_| ToolError::NotUtf8(tool))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;

    #[test]
    fn tool_names_are_the_binaries() {
        assert_eq!(Tool::Ethtool.as_ref(), "ethtool");
        assert_eq!(Tool::Blkid.to_string(), "blkid");
    }

    fn system(binary: &str) -> PathBuf {
        which::which(binary).unwrap()
    }

    #[test]
    fn output_is_returned() {
        let output = run_program(&system("echo"), Tool::Blkid, &["hello"], DEFAULT_TIMEOUT);
        assert_eq!(output.unwrap(), "hello\n");
    }

    #[test]
    fn slow_tools_are_killed() {
        let timeout = Duration::from_millis(100);
        let started = Instant::now();
        let err = run_program(&system("sleep"), Tool::Ethtool, &["5"], timeout).unwrap_err();
        assert!(
            matches!(err, ToolError::Timeout { tool: Tool::Ethtool, timeout: t } if t == timeout),
            "{err}"
        );
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn non_zero_exit_is_a_failure() {
        let err = run_program(&system("false"), Tool::Blkid, &[], DEFAULT_TIMEOUT).unwrap_err();
        match err {
            ToolError::Failed { tool, status } => {
                assert_eq!(tool, Tool::Blkid);
                assert_eq!(status.code(), Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn binary_output_is_rejected() {
        let err = run_program(
            &system("sh"),
            Tool::Ethtool,
            &["-c", "printf '\\377\\376'"],
            DEFAULT_TIMEOUT,
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::NotUtf8(Tool::Ethtool)), "{err}");
    }

    #[test]
    fn missing_tools_surface_as_not_found() {
        // both tools may legitimately be installed on the build host; only check the mapping
        if let Err(err) = locate(Tool::Ethtool) {
            assert!(matches!(err, ToolError::NotFound(Tool::Ethtool)));
        }
    }
}
