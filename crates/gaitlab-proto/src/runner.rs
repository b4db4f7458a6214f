//! The process-runner capability.
//!
//! The harness never spawns the simulator directly. It is handed a
//! `ProcessRunner` so tests can substitute a scripted fake for the binary.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// Flag the simulator reads its argument file from. The path follows as a
/// separate argument.
pub const ARG_FILE_FLAG: &str = "-arg_file=";

/// One invocation of the simulator binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Path to the simulator binary.
    pub binary: PathBuf,
    /// Argument file the simulator reads its parameters from.
    pub arg_file: PathBuf,
    /// File receiving combined stdout and stderr.
    pub log_file: PathBuf,
    /// Kill the process after this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(
        binary: impl Into<PathBuf>,
        arg_file: impl Into<PathBuf>,
        log_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            binary: binary.into(),
            arg_file: arg_file.into(),
            log_file: log_file.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Command-line arguments: `-arg_file= {path}`.
    pub fn args(&self) -> Vec<OsString> {
        vec![OsString::from(ARG_FILE_FLAG), self.arg_file.clone().into_os_string()]
    }
}

/// How a finished invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitReport {
    /// Exit code, or `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,
    /// Whether the invocation hit its timeout.
    pub timed_out: bool,
}

impl ExitReport {
    pub fn exited(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            timed_out: false,
        }
    }

    /// True only for a zero exit that did not time out.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

/// Runs the simulator binary for a single invocation.
///
/// Implementations block (asynchronously) until the process exits and must
/// leave whatever the process printed in `invocation.log_file`. Failing to
/// launch is an `Err`; a launched process that exits non-zero is an `Ok`
/// report whose `success()` is false.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<ExitReport>;
}
