//! Simulator executor for running the external binary.
//!
//! Spawns `{binary} -arg_file= {path}` with stdout and stderr both pointed at
//! the invocation's log file, so the log interleaves them in emission order.
//! Supports an optional timeout with graceful SIGTERM termination.

use async_trait::async_trait;
use gaitlab_proto::{ExitReport, Invocation, ProcessRunner};
use std::fs::File;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// How long a process gets to exit after SIGTERM before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Runs the real simulator binary as a child process.
#[derive(Debug, Clone, Default)]
pub struct SimulatorExecutor {
    /// Working directory for the child. Defaults to the current directory.
    working_dir: Option<PathBuf>,
}

impl SimulatorExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the simulator from `dir` instead of the current directory.
    ///
    /// Relative paths inside argument files resolve against this directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Terminates the child process with SIGTERM.
    #[cfg(unix)]
    fn terminate_child(child: &mut Child) {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            #[allow(clippy::cast_possible_wrap)]
            let pid = Pid::from_raw(pid as i32);
            debug!(%pid, "Sending SIGTERM to simulator process");
            let _ = kill(pid, Signal::SIGTERM);
        }
    }

    #[cfg(not(unix))]
    fn terminate_child(child: &mut Child) {
        let _ = child.start_kill();
    }
}

#[async_trait]
impl ProcessRunner for SimulatorExecutor {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<ExitReport> {
        if let Some(parent) = invocation.log_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let log = File::create(&invocation.log_file)?;
        let log_stderr = log.try_clone()?;

        let mut command = Command::new(&invocation.binary);
        command.args(invocation.args());
        command.stdin(Stdio::null());
        command.stdout(Stdio::from(log));
        command.stderr(Stdio::from(log_stderr));
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        debug!(
            binary = ?invocation.binary,
            arg_file = ?invocation.arg_file,
            log_file = ?invocation.log_file,
            "Spawning simulator"
        );

        let mut child = command.spawn()?;

        let Some(limit) = invocation.timeout else {
            let status = child.wait().await?;
            return Ok(ExitReport {
                exit_code: status.code(),
                timed_out: false,
            });
        };

        let waited = tokio::time::timeout(limit, child.wait()).await;
        match waited {
            Ok(status) => Ok(ExitReport {
                exit_code: status?.code(),
                timed_out: false,
            }),
            Err(_) => {
                warn!(
                    timeout_secs = limit.as_secs(),
                    log_file = ?invocation.log_file,
                    "Simulator timeout reached, sending SIGTERM"
                );
                Self::terminate_child(&mut child);
                let status = match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
                    Ok(status) => status?,
                    Err(_) => {
                        warn!("Simulator ignored SIGTERM, killing");
                        child.kill().await?;
                        child.wait().await?
                    }
                };
                Ok(ExitReport {
                    exit_code: status.code(),
                    timed_out: true,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_echo_output_lands_in_log() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("logs").join("echo.log");
        let inv = Invocation::new("echo", dir.path().join("args.txt"), &log);

        let report = SimulatorExecutor::new().run(&inv).await.unwrap();

        assert!(report.success());
        let text = std::fs::read_to_string(&log).unwrap();
        assert!(text.contains("-arg_file="));
        assert!(text.contains("args.txt"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        let inv = Invocation::new("false", dir.path().join("args.txt"), dir.path().join("f.log"));

        let report = SimulatorExecutor::new().run(&inv).await.unwrap();

        assert!(!report.success());
        assert_eq!(report.exit_code, Some(1));
        assert!(!report.timed_out);
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let inv = Invocation::new(
            dir.path().join("no-such-simulator"),
            dir.path().join("args.txt"),
            dir.path().join("x.log"),
        );

        let err = SimulatorExecutor::new().run(&inv).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_and_stderr_share_the_log() {
        let dir = TempDir::new().unwrap();
        let script = write_script(
            &dir,
            "sim.sh",
            "echo \"reading $2\"\necho 'loss: 0.5' 1>&2\nexit 3",
        );
        let log = dir.path().join("sim.log");
        let inv = Invocation::new(&script, dir.path().join("args.txt"), &log);

        let report = SimulatorExecutor::new().run(&inv).await.unwrap();

        assert_eq!(report.exit_code, Some(3));
        let text = std::fs::read_to_string(&log).unwrap();
        assert!(text.contains("reading"));
        assert!(text.contains("loss: 0.5"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_terminates_process() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "hang.sh", "exec sleep 10");
        let inv = Invocation::new(&script, dir.path().join("args.txt"), dir.path().join("h.log"))
            .with_timeout(Some(Duration::from_millis(100)));

        let report = SimulatorExecutor::new().run(&inv).await.unwrap();

        assert!(report.timed_out, "Expected execution to time out");
        assert!(!report.success());
    }
}
