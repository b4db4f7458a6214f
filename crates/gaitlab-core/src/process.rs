//! Blocking simulator execution on top of an injected `ProcessRunner`.

use crate::error::HarnessError;
use gaitlab_proto::{ExitReport, Invocation, ProcessRunner};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of an invocation whose failure is tolerated by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// The process ran and exited zero.
    Completed(ExitReport),
    /// The process could not be launched, exited non-zero, or timed out.
    Crashed {
        exit_code: Option<i32>,
        timed_out: bool,
        reason: String,
    },
}

impl InvocationOutcome {
    pub fn is_crashed(&self) -> bool {
        matches!(self, InvocationOutcome::Crashed { .. })
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            InvocationOutcome::Completed(report) => report.exit_code,
            InvocationOutcome::Crashed { exit_code, .. } => *exit_code,
        }
    }
}

/// Runs the configured simulator binary, one invocation at a time.
///
/// No retries are performed here; callers decide whether a failure is fatal
/// (`execute`) or a diagnostic (`execute_tolerant`).
#[derive(Clone)]
pub struct ProcessExecutor {
    runner: Arc<dyn ProcessRunner>,
    binary: PathBuf,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for ProcessExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessExecutor")
            .field("binary", &self.binary)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ProcessExecutor {
    pub fn new(runner: Arc<dyn ProcessRunner>, binary: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            binary: binary.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn invocation(&self, arg_file: &Path, log_file: &Path) -> Invocation {
        Invocation::new(&self.binary, arg_file, log_file).with_timeout(self.timeout)
    }

    /// Runs one invocation; anything but a clean zero exit is an error.
    ///
    /// `stage` names the invocation in the error (e.g. "training").
    pub async fn execute(
        &self,
        stage: &str,
        arg_file: &Path,
        log_file: &Path,
    ) -> Result<ExitReport, HarnessError> {
        let invocation = self.invocation(arg_file, log_file);
        debug!(stage, arg_file = %arg_file.display(), "Running simulator");
        let report = self
            .runner
            .run(&invocation)
            .await
            .map_err(|source| HarnessError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if report.success() {
            Ok(report)
        } else {
            Err(HarnessError::ProcessFailed {
                stage: stage.to_string(),
                exit_code: report.exit_code,
                timed_out: report.timed_out,
                log: log_file.to_path_buf(),
            })
        }
    }

    /// Runs one invocation and reports failure as a value instead of an error.
    pub async fn execute_tolerant(
        &self,
        stage: &str,
        arg_file: &Path,
        log_file: &Path,
    ) -> InvocationOutcome {
        match self.execute(stage, arg_file, log_file).await {
            Ok(report) => InvocationOutcome::Completed(report),
            Err(err) => {
                warn!(stage, error = %err, "Simulator invocation crashed");
                let (exit_code, timed_out) = match &err {
                    HarnessError::ProcessFailed {
                        exit_code,
                        timed_out,
                        ..
                    } => (*exit_code, *timed_out),
                    _ => (None, false),
                };
                InvocationOutcome::Crashed {
                    exit_code,
                    timed_out,
                    reason: err.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns a canned result and remembers what it was asked to run.
    struct CannedRunner {
        result: Mutex<Option<std::io::Result<ExitReport>>>,
        seen: Mutex<Vec<Invocation>>,
    }

    impl CannedRunner {
        fn new(result: std::io::Result<ExitReport>) -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(Some(result)),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ProcessRunner for CannedRunner {
        async fn run(&self, invocation: &Invocation) -> std::io::Result<ExitReport> {
            self.seen.lock().unwrap().push(invocation.clone());
            self.result
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Ok(ExitReport::exited(0)))
        }
    }

    #[tokio::test]
    async fn test_execute_passes_binary_and_timeout() {
        let runner = CannedRunner::new(Ok(ExitReport::exited(0)));
        let executor = ProcessExecutor::new(runner.clone(), "/opt/sim")
            .with_timeout(Some(Duration::from_secs(30)));

        executor
            .execute("training", Path::new("a.txt"), Path::new("a.log"))
            .await
            .unwrap();

        let seen = runner.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].binary, PathBuf::from("/opt/sim"));
        assert_eq!(seen[0].arg_file, PathBuf::from("a.txt"));
        assert_eq!(seen[0].timeout, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let executor = ProcessExecutor::new(CannedRunner::new(Ok(ExitReport::exited(134))), "sim");
        let err = executor
            .execute("training", Path::new("a.txt"), Path::new("train.log"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::ProcessFailed { exit_code: Some(134), timed_out: false, ref log, .. }
                if log == Path::new("train.log")
        ));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let executor = ProcessExecutor::new(CannedRunner::new(Err(io)), "missing-sim");
        let err = executor
            .execute("eval", Path::new("a.txt"), Path::new("a.log"))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_tolerant_execution_captures_crash() {
        let executor = ProcessExecutor::new(CannedRunner::new(Ok(ExitReport::exited(2))), "sim");
        let outcome = executor
            .execute_tolerant("short-horizon training", Path::new("a.txt"), Path::new("a.log"))
            .await;
        assert!(outcome.is_crashed());
        assert_eq!(outcome.exit_code(), Some(2));
    }

    #[tokio::test]
    async fn test_tolerant_execution_completed() {
        let executor = ProcessExecutor::new(CannedRunner::new(Ok(ExitReport::exited(0))), "sim");
        let outcome = executor
            .execute_tolerant("short-horizon training", Path::new("a.txt"), Path::new("a.log"))
            .await;
        assert_eq!(outcome, InvocationOutcome::Completed(ExitReport::exited(0)));
    }
}
