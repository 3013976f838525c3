//! Subprocess runner shared by all transports

use crate::cancel::CancelSignal;
use crate::error::TransportError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Default per-command time budget
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Runs a local program with a timeout and run-wide cancellation
///
/// On unix the child leads its own process group. Abandoning the wait
/// (timeout or cancellation) kills the whole group, so every stage of a
/// shell pipeline goes down with it. Elsewhere only the child itself is
/// killed through `kill_on_drop`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
    cancel: CancelSignal,
}

impl ProcessRunner {
    /// Create runner with the default timeout and a private cancel signal
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            cancel: CancelSignal::new(),
        }
    }

    /// With timeout
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// With a shared cancel signal
    #[inline]
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Configured timeout
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `program` with `args`, returning stdout on success
    ///
    /// # Errors
    /// - `TransportError::Cancelled` if the signal fired before or during the run
    /// - `TransportError::Spawn` if the program cannot be started
    /// - `TransportError::Timeout` if the time budget is exceeded
    /// - `TransportError::CommandFailed` on non-zero exit
    pub async fn run(&self, program: &str, args: &[String]) -> Result<String, TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|source| TransportError::Spawn {
            program: program.to_string(),
            source,
        })?;
        let group = ProcessGroup(child.id());

        let result = tokio::select! {
            result = timeout(self.timeout, child.wait_with_output()) => {
                match result {
                    Ok(Ok(output)) if output.status.success() => {
                        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
                    }
                    Ok(Ok(output)) => Err(TransportError::CommandFailed {
                        code: output.status.code(),
                        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                    }),
                    Ok(Err(e)) => Err(TransportError::Io(e)),
                    Err(_) => {
                        tracing::warn!(program, "command timed out after {:?}", self.timeout);
                        Err(TransportError::Timeout {
                            timeout_secs: self.timeout.as_secs(),
                        })
                    }
                }
            }
            () = self.cancel.cancelled() => {
                tracing::info!(program, "terminating command on cancellation");
                Err(TransportError::Cancelled)
            }
        };
        if matches!(result, Err(TransportError::Timeout { .. } | TransportError::Cancelled)) {
            group.kill();
        }
        result
    }
}

/// Process group led by a spawned child
struct ProcessGroup(Option<u32>);

impl ProcessGroup {
    #[cfg(unix)]
    fn kill(&self) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let Some(pgid) = self.0.and_then(|id| i32::try_from(id).ok()) else {
            return;
        };
        match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => tracing::warn!(pgid, "failed to kill process group: {e}"),
        }
    }

    #[cfg(not(unix))]
    fn kill(&self) {}
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn captures_stdout() {
        let runner = ProcessRunner::new();
        let out = runner.run("sh", &sh("echo hello")).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn non_zero_exit_is_command_failed() {
        let runner = ProcessRunner::new();
        let err = runner.run("sh", &sh("echo oops >&2; exit 3")).await.unwrap_err();
        match err {
            TransportError::CommandFailed { code, stderr } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "oops");
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let runner = ProcessRunner::new();
        let err = runner
            .run("definitely-not-a-real-binary-warden", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Spawn { .. }));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let runner = ProcessRunner::new().with_timeout(Duration::from_millis(50));
        let err = runner.run("sh", &sh("sleep 5")).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
    }

    #[tokio::test]
    async fn cancellation_terminates_in_flight_command() {
        let cancel = CancelSignal::new();
        let runner = ProcessRunner::new().with_cancel(cancel.clone());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = runner.run("sh", &sh("sleep 10")).await.unwrap_err();
        assert!(matches!(err, TransportError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn cancellation_reaches_every_pipeline_stage() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("late-stage");
        let script = format!("(sleep 1; touch '{}') | cat", marker.display());

        let cancel = CancelSignal::new();
        let runner = ProcessRunner::new().with_cancel(cancel.clone());
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let err = runner.run("sh", &sh(&script)).await.unwrap_err();
        assert!(matches!(err, TransportError::Cancelled));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn timeout_reaches_every_pipeline_stage() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("late-stage");
        let script = format!("(sleep 1; touch '{}') | cat", marker.display());

        let runner = ProcessRunner::new().with_timeout(Duration::from_millis(200));
        let err = runner.run("sh", &sh(&script)).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn already_cancelled_does_not_spawn() {
        let cancel = CancelSignal::new();
        cancel.cancel();
        let runner = ProcessRunner::new().with_cancel(cancel);
        let err = runner.run("sh", &sh("echo never")).await.unwrap_err();
        assert!(matches!(err, TransportError::Cancelled));
    }
}
