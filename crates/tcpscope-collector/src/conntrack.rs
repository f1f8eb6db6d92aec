//! Acquisition of connection-tracking reports.
//!
//! [`ConntrackSource`] is the seam between the sampling pipeline and the
//! host. The production implementation shells out to `conntrack`; tests
//! substitute canned reports.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tcpscope_common::constants::CONNTRACK_ARGS;
use tcpscope_common::error::{Result, TcpscopeError};

/// Produces the current report of established TCP connections.
#[async_trait]
pub trait ConntrackSource: Send + Sync {
    /// Returns the report text.
    ///
    /// `Ok` with an empty string means the query succeeded and the table
    /// was empty; any failure to run the query is an `Err`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query could not be executed, exited
    /// unsuccessfully, or exceeded its deadline.
    async fn query(&self) -> Result<String>;
}

/// Runs `conntrack -p tcp --state ESTABLISHED -L` with a deadline.
#[derive(Debug, Clone)]
pub struct ConntrackCommand {
    program: PathBuf,
    timeout: Duration,
}

impl ConntrackCommand {
    /// Creates a command runner for `program`, bounded by `timeout`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Program that will be executed.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Resolves the program against `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`TcpscopeError::NotFound`] if the program cannot be found.
    pub fn locate(&self) -> Result<PathBuf> {
        which::which(&self.program).map_err(|_| TcpscopeError::NotFound {
            kind: "conntrack program",
            id: self.program.display().to_string(),
        })
    }
}

#[async_trait]
impl ConntrackSource for ConntrackCommand {
    async fn query(&self) -> Result<String> {
        let child = tokio::process::Command::new(&self.program)
            .args(CONNTRACK_ARGS)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| TcpscopeError::Timeout {
                operation: "conntrack query",
                after: self.timeout,
            })?
            .map_err(|e| TcpscopeError::Io {
                path: self.program.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(TcpscopeError::Command {
                program: self.program.display().to_string(),
                message: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let report = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::trace!(bytes = report.len(), "conntrack report acquired");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command_returns_stdout() {
        let cmd = ConntrackCommand::new("echo", Duration::from_secs(5));
        let report = cmd.query().await.expect("echo succeeds");
        assert!(report.contains("ESTABLISHED"));
    }

    #[tokio::test]
    async fn failing_command_is_an_error() {
        let cmd = ConntrackCommand::new("false", Duration::from_secs(5));
        let err = cmd.query().await.unwrap_err();
        assert!(matches!(err, TcpscopeError::Command { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_an_io_error() {
        let cmd = ConntrackCommand::new("/nonexistent/conntrack", Duration::from_secs(5));
        let err = cmd.query().await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-conntrack");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cmd = ConntrackCommand::new(&script, Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = cmd.query().await.unwrap_err();
        assert!(matches!(
            err,
            TcpscopeError::Timeout {
                operation: "conntrack query",
                ..
            }
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn locate_reports_missing_program() {
        let cmd = ConntrackCommand::new("tcpscope-no-such-program", Duration::from_secs(1));
        assert!(cmd.locate().unwrap_err().is_not_found());
    }
}
