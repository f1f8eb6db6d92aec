//! Unified error types for the tcpscope workspace.
//!
//! Errors that belong to a single sampling or resolver cycle are logged by
//! the owning task and never escalate; only startup helpers surface them
//! to the process.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum TcpscopeError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// An external command ran but did not succeed.
    #[error("command `{program}` failed: {message}")]
    Command {
        /// Program that was invoked.
        program: String,
        /// Exit status or stderr summary.
        message: String,
    },

    /// An operation did not complete within its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that was bounded.
        operation: &'static str,
        /// Deadline that elapsed.
        after: Duration,
    },

    /// A Kubernetes API call failed.
    #[error("kubernetes API error in namespace {namespace}: {message}")]
    Kube {
        /// Namespace the call targeted (empty for client setup).
        namespace: String,
        /// Description of the failure.
        message: String,
    },

    /// A textual value could not be parsed.
    #[error("invalid {what}: {input:?}")]
    Parse {
        /// Kind of value being parsed.
        what: &'static str,
        /// Offending input.
        input: String,
    },

    /// Metric registration or encoding failed.
    #[error("metrics error: {message}")]
    Metrics {
        /// Description of the failure.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_yaml::Error,
    },
}

impl TcpscopeError {
    /// Returns `true` if this error reports a missing resource or file.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, TcpscopeError>;
