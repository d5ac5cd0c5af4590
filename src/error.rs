//! Error types used by the tunnel supervision engine.
//!
//! Everything that can go wrong during an `apply` attempt is collapsed into
//! [`TunnelError`]. The variants mirror the failure taxonomy of the engine:
//!
//! - [`TunnelError::ConfigRejected`] — malformed configuration, rejected
//!   before any process is touched.
//! - [`TunnelError::Provision`] — a stage binary could not be installed or
//!   made executable.
//! - [`TunnelError::Spawn`] — the OS refused to start a stage process.
//! - [`TunnelError::ReadinessTimeout`] — a stage never confirmed readiness
//!   within its deadline.
//! - [`TunnelError::ProcessCrashed`] — a stage exited unexpectedly, either
//!   during the readiness wait or while running.
//!
//! Provisioning and spawn errors are terminal for the `apply` attempt that
//! produced them; crashes observed by the health monitor trigger a fresh
//! `apply` with the last configuration.

use std::time::Duration;

use thiserror::Error;

use crate::stages::Stage;

/// Errors produced while applying a tunnel configuration.
///
/// Readiness and crash variants carry the output captured from the failing
/// process so the failure can be diagnosed from the error alone.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TunnelError {
    /// Configuration failed validation; nothing was started.
    #[error("configuration rejected: {0}")]
    ConfigRejected(String),

    /// A stage binary could not be provisioned into an executable location.
    #[error("provisioning `{name}` failed: {reason}")]
    Provision {
        /// Name of the binary artifact.
        name: String,
        /// What went wrong (missing artifact, copy failure, permission bits).
        reason: String,
    },

    /// The OS refused to spawn a stage process.
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        /// Program path that was handed to the OS.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A stage did not print its readiness marker before the deadline.
    #[error("{stage} not ready after {timeout:?}")]
    ReadinessTimeout {
        /// Which stage timed out.
        stage: Stage,
        /// The deadline that elapsed.
        timeout: Duration,
        /// Output captured up to the deadline.
        output: String,
    },

    /// A stage process exited when it was expected to keep running.
    #[error("{stage} exited unexpectedly (code {code:?})")]
    ProcessCrashed {
        /// Which stage died.
        stage: Stage,
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Output captured before the exit.
        output: String,
    },
}

impl TunnelError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            TunnelError::ConfigRejected(_) => "config_rejected",
            TunnelError::Provision { .. } => "provision_failed",
            TunnelError::Spawn { .. } => "spawn_failed",
            TunnelError::ReadinessTimeout { .. } => "readiness_timeout",
            TunnelError::ProcessCrashed { .. } => "process_crashed",
        }
    }

    /// Output captured from the failing process, if any was collected.
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            TunnelError::ReadinessTimeout { output, .. }
            | TunnelError::ProcessCrashed { output, .. } => Some(output),
            _ => None,
        }
    }
}
