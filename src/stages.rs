//! # Stage identities and argument contracts.
//!
//! The engine supervises a two-stage chain:
//!
//! ```text
//! [tunnel]     obfuscated transport; prints a readiness marker, exposes a
//!              loopback port for the next stage
//! [forwarder]  SSH-style client dialed through that port; exposes the
//!              local SOCKS5 listener
//! ```
//!
//! [`StageSpec`] carries everything stage-agnostic code needs to start one
//! stage: binary name, argv, readiness contract, stderr routing. The two
//! constructors encode the process-level contracts with the stage binaries.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{SupervisorConfig, TunnelConfig};
use crate::process::LaunchSpec;
use crate::readiness::ReadyCheck;

/// Literal substring the transport stage prints once its link is up.
pub const READY_MARKER: &str = "Connection confirmed.";

/// Which link of the chain a process belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Stage 1: obfuscated transport.
    Tunnel,
    /// Stage 2: SSH-style forwarder exposing local SOCKS5.
    Forwarder,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Tunnel => "tunnel",
            Stage::Forwarder => "forwarder",
        })
    }
}

/// Launch recipe for one stage.
#[derive(Debug, Clone)]
pub struct StageSpec {
    pub stage: Stage,
    /// Artifact name, resolved to a path by the provisioner.
    pub binary: String,
    pub args: Vec<String>,
    pub ready: ReadyCheck,
    pub merge_stderr: bool,
}

impl StageSpec {
    /// Builds the transport-stage recipe:
    /// `<binary> --domain=<d> --resolver=<host:port>... --congestion-control=bbr`,
    /// ready once [`READY_MARKER`] appears on its combined output.
    pub fn tunnel(profile: &TunnelConfig, cfg: &SupervisorConfig) -> Self {
        let mut args = vec![format!("--domain={}", profile.domain)];
        args.extend(
            profile
                .resolvers
                .iter()
                .map(|r| format!("--resolver={r}")),
        );
        args.push("--congestion-control=bbr".to_string());

        Self {
            stage: Stage::Tunnel,
            binary: cfg.stage1_binary.clone(),
            args,
            ready: ReadyCheck::Marker {
                marker: READY_MARKER.to_string(),
                timeout: cfg.stage1_ready_timeout,
            },
            merge_stderr: true,
        }
    }

    /// Builds the forwarder-stage recipe: an SSH-style client dialed at the
    /// transport's loopback port, exposing a dynamic SOCKS5 forward on
    /// `profile.local_port`. Prints nothing on success, so readiness is a
    /// settle window.
    pub fn forwarder(profile: &TunnelConfig, cfg: &SupervisorConfig) -> Self {
        let mut args = Vec::new();
        if let Some(key) = &profile.key_path {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args.extend([
            "-D".to_string(),
            profile.local_port.to_string(),
            "-p".to_string(),
            cfg.stage1_port.to_string(),
            // Host keys rotate with the tunnel endpoint, so pinning is noise.
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-N".to_string(),
            format!("{}@127.0.0.1", cfg.stage2_user),
        ]);

        Self {
            stage: Stage::Forwarder,
            binary: cfg.stage2_binary.clone(),
            args,
            ready: ReadyCheck::Settle {
                delay: cfg.stage2_settle,
            },
            merge_stderr: true,
        }
    }

    /// Pairs this recipe with the provisioned program path.
    pub fn launch_spec(&self, program: PathBuf) -> LaunchSpec {
        LaunchSpec {
            program,
            args: self.args.clone(),
            envs: Vec::new(),
            work_dir: None,
            merge_stderr: self.merge_stderr,
        }
    }

    /// Readiness deadline bound for this stage, used for diagnostics.
    pub fn deadline(&self) -> Duration {
        match &self.ready {
            ReadyCheck::Marker { timeout, .. } => *timeout,
            ReadyCheck::Settle { delay } => *delay,
        }
    }
}
