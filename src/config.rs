//! # Runtime configuration.
//!
//! Two layers of configuration feed the engine:
//!
//! 1. [`TunnelConfig`] — the user-facing tunnel profile (resolvers, domain,
//!    SOCKS port, key file). Its equality drives the duplicate-`apply`
//!    short-circuit: applying an identical profile while the transport stage
//!    is still alive is a no-op.
//! 2. [`SupervisorConfig`] — runtime knobs owned by the integrator: binary
//!    names, readiness deadlines, monitor interval, restart policy, and the
//!    provisioning locations.
//!
//! ## Sentinel values
//! - `BackoffPolicy::first = 0s` → restart immediately (the default).
//! - `ProvisionConfig::always_copy = true` → re-copy the artifact on every
//!   provision, for filesystems where the bundled location is mounted
//!   non-executable.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::TunnelError;
use crate::policies::{BackoffPolicy, RestartPolicy};

/// User-facing tunnel profile.
///
/// Equality over all fields decides whether a new `apply` call is a no-op
/// (same profile, transport still alive) or requires a full restart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TunnelConfig {
    /// Resolver endpoints handed to the transport stage, as `host:port`.
    pub resolvers: Vec<String>,
    /// Tunnel domain name.
    pub domain: String,
    /// Local port where the forwarder exposes its SOCKS5 listener.
    pub local_port: u16,
    /// Optional private key file for the forwarder stage.
    pub key_path: Option<PathBuf>,
}

impl Default for TunnelConfig {
    /// Returns the stock profile: resolver `1.1.1.1:53`, empty domain
    /// (must be filled in before `apply`), SOCKS on 1080, no key.
    fn default() -> Self {
        Self {
            resolvers: vec!["1.1.1.1:53".to_string()],
            domain: String::new(),
            local_port: 1080,
            key_path: None,
        }
    }
}

impl TunnelConfig {
    /// Validates the profile before any process is touched.
    ///
    /// Rejects an empty domain, an empty resolver list, and blank resolver
    /// entries with [`TunnelError::ConfigRejected`].
    pub fn validate(&self) -> Result<(), TunnelError> {
        if self.domain.trim().is_empty() {
            return Err(TunnelError::ConfigRejected("missing domain".into()));
        }
        if self.resolvers.is_empty() {
            return Err(TunnelError::ConfigRejected("no resolvers".into()));
        }
        if self.resolvers.iter().any(|r| r.trim().is_empty()) {
            return Err(TunnelError::ConfigRejected("blank resolver entry".into()));
        }
        Ok(())
    }
}

/// Where stage binaries come from and where they are installed.
#[derive(Clone, Debug)]
pub struct ProvisionConfig {
    /// Directory holding the bundled artifacts, keyed by binary name.
    pub source_dir: PathBuf,
    /// Writable, executable-permitted directory the artifacts are copied to.
    pub install_dir: PathBuf,
    /// Copy on every provision instead of only when absent.
    ///
    /// Needed when `source_dir` sits on a filesystem mounted `noexec`, so a
    /// stale installed copy can never be trusted to match the bundle.
    pub always_copy: bool,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("assets"),
            install_dir: PathBuf::from("bin"),
            always_copy: false,
        }
    }
}

/// Global configuration for the tunnel supervisor.
///
/// ## Field semantics
/// - `stage1_ready_timeout` / `stage2_settle`: independent readiness windows
///   for the two stages.
/// - `monitor_interval`: liveness polling period once `Running` is reached;
///   smaller than either readiness window.
/// - `kill_grace`: how long a terminated process gets to exit on SIGTERM
///   before SIGKILL.
/// - `restart` / `backoff`: health-monitor restart policy. The defaults
///   reproduce immediate unconditional restart.
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Name of the transport-stage binary artifact.
    pub stage1_binary: String,
    /// Name of the forwarder-stage binary artifact.
    ///
    /// Unlike `stage1_binary`, this name is excluded from the stray-process
    /// sweep during cleanup: the default is a shared system client (`ssh`)
    /// and a name sweep would kill unrelated processes. Forwarder teardown
    /// goes through the owned handle only.
    pub stage2_binary: String,
    /// Login user for the forwarder stage.
    pub stage2_user: String,
    /// Loopback port the transport stage exposes for the forwarder.
    pub stage1_port: u16,
    /// Deadline for the transport stage to print its readiness marker.
    pub stage1_ready_timeout: Duration,
    /// Settle window after which a still-alive forwarder counts as ready.
    pub stage2_settle: Duration,
    /// Liveness polling period of the health monitor.
    pub monitor_interval: Duration,
    /// Graceful-exit window between SIGTERM and SIGKILL.
    pub kill_grace: Duration,
    /// Capacity of the event bus ring buffer (minimum 1, clamped by the bus).
    pub bus_capacity: usize,
    /// When the monitor restarts a crashed tunnel.
    pub restart: RestartPolicy,
    /// Delay between consecutive monitor-triggered restarts.
    pub backoff: BackoffPolicy,
    /// Binary provisioning locations and copy policy.
    pub provision: ProvisionConfig,
}

impl Default for SupervisorConfig {
    /// Defaults:
    /// - binaries `slipstream` / `ssh`, user `tunnel`, transport port 1081
    /// - stage-1 readiness 10s, stage-2 settle 1s, monitor tick 2s
    /// - kill grace 2s, bus capacity 1024
    /// - `RestartPolicy::Always` with zero-delay backoff (restart storms are
    ///   the integrator's opt-in to bound, see [`RestartPolicy::Limited`])
    fn default() -> Self {
        Self {
            stage1_binary: "slipstream".to_string(),
            stage2_binary: "ssh".to_string(),
            stage2_user: "tunnel".to_string(),
            stage1_port: 1081,
            stage1_ready_timeout: Duration::from_secs(10),
            stage2_settle: Duration::from_secs(1),
            monitor_interval: Duration::from_secs(2),
            kill_grace: Duration::from_secs(2),
            bus_capacity: 1024,
            restart: RestartPolicy::default(),
            backoff: BackoffPolicy::default(),
            provision: ProvisionConfig::default(),
        }
    }
}

impl SupervisorConfig {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}
