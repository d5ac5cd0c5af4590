//! # tunnelvisor
//!
//! **Tunnelvisor** is a supervision engine for a two-stage outbound tunnel.
//!
//! It owns the full lifecycle of the chain — an obfuscated transport
//! process that confirms readiness on its output, and an SSH-style
//! forwarder that exposes a local SOCKS5 listener through it — and keeps
//! the chain healthy with policy-gated restarts. The crate is designed as
//! the process-supervision core under a UI or CLI front end.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                    apply(TunnelConfig) / stop()
//!                               │
//! ┌─────────────────────────────▼─────────────────────────────────────┐
//! │  TunnelSupervisor (exclusive lock; one sequence in flight)        │
//! │  - Provisioner (install bundled binaries, fix permissions)        │
//! │  - launch() (spawn, capture line-framed output)                   │
//! │  - await_ready() (marker scan / settle window)                    │
//! │  - Bus (broadcast status + log events)                            │
//! └──────┬──────────────────────┬──────────────────────┬──────────────┘
//!        ▼                      ▼                      ▼
//! ┌──────────────┐      ┌──────────────┐      ┌──────────────┐
//! │   tunnel     │      │  forwarder   │      │   monitor    │
//! │ (transport)  │◄─────┤ (SOCKS5 via  │      │ (liveness    │
//! │ marker-ready │ port │  loopback)   │      │  ticks)      │
//! └──────┬───────┘      └──────┬───────┘      └──────┬───────┘
//!        │ output lines        │ output lines        │ crash? restart
//!        ▼                     ▼                     ▼  per policy
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                       Bus (broadcast channel)                     │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                           SubscriberSet
//!                          (per-sub queues)
//!                        ┌─────────┼─────────┐
//!                        ▼         ▼         ▼
//!                     worker1   worker2   workerN
//!                        ▼         ▼         ▼
//!                    sub1.on_  sub2.on_  subN.on_
//!                     event()   event()   event()
//! ```
//!
//! ### Start sequence
//! ```text
//! apply(profile)
//!   ├─► validate; no-op when the profile is unchanged and transport alive
//!   ├─► CleaningUp: kill owned handles, sweep strays by binary name
//!   ├─► StartingTunnel:
//!   │       provision ─► launch ─► wait for "Connection confirmed."
//!   │       (TimedOut / ProcessExited ─► kill, Failed, return)
//!   ├─► StartingForwarder:
//!   │       secure key ─► provision ─► launch ─► settle window
//!   │       (failure kills the transport too — never a half-open chain)
//!   └─► Running: spawn health monitor
//!
//! monitor tick:
//!   both alive ─► reconfirm Running
//!   either dead ─► RestartPolicy::allows? reapply last profile after
//!                  BackoffPolicy delay : teardown ─► Failed
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types                                  |
//! |-------------------|----------------------------------------------------------|--------------------------------------------|
//! | **Supervision**   | Two-stage start/stop state machine with health monitor.  | [`TunnelSupervisor`], [`SupervisorState`]  |
//! | **Configuration** | Tunnel profile and runtime knobs.                        | [`TunnelConfig`], [`SupervisorConfig`]     |
//! | **Policies**      | Restart gating and backoff delays.                       | [`RestartPolicy`], [`BackoffPolicy`]       |
//! | **Processes**     | Provisioning, spawning, output capture, kill escalation. | [`Provisioner`], [`ProcessHandle`]         |
//! | **Readiness**     | Marker scan and settle-window checks.                    | [`ReadyCheck`], [`ReadinessResult`]        |
//! | **Events**        | Status snapshots and forwarded log lines.                | [`Event`], [`StatusSnapshot`], [`Subscribe`] |
//! | **Errors**        | Failure taxonomy of an apply attempt.                    | [`TunnelError`]                            |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use tunnelvisor::{SupervisorConfig, TunnelConfig, TunnelSupervisor};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let subs: Vec<Arc<dyn tunnelvisor::Subscribe>> = Vec::new();
//!     let sup = TunnelSupervisor::new(SupervisorConfig::default(), subs);
//!
//!     let profile = TunnelConfig {
//!         domain: "t.example.com".into(),
//!         ..TunnelConfig::default()
//!     };
//!     sup.apply(profile).await?;
//!     assert!(sup.status().is_running());
//!
//!     sup.stop().await;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod events;
mod policies;
mod process;
mod readiness;
mod stages;
mod subscribers;
mod supervisor;

// ---- Public re-exports ----

pub use config::{ProvisionConfig, SupervisorConfig, TunnelConfig};
pub use error::TunnelError;
pub use events::{Bus, Event, EventKind, StageStatus, StatusSnapshot};
pub use policies::{BackoffPolicy, RestartPolicy};
pub use process::{launch, LaunchSpec, OutputLines, ProcessHandle, Provisioner};
pub use readiness::{await_ready, ReadinessResult, ReadyCheck};
pub use stages::{Stage, StageSpec, READY_MARKER};
pub use subscribers::{Subscribe, SubscriberSet};
pub use supervisor::{SupervisorState, TunnelSupervisor};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
