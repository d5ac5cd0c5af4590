//! # Supervisor lifecycle states.
//!
//! One state machine instance per supervisor:
//!
//! ```text
//! Idle ──► CleaningUp ──► StartingTunnel ──► StartingForwarder ──► Running
//!   ▲                                                                │
//!   └────────────────────────── Stopping ◄──────────────────────────┘
//!
//! (any starting state, or a crash the monitor gives up on) ──► Failed
//! ```
//!
//! Only one transition sequence is in flight at a time; the supervisor's
//! exclusive lock enforces that, not this type.

/// Lifecycle phase of the supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    /// Nothing applied, nothing running.
    Idle,
    /// Sweeping residual processes before a fresh start.
    CleaningUp,
    /// Transport stage launching or awaiting its readiness marker.
    StartingTunnel,
    /// Forwarder stage launching or settling.
    StartingForwarder,
    /// Both stages confirmed up; health monitor active.
    Running,
    /// Explicit stop in progress.
    Stopping,
    /// A start attempt failed, or the monitor gave up restarting.
    Failed,
}

impl SupervisorState {
    /// Short label for log output.
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorState::Idle => "idle",
            SupervisorState::CleaningUp => "cleaning_up",
            SupervisorState::StartingTunnel => "starting_tunnel",
            SupervisorState::StartingForwarder => "starting_forwarder",
            SupervisorState::Running => "running",
            SupervisorState::Stopping => "stopping",
            SupervisorState::Failed => "failed",
        }
    }
}
