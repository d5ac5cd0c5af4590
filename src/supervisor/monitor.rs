//! # Health monitor: periodic liveness checks and policy-gated restarts.
//!
//! One monitor task runs per successful start. Each tick it checks both
//! stage processes:
//!
//! - both alive — reconfirm `Running` and reset the failure counter;
//! - either dead — consult the restart policy: restart with the last
//!   applied profile (after the backoff delay), or give up into `Failed`.
//!
//! ## Rules
//! - A tick **skips** instead of waiting when an `apply`/`stop` holds the
//!   supervisor lock; the monitor must never stall or double-drive a
//!   transition sequence.
//! - A restart goes through the same exclusive lock as `apply`, so exactly
//!   one restart sequence runs, and one that lost the race to a newer
//!   `apply`/`stop` (its token is cancelled) backs off without touching
//!   anything.
//! - The monitor task ends with its generation: after triggering a restart
//!   (the new generation spawns its own monitor), after giving up, or when
//!   its token is cancelled.

use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::config::TunnelConfig;
use crate::events::{StageStatus, StatusSnapshot};
use crate::process::ProcessHandle;
use crate::supervisor::core::TunnelSupervisor;
use crate::supervisor::state::SupervisorState;

enum Tick {
    /// Healthy, or the lock was busy; keep polling.
    Continue,
    /// Crash observed, restart allowed: reapply after the delay.
    Restart {
        profile: TunnelConfig,
        delay: std::time::Duration,
    },
    /// Crash observed, policy exhausted (or nothing to reapply); done.
    Exit,
}

pub(super) async fn run(sup: TunnelSupervisor, token: CancellationToken) {
    let interval = sup.config().monitor_interval;
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = time::sleep(interval) => {}
        }

        match tick(&sup, &token).await {
            Tick::Continue => {}
            Tick::Exit => return,
            Tick::Restart { profile, delay } => {
                if !delay.is_zero() {
                    tokio::select! {
                        _ = token.cancelled() => return,
                        _ = time::sleep(delay) => {}
                    }
                }
                if token.is_cancelled() {
                    return;
                }
                // Errors surface through published status; a failed restart
                // has already transitioned to `Failed`.
                let _ = sup.reapply(profile, &token).await;
                return;
            }
        }
    }
}

async fn tick(sup: &TunnelSupervisor, token: &CancellationToken) -> Tick {
    // An in-flight apply/stop owns the processes right now; skip the tick.
    let Ok(mut st) = sup.state_lock().try_lock() else {
        return Tick::Continue;
    };
    if token.is_cancelled() {
        return Tick::Exit;
    }

    let tunnel_up = st.tunnel.as_mut().is_some_and(ProcessHandle::is_alive);
    let forwarder_up = st.forwarder.as_mut().is_some_and(ProcessHandle::is_alive);

    if tunnel_up && forwarder_up {
        st.consecutive_failures = 0;
        sup.transition(SupervisorState::Running, StatusSnapshot::running());
        return Tick::Continue;
    }

    st.consecutive_failures += 1;
    let attempt = st.consecutive_failures;
    let policy = &sup.config().restart;
    match st.applied.clone() {
        Some(profile) if policy.allows(attempt) => Tick::Restart {
            profile,
            delay: sup.config().backoff.delay_for(attempt),
        },
        _ => {
            // Give up: kill whatever half survived and report which stage
            // went down first.
            TunnelSupervisor::reset_watchers(&mut st);
            sup.teardown(&mut st).await;
            st.applied = None;
            let dead = |up: bool| {
                if up {
                    StageStatus::Stopped
                } else {
                    StageStatus::Failed("process exited".into())
                }
            };
            sup.transition(
                SupervisorState::Failed,
                StatusSnapshot {
                    tunnel: dead(tunnel_up),
                    forwarder: dead(forwarder_up),
                },
            );
            Tick::Exit
        }
    }
}
