//! Supervision layer: the state machine, its exclusive core, and the
//! health monitor.
//!
//! ## Contents
//! - [`SupervisorState`] — lifecycle phases of one supervisor instance
//! - [`TunnelSupervisor`] — `apply` / `stop` / `status` entry points
//! - `monitor` — periodic liveness checks with policy-gated restarts

mod core;
mod monitor;
mod state;

pub use self::core::TunnelSupervisor;
pub use state::SupervisorState;

#[cfg(test)]
mod tests;
