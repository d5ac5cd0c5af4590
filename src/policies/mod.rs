//! Restart policies for the health monitor.
//!
//! These knobs control **whether** the monitor restarts a crashed tunnel and
//! **how long** it waits before doing so.
//!
//! ## Contents
//! - [`RestartPolicy`] — restart unconditionally, up to a cap, or never
//! - [`BackoffPolicy`] — how the restart delay grows with consecutive crashes
//!
//! ## Defaults
//! The defaults reproduce the legacy behavior: unlimited restarts with zero
//! delay. Hardened deployments opt into [`RestartPolicy::Limited`] and a
//! nonzero [`BackoffPolicy::first`].

mod backoff;
mod restart;

pub use backoff::BackoffPolicy;
pub use restart::RestartPolicy;
