//! # Restart policy for monitor-detected crashes.
//!
//! [`RestartPolicy`] decides what the health monitor does when it finds one
//! of the tunnel processes dead.
//!
//! - [`RestartPolicy::Always`] — restart unconditionally (default; matches
//!   the behavior this engine replaces).
//! - [`RestartPolicy::Limited`] — restart up to `n` consecutive times, then
//!   give up and report `Failed`. The counter resets once the tunnel is
//!   observed healthy again, so only an immediate crash loop exhausts it.
//! - [`RestartPolicy::Never`] — report `Failed` on the first detected crash.

/// Policy controlling monitor-triggered restarts of a crashed tunnel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Restart unconditionally, forever.
    Always,
    /// Restart at most this many consecutive times before reporting failure.
    Limited(u32),
    /// Never restart; the first crash is terminal.
    Never,
}

impl Default for RestartPolicy {
    /// Returns [`RestartPolicy::Always`].
    fn default() -> Self {
        RestartPolicy::Always
    }
}

impl RestartPolicy {
    /// Whether another restart is allowed after `consecutive_failures`
    /// crashes without an intervening healthy observation.
    pub fn allows(&self, consecutive_failures: u32) -> bool {
        match self {
            RestartPolicy::Always => true,
            RestartPolicy::Limited(max) => consecutive_failures <= *max,
            RestartPolicy::Never => false,
        }
    }
}
