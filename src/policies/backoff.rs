//! # Backoff policy for monitor-triggered restarts.
//!
//! [`BackoffPolicy`] controls how long the health monitor waits before
//! re-running the start sequence after a detected crash. The delay for the
//! `n`-th consecutive crash is `first × factor^(n-1)`, clamped to `max`.
//!
//! With the default `first = 0` every restart is immediate regardless of
//! `factor` — the legacy behavior. Setting a nonzero `first` turns crash
//! loops into an exponentially spaced retry sequence.

use std::time::Duration;

/// Restart delay policy.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay before the first restart.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
}

impl Default for BackoffPolicy {
    /// Returns `first = 0s` (immediate restart), `factor = 2.0`, `max = 30s`.
    fn default() -> Self {
        Self {
            first: Duration::ZERO,
            max: Duration::from_secs(30),
            factor: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay before restart number `attempt` (1-indexed).
    ///
    /// The base is derived purely from the attempt number, so a clamped or
    /// overflowed value never feeds back into later calculations.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.first.is_zero() {
            return Duration::ZERO;
        }
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        let max_secs = self.max.as_secs_f64();
        if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}
