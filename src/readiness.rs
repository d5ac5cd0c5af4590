//! # Readiness detection for freshly launched stages.
//!
//! Two checks cover the two stage kinds:
//!
//! - [`ReadyCheck::Marker`] — scan output lines for a literal marker under a
//!   deadline (the transport stage prints one when its link is up).
//! - [`ReadyCheck::Settle`] — sleep a fixed window and require the process
//!   to still be alive (forwarders print nothing on success).
//!
//! ## Rules
//! - The marker must appear within a **single** line; no cross-line matching.
//! - Output-channel EOF means the process exited: readiness resolves to
//!   [`ReadinessResult::ProcessExited`], never to a timeout.
//! - On timeout the scan stops at the deadline; lines printed later stay in
//!   the channel for whoever drains the handle next.
//! - Every outcome carries the output captured so far, for diagnostics.

use std::time::Duration;

use tokio::time::{self, Instant};

use crate::process::ProcessHandle;

/// How long to wait for an exit code once EOF signals the process is gone.
const EXIT_REAP_WINDOW: Duration = Duration::from_millis(500);

/// Readiness contract of one stage.
#[derive(Debug, Clone)]
pub enum ReadyCheck {
    /// Ready once a line containing `marker` appears, within `timeout`.
    Marker { marker: String, timeout: Duration },
    /// Ready if the process is still alive after `delay`.
    Settle { delay: Duration },
}

/// Outcome of a readiness wait.
#[derive(Debug)]
pub enum ReadinessResult {
    /// The stage confirmed readiness.
    Confirmed { output: String },
    /// The deadline elapsed without a marker.
    TimedOut { output: String },
    /// The process exited before confirming readiness.
    ProcessExited { code: Option<i32>, output: String },
}

impl ReadinessResult {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, ReadinessResult::Confirmed { .. })
    }
}

/// Waits until `check` resolves for the process behind `handle`.
pub async fn await_ready(handle: &mut ProcessHandle, check: &ReadyCheck) -> ReadinessResult {
    match check {
        ReadyCheck::Marker { marker, timeout } => marker_wait(handle, marker, *timeout).await,
        ReadyCheck::Settle { delay } => settle_wait(handle, *delay).await,
    }
}

async fn marker_wait(
    handle: &mut ProcessHandle,
    marker: &str,
    timeout: Duration,
) -> ReadinessResult {
    let deadline = Instant::now() + timeout;
    let mut captured = String::new();

    loop {
        let recv = match handle.output_mut() {
            Some(out) => time::timeout_at(deadline, out.next_line()).await,
            // Output stream already taken; nothing to scan.
            None => return ReadinessResult::TimedOut { output: captured },
        };
        match recv {
            Err(_) => return ReadinessResult::TimedOut { output: captured },
            Ok(None) => {
                let code = handle.exit_code(EXIT_REAP_WINDOW).await;
                return ReadinessResult::ProcessExited {
                    code,
                    output: captured,
                };
            }
            Ok(Some(line)) => {
                let confirmed = line.contains(marker);
                captured.push_str(&line);
                captured.push('\n');
                if confirmed {
                    return ReadinessResult::Confirmed { output: captured };
                }
            }
        }
    }
}

async fn settle_wait(handle: &mut ProcessHandle, delay: Duration) -> ReadinessResult {
    time::sleep(delay).await;

    let mut captured = String::new();
    if let Some(out) = handle.output_mut() {
        for line in out.drain_now() {
            captured.push_str(&line);
            captured.push('\n');
        }
    }
    if handle.is_alive() {
        ReadinessResult::Confirmed { output: captured }
    } else {
        let code = handle.exit_code(EXIT_REAP_WINDOW).await;
        ReadinessResult::ProcessExited {
            code,
            output: captured,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{launch, LaunchSpec};
    use crate::stages::Stage;
    use std::path::PathBuf;

    fn sh(script: &str) -> ProcessHandle {
        launch(
            Stage::Tunnel,
            &LaunchSpec {
                program: PathBuf::from("/bin/sh"),
                args: vec!["-c".into(), script.into()],
                envs: Vec::new(),
                work_dir: None,
                merge_stderr: true,
            },
        )
        .unwrap()
    }

    fn marker(timeout_ms: u64) -> ReadyCheck {
        ReadyCheck::Marker {
            marker: "link up".into(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[tokio::test]
    async fn marker_line_confirms() {
        let mut h = sh("echo dialing; echo 'link up, serving'; sleep 30");
        let res = await_ready(&mut h, &marker(5_000)).await;
        match res {
            ReadinessResult::Confirmed { output } => {
                assert!(output.contains("dialing"));
                assert!(output.contains("link up"));
            }
            other => panic!("expected confirmation, got {other:?}"),
        }
        h.kill(Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn marker_must_be_within_one_line() {
        // "link" and "up" split across lines must not match.
        let mut h = sh("echo link; echo up; sleep 30");
        let res = await_ready(&mut h, &marker(300)).await;
        assert!(matches!(res, ReadinessResult::TimedOut { .. }));
        h.kill(Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn exit_before_marker_is_a_crash_not_a_timeout() {
        let mut h = sh("echo refused; exit 7");
        let res = await_ready(&mut h, &marker(5_000)).await;
        match res {
            ReadinessResult::ProcessExited { code, output } => {
                assert_eq!(code, Some(7));
                assert!(output.contains("refused"));
            }
            other => panic!("expected exit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_captures_partial_output() {
        let mut h = sh("echo still trying; sleep 30");
        let res = await_ready(&mut h, &marker(300)).await;
        match res {
            ReadinessResult::TimedOut { output } => assert!(output.contains("still trying")),
            other => panic!("expected timeout, got {other:?}"),
        }
        h.kill(Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn settle_confirms_quiet_survivor() {
        let mut h = sh("sleep 30");
        let res = await_ready(
            &mut h,
            &ReadyCheck::Settle {
                delay: Duration::from_millis(100),
            },
        )
        .await;
        assert!(res.is_confirmed());
        h.kill(Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn settle_detects_early_exit() {
        let mut h = sh("echo bad key >&2; exit 255");
        let res = await_ready(
            &mut h,
            &ReadyCheck::Settle {
                delay: Duration::from_millis(300),
            },
        )
        .await;
        match res {
            ReadinessResult::ProcessExited { code, output } => {
                assert_eq!(code, Some(255));
                assert!(output.contains("bad key"));
            }
            other => panic!("expected exit, got {other:?}"),
        }
    }
}
