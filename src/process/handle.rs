//! # Exclusive handle over one spawned stage process.
//!
//! [`ProcessHandle`] owns a [`tokio::process::Child`] plus the line channels
//! its reader tasks feed. Exactly one supervisor owns each handle; it is
//! never shared.
//!
//! ## Rules
//! - Liveness is **queried** (`try_wait`), never cached.
//! - Termination escalates: SIGTERM, bounded graceful wait, then SIGKILL.
//! - Output reaches the owner as whole lines through [`OutputLines`]; the
//!   channel closing is the EOF signal and is a normal termination, not an
//!   error.

use std::time::Duration;

use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::time;

use crate::stages::Stage;

/// Line-based view of a process output stream.
///
/// Fed by reader tasks spawned at launch; `None` from
/// [`next_line`](OutputLines::next_line) means every feeding stream hit EOF.
#[derive(Debug)]
pub struct OutputLines {
    rx: mpsc::Receiver<String>,
}

impl OutputLines {
    pub(crate) fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx }
    }

    /// Waits for the next output line; `None` on EOF.
    pub async fn next_line(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Drains whatever lines are immediately available, without waiting.
    pub fn drain_now(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = self.rx.try_recv() {
            lines.push(line);
        }
        lines
    }
}

/// Owns one OS process belonging to a tunnel stage.
#[derive(Debug)]
pub struct ProcessHandle {
    stage: Stage,
    child: Child,
    pid: Option<u32>,
    output: Option<OutputLines>,
    stderr: Option<OutputLines>,
}

impl ProcessHandle {
    pub(crate) fn new(
        stage: Stage,
        child: Child,
        pid: Option<u32>,
        output: OutputLines,
        stderr: Option<OutputLines>,
    ) -> Self {
        Self {
            stage,
            child,
            pid,
            output: Some(output),
            stderr,
        }
    }

    /// Stage this process belongs to.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// OS process id recorded at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Queries liveness from the OS; reaps the child if it has exited.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Borrows the primary output stream (stdout, plus stderr when merged).
    pub fn output_mut(&mut self) -> Option<&mut OutputLines> {
        self.output.as_mut()
    }

    /// Moves the primary output stream out, e.g. into a background drainer.
    pub fn take_output(&mut self) -> Option<OutputLines> {
        self.output.take()
    }

    /// Moves the separate stderr stream out (present only when the process
    /// was launched without stderr merging).
    pub fn take_stderr(&mut self) -> Option<OutputLines> {
        self.stderr.take()
    }

    /// Waits up to `wait_for` for the process to exit and returns its exit
    /// code. `None` when it is still running after the wait or was killed by
    /// a signal.
    pub async fn exit_code(&mut self, wait_for: Duration) -> Option<i32> {
        match time::timeout(wait_for, self.child.wait()).await {
            Ok(Ok(status)) => status.code(),
            _ => None,
        }
    }

    /// Terminates the process: graceful signal first, SIGKILL after `grace`.
    ///
    /// Idempotent; a handle whose process already exited returns quietly.
    pub async fn kill(&mut self, grace: Duration) {
        if !self.is_alive() {
            return;
        }
        self.signal_term();
        if time::timeout(grace, self.child.wait()).await.is_err() {
            let _ = self.child.kill().await;
        }
    }

    #[cfg(unix)]
    fn signal_term(&self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        if let Some(pid) = self.pid {
            // ESRCH just means the process beat us to the exit.
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
    }

    #[cfg(not(unix))]
    fn signal_term(&self) {}
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        // Last-resort kill; normal teardown goes through `kill`.
        let _ = self.child.start_kill();
    }
}
