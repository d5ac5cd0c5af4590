//! # Single-process launcher with captured, line-framed output.
//!
//! [`launch`] spawns exactly one child per call and wires its stdio:
//!
//! ```text
//! child ── stdout ──► reader task ──┐
//!       └─ stderr ──► reader task ──┴──► mpsc ──► OutputLines
//! ```
//!
//! ## Rules
//! - stdin is always null; the stages never read from us.
//! - stdout and stderr are always captured; with `merge_stderr` both feed
//!   one channel in per-stream line order (no global interleaving promise).
//! - The child is registered for kill-on-drop so a dropped handle cannot
//!   leak a process.
//! - [`kill_stray`] sweeps leftovers by binary name before a fresh start;
//!   its failures are deliberately ignored.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::error::TunnelError;
use crate::process::handle::{OutputLines, ProcessHandle};
use crate::stages::Stage;

/// Per-stream line channel depth; a full channel backpressures the reader
/// task, never the supervisor.
const LINE_CHANNEL_CAPACITY: usize = 256;

/// Everything needed to spawn one stage process.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Absolute path of the executable.
    pub program: PathBuf,
    /// Argument vector, exec-style (no shell interpretation).
    pub args: Vec<String>,
    /// Extra environment entries layered over the inherited environment.
    pub envs: Vec<(String, String)>,
    /// Working directory; inherited when `None`.
    pub work_dir: Option<PathBuf>,
    /// Route stderr lines into the stdout channel.
    pub merge_stderr: bool,
}

/// Spawns the process described by `spec` and returns its handle.
///
/// Fails only when the OS refuses the spawn; everything after a successful
/// spawn (early exit, bad output) is observed through the handle.
pub fn launch(stage: Stage, spec: &LaunchSpec) -> Result<ProcessHandle, TunnelError> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in &spec.envs {
        cmd.env(key, value);
    }
    if let Some(dir) = &spec.work_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|source| TunnelError::Spawn {
        program: spec.program.display().to_string(),
        source,
    })?;
    let pid = child.id();

    let (out_tx, out_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
    if let Some(stdout) = child.stdout.take() {
        spawn_line_reader(stdout, out_tx.clone());
    }

    let stderr_pipe = child.stderr.take();
    let stderr = if spec.merge_stderr {
        if let Some(pipe) = stderr_pipe {
            spawn_line_reader(pipe, out_tx.clone());
        }
        None
    } else {
        stderr_pipe.map(|pipe| {
            let (err_tx, err_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
            spawn_line_reader(pipe, err_tx);
            OutputLines::new(err_rx)
        })
    };
    // Readers hold the remaining senders; the channel closes at EOF.
    drop(out_tx);

    Ok(ProcessHandle::new(
        stage,
        child,
        pid,
        OutputLines::new(out_rx),
        stderr,
    ))
}

fn spawn_line_reader<R>(stream: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
}

/// Kills any leftover processes matching the given binary names.
///
/// Tries `pkill -x` first (exact name match), then `killall` for systems
/// without it. "No process found" is the common case and every failure is
/// swallowed: the sweep is best-effort hygiene before a fresh start.
pub async fn kill_stray(names: &[String]) {
    for name in names {
        let pkill = Command::new("pkill")
            .arg("-x")
            .arg(name)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if pkill.is_ok() {
            continue;
        }
        let _ = Command::new("killall")
            .arg(name)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
    }
}
