//! # Events emitted by the tunnel supervisor.
//!
//! Every observable change flows through one envelope type, [`Event`]:
//!
//! - **Status transitions** — [`EventKind::Status`] carries a full
//!   [`StatusSnapshot`] of both stages, so observers never have to stitch
//!   partial updates together.
//! - **Process output** — [`EventKind::Log`] forwards one line of a stage's
//!   output, for live log views and post-mortem diagnosis.
//! - **Observer health** — [`EventKind::ObserverOverflow`] reports a
//!   subscriber that dropped an event (queue full or worker gone).
//!
//! ## Ordering
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically; `at` carries the wall-clock timestamp for display.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::stages::Stage;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Status of one tunnel stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageStatus {
    /// Not running and not asked to run.
    Stopped,
    /// Start sequence in progress; the string names the current step.
    Starting(String),
    /// Confirmed up.
    Running,
    /// Teardown in progress.
    Stopping,
    /// Start failed or the process crashed; the string carries the reason.
    Failed(String),
}

impl StageStatus {
    /// Short label for log output.
    pub fn as_label(&self) -> &'static str {
        match self {
            StageStatus::Stopped => "stopped",
            StageStatus::Starting(_) => "starting",
            StageStatus::Running => "running",
            StageStatus::Stopping => "stopping",
            StageStatus::Failed(_) => "failed",
        }
    }
}

/// Combined status of both stages, published as one unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Transport stage (outer tunnel).
    pub tunnel: StageStatus,
    /// Forwarder stage (SOCKS5 exposure).
    pub forwarder: StageStatus,
}

impl StatusSnapshot {
    /// Both stages stopped.
    pub fn stopped() -> Self {
        Self {
            tunnel: StageStatus::Stopped,
            forwarder: StageStatus::Stopped,
        }
    }

    /// Both stages confirmed running.
    pub fn running() -> Self {
        Self {
            tunnel: StageStatus::Running,
            forwarder: StageStatus::Running,
        }
    }

    /// Both stages tearing down.
    pub fn stopping() -> Self {
        Self {
            tunnel: StageStatus::Stopping,
            forwarder: StageStatus::Stopping,
        }
    }

    /// True when both stages are `Running`.
    pub fn is_running(&self) -> bool {
        self.tunnel == StageStatus::Running && self.forwarder == StageStatus::Running
    }
}

/// Classification and payload of an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// Status of both stages changed (or was reconfirmed by the monitor).
    Status(StatusSnapshot),
    /// One line of output from a stage process.
    Log {
        /// Stage the line came from.
        stage: Stage,
        /// The raw line, without trailing newline.
        line: String,
    },
    /// A subscriber dropped this many-th event; reason is "full" or "closed".
    ObserverOverflow {
        /// Subscriber name.
        observer: &'static str,
        /// Why the event was dropped.
        reason: &'static str,
    },
}

/// Event envelope: monotonic sequence, wall-clock timestamp, payload.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// What happened.
    pub kind: EventKind,
}

impl Event {
    /// Creates an event of the given kind, stamped now.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
        }
    }

    /// Status transition event.
    pub fn status(snapshot: StatusSnapshot) -> Self {
        Event::new(EventKind::Status(snapshot))
    }

    /// Process output line event.
    pub fn log(stage: Stage, line: impl Into<String>) -> Self {
        Event::new(EventKind::Log {
            stage,
            line: line.into(),
        })
    }

    /// Subscriber overflow event.
    pub fn observer_overflow(observer: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::ObserverOverflow { observer, reason })
    }

    /// Returns the snapshot if this is a status event.
    pub fn as_status(&self) -> Option<&StatusSnapshot> {
        match &self.kind {
            EventKind::Status(s) => Some(s),
            _ => None,
        }
    }
}
