//! # Simple stdout observer for debugging and demos.
//!
//! [`LogWriter`] prints events in a compact, timestamped format:
//!
//! ```text
//! [12:03:44] status tunnel=running forwarder=starting
//! [12:03:44] tunnel | Connection confirmed.
//! [12:03:45] overflow observer=metrics reason=full
//! ```
//!
//! Intended for development and examples; production integrations should
//! implement their own [`Subscribe`] observer.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Stdout logging observer.
#[derive(Default)]
pub struct LogWriter;

/// Formats a wall-clock timestamp as `HH:MM:SS` (UTC).
fn clock(at: SystemTime) -> String {
    let secs = at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let day = secs % 86_400;
    format!("{:02}:{:02}:{:02}", day / 3600, (day % 3600) / 60, day % 60)
}

/// Renders one event to a display line.
pub(crate) fn render(ev: &Event) -> String {
    let ts = clock(ev.at);
    match &ev.kind {
        EventKind::Status(snap) => format!(
            "[{ts}] status tunnel={} forwarder={}",
            snap.tunnel.as_label(),
            snap.forwarder.as_label()
        ),
        EventKind::Log { stage, line } => format!("[{ts}] {stage} | {line}"),
        EventKind::ObserverOverflow { observer, reason } => {
            format!("[{ts}] overflow observer={observer} reason={reason}")
        }
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    fn name(&self) -> &'static str {
        "log-writer"
    }

    async fn on_event(&self, ev: &Event) {
        println!("{}", render(ev));
    }
}
